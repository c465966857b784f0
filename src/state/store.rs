//! DeviceState - local mirror of the processor's mute state
//!
//! Owns the per-channel mute tables and the sparse send-mute matrix.
//! All writes come from decoded device events; reads come from feedback
//! consumers. Levels are not retained: they are translated and published
//! as they arrive.

use std::collections::HashMap;

use tracing::{trace, warn};

use super::types::DeviceUnit;
use crate::protocol::{ChannelType, DeviceEvent, SendType};

/// One mute flag per channel, 0-based storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuteTable {
    flags: Vec<bool>,
}

impl MuteTable {
    /// Create a table of `len` unmuted channels
    pub fn new(len: usize) -> Self {
        Self {
            flags: vec![false; len],
        }
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Flag at a 0-based index, `None` outside the table
    pub fn get(&self, index: usize) -> Option<bool> {
        self.flags.get(index).copied()
    }

    /// Set the flag at a 0-based index
    ///
    /// Returns `None` when the index is outside the table, otherwise whether
    /// the stored value changed.
    pub fn set(&mut self, index: usize, muted: bool) -> Option<bool> {
        let slot = self.flags.get_mut(index)?;
        let changed = *slot != muted;
        *slot = muted;
        Some(changed)
    }
}

/// Sparse source → destination mute rows
///
/// A row is created the first time a source channel is referenced, sized to
/// `dest_count + 1` so destinations index 1-based. Rows never shrink or grow.
#[derive(Debug, Clone, Default)]
pub struct SendMuteMatrix {
    rows: HashMap<u8, Vec<bool>>,
}

impl SendMuteMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of materialized rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, source: u8) -> Option<&[bool]> {
        self.rows.get(&source).map(|row| row.as_slice())
    }

    /// Read a cell; unknown rows/cells read as unmuted
    pub fn get(&self, source: u8, dest: u8) -> bool {
        self.rows
            .get(&source)
            .and_then(|row| row.get(dest as usize))
            .copied()
            .unwrap_or(false)
    }

    /// Write a cell, materializing the row with `dest_count + 1` slots if needed
    ///
    /// Returns `None` when `dest` lies outside the row.
    pub fn set(&mut self, source: u8, dest: u8, muted: bool, dest_count: u8) -> Option<bool> {
        let row = self
            .rows
            .entry(source)
            .or_insert_with(|| vec![false; dest_count as usize + 1]);
        let slot = row.get_mut(dest as usize)?;
        let changed = *slot != muted;
        *slot = muted;
        Some(changed)
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }
}

/// A change to the mirror produced by one device event
///
/// Channel numbers are 1-based.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StateChange {
    Mute {
        ch_type: ChannelType,
        channel: u8,
        muted: bool,
    },
    SendMute {
        send_type: SendType,
        channel: u8,
        send_channel: u8,
        muted: bool,
    },
    Level {
        ch_type: ChannelType,
        channel: u8,
        level: u8,
    },
}

/// Local mirror of device state for one configured unit
#[derive(Debug, Clone)]
pub struct DeviceState {
    unit: DeviceUnit,
    input_mutes: MuteTable,
    zone_mutes: MuteTable,
    send_mutes: HashMap<SendType, SendMuteMatrix>,
}

impl DeviceState {
    /// Create an all-unmuted mirror sized for `unit`
    pub fn new(unit: DeviceUnit) -> Self {
        Self {
            unit,
            input_mutes: MuteTable::new(unit.inputs as usize),
            zone_mutes: MuteTable::new(unit.zones as usize),
            send_mutes: HashMap::new(),
        }
    }

    /// Discard everything and resize for a new unit
    pub fn reset(&mut self, unit: DeviceUnit) {
        *self = Self::new(unit);
    }

    pub fn unit(&self) -> DeviceUnit {
        self.unit
    }

    pub fn mute_table(&self, ch_type: ChannelType) -> &MuteTable {
        match ch_type {
            ChannelType::Input => &self.input_mutes,
            ChannelType::Zone => &self.zone_mutes,
        }
    }

    pub fn send_matrix(&self, send_type: SendType) -> Option<&SendMuteMatrix> {
        self.send_mutes.get(&send_type)
    }

    /// Record a mute report for a 0-based channel index
    ///
    /// Returns whether the mirror changed. Indices beyond the unit are dropped.
    pub fn apply_mute_event(&mut self, ch_type: ChannelType, index: u8, muted: bool) -> bool {
        let table = match ch_type {
            ChannelType::Input => &mut self.input_mutes,
            ChannelType::Zone => &mut self.zone_mutes,
        };
        match table.set(index as usize, muted) {
            Some(changed) => changed,
            None => {
                warn!(
                    "Dropping {} mute for index {} (table holds {})",
                    ch_type,
                    index,
                    table.len()
                );
                false
            }
        }
    }

    /// Record a send-mute report for 1-based source/destination channels
    ///
    /// The destination must fall inside the source's row; anything else is
    /// dropped with a diagnostic and leaves all other state untouched.
    pub fn apply_send_mute_event(
        &mut self,
        send_type: SendType,
        source: u8,
        dest: u8,
        muted: bool,
    ) -> bool {
        let (_, dest_type) = send_type.channels();
        let dest_count = self.unit.count(dest_type);
        let matrix = self.send_mutes.entry(send_type).or_default();

        match matrix.set(source, dest, muted, dest_count) {
            Some(changed) => changed,
            None => {
                warn!(
                    "Dropping {} mute {}->{}: destination outside row of {} slots",
                    send_type,
                    source,
                    dest,
                    matrix.row(source).map(|row| row.len()).unwrap_or(0)
                );
                false
            }
        }
    }

    /// Mute flag for a 1-based channel (unmuted if unknown)
    pub fn get_mute(&self, ch_type: ChannelType, channel: u8) -> bool {
        channel
            .checked_sub(1)
            .and_then(|index| self.mute_table(ch_type).get(index as usize))
            .unwrap_or(false)
    }

    /// Send-mute flag for 1-based source/destination (unmuted if unknown)
    pub fn get_send_mute(&self, send_type: SendType, source: u8, dest: u8) -> bool {
        self.send_mutes
            .get(&send_type)
            .map(|matrix| matrix.get(source, dest))
            .unwrap_or(false)
    }

    /// Apply a decoded event, returning the resulting change if any
    ///
    /// Level events always yield a change since they are not stored.
    pub fn apply_event(&mut self, event: &DeviceEvent) -> Option<StateChange> {
        match *event {
            DeviceEvent::Mute {
                ch_type,
                index,
                muted,
            } => {
                if !self.apply_mute_event(ch_type, index, muted) {
                    trace!("{} mute {} unchanged", ch_type, index as u16 + 1);
                    return None;
                }
                Some(StateChange::Mute {
                    ch_type,
                    channel: index.checked_add(1)?,
                    muted,
                })
            }
            DeviceEvent::SendMute {
                send_type,
                source,
                dest,
                muted,
            } => {
                let channel = source.checked_add(1)?;
                let send_channel = dest.checked_add(1)?;
                if !self.apply_send_mute_event(send_type, channel, send_channel, muted) {
                    return None;
                }
                Some(StateChange::SendMute {
                    send_type,
                    channel,
                    send_channel,
                    muted,
                })
            }
            DeviceEvent::Level {
                ch_type,
                index,
                level,
            } => Some(StateChange::Level {
                ch_type,
                channel: index.checked_add(1)?,
                level,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode;
    use crate::state::UnitType;

    fn state_for(unit: UnitType) -> DeviceState {
        DeviceState::new(unit.unit())
    }

    #[test]
    fn test_new_state_is_unmuted() {
        let state = state_for(UnitType::Ahm32);
        assert_eq!(state.mute_table(ChannelType::Input).len(), 32);
        assert_eq!(state.mute_table(ChannelType::Zone).len(), 32);
        for ch in 1..=32 {
            assert!(!state.get_mute(ChannelType::Input, ch));
            assert!(!state.get_mute(ChannelType::Zone, ch));
        }
    }

    #[test]
    fn test_mute_event_is_idempotent() {
        let mut once = state_for(UnitType::Ahm16);
        let mut twice = state_for(UnitType::Ahm16);

        assert!(once.apply_mute_event(ChannelType::Zone, 3, true));
        assert!(twice.apply_mute_event(ChannelType::Zone, 3, true));
        assert!(!twice.apply_mute_event(ChannelType::Zone, 3, true));

        assert_eq!(
            once.mute_table(ChannelType::Zone),
            twice.mute_table(ChannelType::Zone)
        );
        assert!(twice.get_mute(ChannelType::Zone, 4));
    }

    #[test]
    fn test_mute_event_out_of_table_is_dropped() {
        let mut state = state_for(UnitType::Ahm16);
        assert!(!state.apply_mute_event(ChannelType::Input, 16, true));
        assert!(!state.apply_mute_event(ChannelType::Input, 200, true));
        assert_eq!(state.mute_table(ChannelType::Input).len(), 16);
        assert!(!state.get_mute(ChannelType::Input, 0));
        assert!(!state.get_mute(ChannelType::Input, 17));
    }

    #[test]
    fn test_decoded_mute_frames() {
        let mut state = state_for(UnitType::Ahm64);

        let event = decode(&[144, 5, 0]).unwrap();
        state.apply_event(&event);
        assert!(state.get_mute(ChannelType::Input, 6));

        let event = decode(&[144, 5, 63]).unwrap();
        state.apply_event(&event);
        assert!(!state.get_mute(ChannelType::Input, 6));
    }

    #[test]
    fn test_send_mute_lazy_row() {
        let mut state = state_for(UnitType::Ahm64);
        assert!(state.send_matrix(SendType::InputToZone).is_none());

        assert!(state.apply_send_mute_event(SendType::InputToZone, 3, 5, true));
        assert!(state.get_send_mute(SendType::InputToZone, 3, 5));
        assert!(!state.get_send_mute(SendType::InputToZone, 3, 6));
        assert!(!state.get_send_mute(SendType::InputToZone, 4, 5));

        let matrix = state.send_matrix(SendType::InputToZone).unwrap();
        assert_eq!(matrix.row_count(), 1);
        assert_eq!(matrix.row(3).unwrap().len(), 65);
    }

    #[test]
    fn test_send_mute_outside_row_is_dropped() {
        let mut state = state_for(UnitType::Ahm16);
        assert!(state.apply_send_mute_event(SendType::InputToZone, 1, 16, true));
        assert!(!state.apply_send_mute_event(SendType::InputToZone, 1, 17, true));
        assert!(!state.apply_send_mute_event(SendType::InputToZone, 2, 40, true));

        // Other cells unaffected
        assert!(state.get_send_mute(SendType::InputToZone, 1, 16));
        assert!(!state.get_send_mute(SendType::InputToZone, 2, 40));
        assert_eq!(
            state
                .send_matrix(SendType::InputToZone)
                .unwrap()
                .row(1)
                .unwrap()
                .len(),
            17
        );
    }

    #[test]
    fn test_apply_event_reports_changes() {
        let mut state = state_for(UnitType::Ahm16);
        let event = DeviceEvent::SendMute {
            send_type: SendType::InputToZone,
            source: 2,
            dest: 4,
            muted: true,
        };
        assert_eq!(
            state.apply_event(&event),
            Some(StateChange::SendMute {
                send_type: SendType::InputToZone,
                channel: 3,
                send_channel: 5,
                muted: true,
            })
        );
        assert_eq!(state.apply_event(&event), None);

        let level = DeviceEvent::Level {
            ch_type: ChannelType::Zone,
            index: 0,
            level: 42,
        };
        assert_eq!(
            state.apply_event(&level),
            Some(StateChange::Level {
                ch_type: ChannelType::Zone,
                channel: 1,
                level: 42,
            })
        );
    }

    #[test]
    fn test_reset_resizes_and_clears() {
        let mut state = state_for(UnitType::Ahm64);
        state.apply_mute_event(ChannelType::Input, 40, true);
        state.apply_send_mute_event(SendType::InputToZone, 50, 60, true);

        state.reset(UnitType::Ahm16.unit());

        assert_eq!(state.mute_table(ChannelType::Input).len(), 16);
        assert_eq!(state.mute_table(ChannelType::Zone).len(), 16);
        assert!(state.send_matrix(SendType::InputToZone).is_none());
        assert!(!state.get_send_mute(SendType::InputToZone, 50, 60));
        assert!(!state.get_mute(ChannelType::Input, 41));
    }
}
