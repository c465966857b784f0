//! Feedback and variable contracts with the host
//!
//! The host renders feedbacks and declares variables; this crate only tells
//! it which feedback kinds to re-check and which variables changed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::protocol::{ChannelType, Request, SendType};
use crate::state::StateChange;

/// Feedback kinds the host can render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeedbackKind {
    InputMute,
    ZoneMute,
    InputToZoneMute,
}

impl FeedbackKind {
    pub fn id(&self) -> &'static str {
        match self {
            FeedbackKind::InputMute => "inputMute",
            FeedbackKind::ZoneMute => "zoneMute",
            FeedbackKind::InputToZoneMute => "inputToZoneMute",
        }
    }

    /// Feedback kind for a plain channel mute
    pub fn for_mute(ch_type: ChannelType) -> Self {
        match ch_type {
            ChannelType::Input => FeedbackKind::InputMute,
            ChannelType::Zone => FeedbackKind::ZoneMute,
        }
    }

    /// Feedback kind for a send mute
    pub fn for_send(send_type: SendType) -> Self {
        match send_type {
            SendType::InputToZone => FeedbackKind::InputToZoneMute,
        }
    }

    /// Feedback kind to re-check after a state change, if any
    pub fn for_change(change: &StateChange) -> Option<Self> {
        match *change {
            StateChange::Mute { ch_type, .. } => Some(Self::for_mute(ch_type)),
            StateChange::SendMute { send_type, .. } => Some(Self::for_send(send_type)),
            StateChange::Level { .. } => None,
        }
    }

    /// Send relationship this kind describes, if it is a send feedback
    pub fn send_type(&self) -> Option<SendType> {
        match self {
            FeedbackKind::InputToZoneMute => Some(SendType::InputToZone),
            _ => None,
        }
    }
}

impl fmt::Display for FeedbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// A (state, channel) pair the host wants refreshed on every poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonitoredFeedback {
    pub kind: FeedbackKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_type: Option<SendType>,
    pub channel: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_channel: Option<u8>,
}

impl MonitoredFeedback {
    pub fn mute(ch_type: ChannelType, channel: u8) -> Self {
        Self {
            kind: FeedbackKind::for_mute(ch_type),
            send_type: None,
            channel,
            send_channel: None,
        }
    }

    pub fn send_mute(send_type: SendType, channel: u8, send_channel: u8) -> Self {
        Self {
            kind: FeedbackKind::for_send(send_type),
            send_type: Some(send_type),
            channel,
            send_channel: Some(send_channel),
        }
    }

    /// Whether this entry tracks a send relationship
    pub fn is_send(&self) -> bool {
        self.kind.send_type().is_some()
    }

    /// Query that refreshes this entry
    ///
    /// A send feedback without a destination channel has nothing to query.
    pub fn request(&self) -> Option<Request> {
        match self.kind {
            FeedbackKind::InputMute => Some(Request::MuteQuery {
                ch_type: ChannelType::Input,
                channel: self.channel,
            }),
            FeedbackKind::ZoneMute => Some(Request::MuteQuery {
                ch_type: ChannelType::Zone,
                channel: self.channel,
            }),
            FeedbackKind::InputToZoneMute => Some(Request::SendMuteQuery {
                send_type: self.send_type.or(self.kind.send_type())?,
                channel: self.channel,
                send_channel: self.send_channel?,
            }),
        }
    }
}

/// Set of monitored feedbacks, in subscription order
#[derive(Debug, Clone, Default)]
pub struct FeedbackRegistry {
    entries: Vec<MonitoredFeedback>,
}

impl FeedbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entry; duplicates are ignored
    ///
    /// Returns true if the entry was newly added.
    pub fn subscribe(&mut self, entry: MonitoredFeedback) -> bool {
        if self.entries.contains(&entry) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn unsubscribe(&mut self, entry: &MonitoredFeedback) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e != entry);
        self.entries.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &MonitoredFeedback> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl FromIterator<MonitoredFeedback> for FeedbackRegistry {
    fn from_iter<I: IntoIterator<Item = MonitoredFeedback>>(iter: I) -> Self {
        let mut registry = Self::new();
        for entry in iter {
            registry.subscribe(entry);
        }
        registry
    }
}

/// Variable name carrying the level of a 1-based channel
pub fn level_variable_name(ch_type: ChannelType, channel: u8) -> String {
    format!("{}_{}_lvl", ch_type.short_name(), channel)
}

/// Variable value for a dBu level
///
/// JSON has no infinity, so silence is published as the string "-inf".
pub fn level_variable_value(dbu: f32) -> Value {
    serde_json::Number::from_f64(dbu as f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(crate::dbu::format_dbu(dbu)))
}

/// Callback type for feedback re-check requests
pub type FeedbackCallback = Arc<dyn Fn(FeedbackKind) + Send + Sync>;

/// Callback type for variable publication: (name, value)
pub type VariableCallback = Arc<dyn Fn(String, Value) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_variable_names() {
        assert_eq!(level_variable_name(ChannelType::Input, 1), "ip_1_lvl");
        assert_eq!(level_variable_name(ChannelType::Zone, 64), "zn_64_lvl");
    }

    #[test]
    fn test_level_variable_values() {
        assert_eq!(level_variable_value(f32::NEG_INFINITY), Value::String("-inf".to_string()));
        assert_eq!(level_variable_value(-30.0).as_f64(), Some(-30.0));
        assert_eq!(level_variable_value(0.0).as_f64(), Some(0.0));
    }

    #[test]
    fn test_kind_for_change() {
        let change = StateChange::Mute {
            ch_type: ChannelType::Zone,
            channel: 2,
            muted: true,
        };
        assert_eq!(FeedbackKind::for_change(&change), Some(FeedbackKind::ZoneMute));

        let change = StateChange::Level {
            ch_type: ChannelType::Input,
            channel: 1,
            level: 0,
        };
        assert_eq!(FeedbackKind::for_change(&change), None);
    }

    #[test]
    fn test_monitored_requests() {
        let entry = MonitoredFeedback::send_mute(SendType::InputToZone, 3, 5);
        assert_eq!(
            entry.request(),
            Some(Request::SendMuteQuery {
                send_type: SendType::InputToZone,
                channel: 3,
                send_channel: 5,
            })
        );

        let incomplete = MonitoredFeedback {
            kind: FeedbackKind::InputToZoneMute,
            send_type: None,
            channel: 3,
            send_channel: None,
        };
        assert_eq!(incomplete.request(), None);

        let entry = MonitoredFeedback::mute(ChannelType::Input, 7);
        assert!(!entry.is_send());
        assert_eq!(
            entry.request(),
            Some(Request::MuteQuery {
                ch_type: ChannelType::Input,
                channel: 7,
            })
        );
    }

    #[test]
    fn test_registry_dedupes() {
        let mut registry = FeedbackRegistry::new();
        let entry = MonitoredFeedback::send_mute(SendType::InputToZone, 1, 2);
        assert!(registry.subscribe(entry));
        assert!(!registry.subscribe(entry));
        assert_eq!(registry.len(), 1);
        assert!(registry.unsubscribe(&entry));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_monitored_from_yaml() {
        let yaml = "kind: inputToZoneMute\nchannel: 3\nsend_channel: 5\n";
        let entry: MonitoredFeedback = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(entry.kind, FeedbackKind::InputToZoneMute);
        assert_eq!(entry.send_channel, Some(5));
        assert!(entry.request().is_some());
    }
}
