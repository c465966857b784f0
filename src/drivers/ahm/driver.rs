//! AHM Driver core struct and initialization
//!
//! Defines the AhmDriver struct with all its shared state, constructors,
//! subscriptions and the state queries feedback consumers use.

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::AppConfig;
use crate::feedback::{FeedbackCallback, FeedbackKind, FeedbackRegistry, MonitoredFeedback, VariableCallback};
use crate::protocol::{ChannelType, Frame, SendType};
use crate::state::{DeviceState, DeviceUnit};
use crate::status::{ConnectionState, ConnectionStatus, StatusCallback};

/// Driver for one AHM processor over its TCP MIDI port
pub struct AhmDriver {
    pub(super) name: String,
    pub(super) config: Arc<RwLock<AppConfig>>,

    // Local mirror, written only by the reader task
    pub(super) state: Arc<Mutex<DeviceState>>,
    pub(super) monitored: Arc<RwLock<FeedbackRegistry>>,

    // Connection
    pub(super) conn_state: Arc<RwLock<ConnectionState>>,
    pub(super) writer: Arc<Mutex<Option<mpsc::UnboundedSender<Frame>>>>,
    pub(super) generation: Arc<AtomicU64>,
    pub(super) tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    pub(super) readout_running: Arc<AtomicBool>,

    // Host collaborators
    pub(super) status_callbacks: Arc<RwLock<Vec<StatusCallback>>>,
    pub(super) current_status: Arc<RwLock<(ConnectionStatus, String)>>,
    pub(super) feedback_callbacks: Arc<RwLock<Vec<FeedbackCallback>>>,
    pub(super) variable_callbacks: Arc<RwLock<Vec<VariableCallback>>>,
}

impl AhmDriver {
    /// Create a driver for the given configuration (does not connect)
    pub fn new(config: AppConfig) -> Self {
        let state = DeviceState::new(config.device.unit.unit());
        let monitored: FeedbackRegistry = config.monitored.iter().copied().collect();

        Self {
            name: "ahm".to_string(),
            config: Arc::new(RwLock::new(config)),
            state: Arc::new(Mutex::new(state)),
            monitored: Arc::new(RwLock::new(monitored)),
            conn_state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            writer: Arc::new(Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
            tasks: Arc::new(Mutex::new(Vec::new())),
            readout_running: Arc::new(AtomicBool::new(false)),
            status_callbacks: Arc::new(RwLock::new(Vec::new())),
            current_status: Arc::new(RwLock::new((
                ConnectionStatus::Disconnected,
                "Not connected".to_string(),
            ))),
            feedback_callbacks: Arc::new(RwLock::new(Vec::new())),
            variable_callbacks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Clone all Arc fields for spawning background tasks
    pub(super) fn clone_for_task(&self) -> Self {
        Self {
            name: self.name.clone(),
            config: Arc::clone(&self.config),
            state: Arc::clone(&self.state),
            monitored: Arc::clone(&self.monitored),
            conn_state: Arc::clone(&self.conn_state),
            writer: Arc::clone(&self.writer),
            generation: Arc::clone(&self.generation),
            tasks: Arc::clone(&self.tasks),
            readout_running: Arc::clone(&self.readout_running),
            status_callbacks: Arc::clone(&self.status_callbacks),
            current_status: Arc::clone(&self.current_status),
            feedback_callbacks: Arc::clone(&self.feedback_callbacks),
            variable_callbacks: Arc::clone(&self.variable_callbacks),
        }
    }

    /// Snapshot of the configuration in effect
    pub fn config(&self) -> AppConfig {
        self.config.read().clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.conn_state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Channel counts of the mirrored unit
    pub fn unit(&self) -> DeviceUnit {
        self.state.lock().unit()
    }

    /// Mute state of a 1-based channel
    pub fn get_mute(&self, ch_type: ChannelType, channel: u8) -> bool {
        self.state.lock().get_mute(ch_type, channel)
    }

    /// Send-mute state of a 1-based source/destination pair
    pub fn get_send_mute(&self, send_type: SendType, channel: u8, send_channel: u8) -> bool {
        self.state.lock().get_send_mute(send_type, channel, send_channel)
    }

    /// Register a feedback to refresh on every poll cycle
    pub fn monitor(&self, entry: MonitoredFeedback) -> bool {
        self.monitored.write().subscribe(entry)
    }

    pub fn unmonitor(&self, entry: &MonitoredFeedback) -> bool {
        self.monitored.write().unsubscribe(entry)
    }

    pub fn monitored(&self) -> Vec<MonitoredFeedback> {
        self.monitored.read().iter().copied().collect()
    }

    /// Subscribe to feedback re-check requests
    pub fn subscribe_feedbacks(&self, callback: FeedbackCallback) {
        self.feedback_callbacks.write().push(callback);
    }

    /// Subscribe to variable updates (level variables)
    pub fn subscribe_variables(&self, callback: VariableCallback) {
        self.variable_callbacks.write().push(callback);
    }

    /// Record a state transition and emit the matching status to all subscribers
    pub(super) fn set_state(&self, state: ConnectionState, message: impl Into<String>) {
        let message = message.into();
        *self.conn_state.write() = state;
        let status = state.status();
        *self.current_status.write() = (status, message.clone());

        debug!("AHM status -> {} ({})", status, message);

        let callbacks = self.status_callbacks.read().clone();
        for callback in callbacks.iter() {
            callback(status, message.clone());
        }
    }

    /// Ask the host to re-evaluate feedbacks of one kind
    pub(super) fn check_feedbacks(&self, kind: FeedbackKind) {
        let callbacks = self.feedback_callbacks.read().clone();
        for callback in callbacks.iter() {
            callback(kind);
        }
    }

    /// Publish a variable value to the host
    pub(super) fn set_variable(&self, name: String, value: Value) {
        let callbacks = self.variable_callbacks.read().clone();
        for callback in callbacks.iter() {
            callback(name.clone(), value.clone());
        }
    }

    /// Whether work started under `generation` may still touch the socket
    pub(super) fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation && self.is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::state::UnitType;

    #[test]
    fn test_new_driver_is_disconnected() {
        let mut device = DeviceConfig::new("");
        device.unit = UnitType::Ahm32;
        let driver = AhmDriver::new(AppConfig::for_device(device));

        assert_eq!(driver.connection_state(), ConnectionState::Disconnected);
        assert_eq!(driver.unit().inputs, 32);
        assert!(!driver.get_mute(ChannelType::Input, 1));
        assert!(!driver.get_send_mute(SendType::InputToZone, 1, 1));
    }

    #[test]
    fn test_status_fan_out() {
        let driver = AhmDriver::new(AppConfig::for_device(DeviceConfig::new("")));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        driver
            .status_callbacks
            .write()
            .push(Arc::new(move |status, _msg| seen_clone.lock().push(status)));

        driver.set_state(ConnectionState::Connecting, "test");
        driver.set_state(ConnectionState::Failed, "boom");

        assert_eq!(
            *seen.lock(),
            vec![ConnectionStatus::Connecting, ConnectionStatus::ConnectionFailure]
        );
        assert_eq!(driver.current_status.read().1, "boom");
    }

    #[test]
    fn test_monitor_registry() {
        let driver = AhmDriver::new(AppConfig::for_device(DeviceConfig::new("")));
        let entry = MonitoredFeedback::send_mute(SendType::InputToZone, 2, 3);
        assert!(driver.monitor(entry));
        assert!(!driver.monitor(entry));
        assert_eq!(driver.monitored(), vec![entry]);
        assert!(driver.unmonitor(&entry));
        assert!(driver.monitored().is_empty());
    }
}
