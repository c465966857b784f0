//! Device drivers
//!
//! A driver owns the connection to one device and exposes it to the host
//! through named actions plus status, feedback and variable callbacks.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::status::{ConnectionStatus, StatusCallback};

/// Driver trait - the host talks to every device through this
///
/// Note: All methods take &self (not &mut self) to support Arc<dyn Driver>.
/// Drivers use interior mutability for their state.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Get the driver name (e.g., "ahm")
    fn name(&self) -> &str;

    /// Initialize the driver (connect to the device)
    ///
    /// A failed connection is reported through status, not as an error, so
    /// the driver stays registered and can be reconfigured later.
    async fn init(&self) -> Result<()>;

    /// Execute an action with parameters
    ///
    /// # Arguments
    /// * `action` - The action name (e.g., "mute", "refresh")
    /// * `params` - JSON parameters from the host
    async fn execute(&self, action: &str, params: Vec<Value>) -> Result<()>;

    /// Re-read device state
    async fn sync(&self) -> Result<()>;

    /// Shutdown the driver gracefully
    async fn shutdown(&self) -> Result<()>;

    /// Get current connection status
    ///
    /// Default implementation: always Ok (for drivers without a connection)
    fn connection_status(&self) -> ConnectionStatus {
        ConnectionStatus::Ok
    }

    /// Subscribe to connection status changes
    ///
    /// Default implementation: no-op (driver doesn't track connection status)
    fn subscribe_connection_status(&self, _callback: StatusCallback) {}
}

pub mod ahm;

pub use ahm::AhmDriver;
