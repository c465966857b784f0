//! Driver trait implementation for the AHM
//!
//! Handles action execution, initialization, and lifecycle management.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::driver::AhmDriver;
use super::Driver;
use crate::feedback::MonitoredFeedback;
use crate::protocol::{ChannelType, Request, SendType};
use crate::status::{ConnectionStatus, StatusCallback};

/// Parse a channel type param ("input" / "zone")
fn param_ch_type(params: &[Value], idx: usize) -> Result<ChannelType> {
    let value = params
        .get(idx)
        .with_context(|| format!("Missing channel type at param {}", idx))?;
    serde_json::from_value(value.clone())
        .with_context(|| format!("Invalid channel type {}, expected \"input\" or \"zone\"", value))
}

/// Parse a 1-based channel number param
fn param_channel(params: &[Value], idx: usize) -> Result<u8> {
    let value = params
        .get(idx)
        .and_then(|v| v.as_u64())
        .with_context(|| format!("Channel number required at param {}", idx))?;
    u8::try_from(value)
        .ok()
        .filter(|ch| *ch >= 1)
        .ok_or_else(|| anyhow!("Channel number {} out of range", value))
}

fn param_bool(params: &[Value], idx: usize) -> Result<bool> {
    match params.get(idx) {
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::Number(n)) => Ok(n.as_u64().unwrap_or(0) != 0),
        Some(other) => Err(anyhow!("Expected boolean at param {}, got {}", idx, other)),
        None => Err(anyhow!("Missing boolean at param {}", idx)),
    }
}

impl AhmDriver {
    /// Check a channel lies within the configured unit
    fn ensure_in_unit(&self, ch_type: ChannelType, channel: u8) -> Result<()> {
        let unit = self.unit();
        if !unit.contains(ch_type, channel) {
            return Err(anyhow!(
                "{} {} is outside the configured unit (1-{})",
                ch_type,
                channel,
                unit.count(ch_type)
            ));
        }
        Ok(())
    }

    /// Parse `[channel, send_channel]` into an input-to-zone send feedback
    fn parse_send_params(&self, params: &[Value]) -> Result<MonitoredFeedback> {
        let channel = param_channel(params, 0)?;
        let send_channel = param_channel(params, 1)?;
        let (source, dest) = SendType::InputToZone.channels();
        self.ensure_in_unit(source, channel)?;
        self.ensure_in_unit(dest, send_channel)?;
        Ok(MonitoredFeedback::send_mute(SendType::InputToZone, channel, send_channel))
    }

    fn dispatch_request(&self, request: Request) -> Result<()> {
        if !self.is_connected() {
            warn!("⚠️  AHM not connected, {} dropped", request);
            return Err(anyhow!("AHM not connected"));
        }
        info!("🎚️ AHM {}", request);
        if !self.send_request(request) {
            return Err(anyhow!("Failed to send {}", request));
        }
        Ok(())
    }
}

#[async_trait]
impl Driver for AhmDriver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self) -> Result<()> {
        info!("🎛️ Initializing AHM driver");

        match self.connect().await {
            Ok(_) if self.is_connected() => info!("✅ AHM connected on init"),
            Ok(_) => info!("AHM has no host configured, waiting for configuration"),
            Err(e) => {
                // No retry loop: reapplying the configuration reconnects
                warn!("⚠️  AHM connection failed on init: {:#}", e);
            }
        }

        // Always succeed - driver is registered even if disconnected
        Ok(())
    }

    async fn execute(&self, action: &str, params: Vec<Value>) -> Result<()> {
        match action {
            "refresh" => {
                if !self.refresh() {
                    debug!("AHM refresh not started");
                }
                Ok(())
            },

            "mute" => {
                let ch_type = param_ch_type(&params, 0)?;
                let channel = param_channel(&params, 1)?;
                let muted = param_bool(&params, 2)?;
                self.ensure_in_unit(ch_type, channel)?;

                self.dispatch_request(Request::SetMute {
                    ch_type,
                    channel,
                    muted,
                })
            },

            "level" => {
                let ch_type = param_ch_type(&params, 0)?;
                let channel = param_channel(&params, 1)?;
                let level = params
                    .get(2)
                    .and_then(|v| v.as_u64())
                    .context("Level (0-127) required at param 2")?;
                let level = u8::try_from(level)
                    .ok()
                    .filter(|l| *l <= 127)
                    .ok_or_else(|| anyhow!("Level {} outside 0-127", level))?;
                self.ensure_in_unit(ch_type, channel)?;

                self.dispatch_request(Request::SetLevel {
                    ch_type,
                    channel,
                    level,
                })
            },

            "monitor" => {
                let entry = self
                    .parse_send_params(&params)
                    .context("monitor requires [channel, send_channel]")?;
                if self.monitor(entry) {
                    debug!("Monitoring {} {}->{:?}", entry.kind, entry.channel, entry.send_channel);
                }
                // Query right away so the feedback does not wait for the next cycle
                if let Some(request) = entry.request() {
                    if self.is_connected() {
                        self.send_request(request);
                    }
                }
                Ok(())
            },

            "unmonitor" => {
                let entry = self
                    .parse_send_params(&params)
                    .context("unmonitor requires [channel, send_channel]")?;
                self.unmonitor(&entry);
                Ok(())
            },

            _ => {
                warn!("Unknown AHM action: {}", action);
                Ok(())
            },
        }
    }

    async fn sync(&self) -> Result<()> {
        debug!("AHM driver sync - refreshing state");
        self.refresh();
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        info!("Shutting down AHM driver");
        self.teardown("Shutdown");
        info!("✅ AHM driver shutdown complete");
        Ok(())
    }

    fn connection_status(&self) -> ConnectionStatus {
        self.current_status.read().0
    }

    fn subscribe_connection_status(&self, callback: StatusCallback) {
        debug!("AHM driver: new connection status subscription");

        // Emit current status immediately to new subscriber
        let (status, message) = self.current_status.read().clone();
        callback(status, message);

        self.status_callbacks.write().push(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, DeviceConfig};
    use crate::protocol::{SYSEX_END, MUTED_VALUE};
    use crate::state::UnitType;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn offline_driver(unit: UnitType) -> AhmDriver {
        let mut device = DeviceConfig::new("");
        device.unit = unit;
        AhmDriver::new(AppConfig::for_device(device))
    }

    #[test]
    fn test_param_parsing() {
        let params = vec![json!("zone"), json!(12), json!(true)];
        assert_eq!(param_ch_type(&params, 0).unwrap(), ChannelType::Zone);
        assert_eq!(param_channel(&params, 1).unwrap(), 12);
        assert!(param_bool(&params, 2).unwrap());
        assert!(param_bool(&[json!(0)], 0).is_ok_and(|b| !b));

        assert!(param_ch_type(&[json!("bus")], 0).is_err());
        assert!(param_channel(&[json!(0)], 0).is_err());
        assert!(param_channel(&[json!(300)], 0).is_err());
        assert!(param_bool(&[json!("yes")], 0).is_err());
    }

    #[tokio::test]
    async fn test_init_without_host_succeeds() {
        let driver = offline_driver(UnitType::Ahm64);
        driver.init().await.unwrap();
        assert_eq!(driver.connection_status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_init_connection_failure_is_not_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut device = DeviceConfig::new("127.0.0.1");
        device.port = port;
        let driver = AhmDriver::new(AppConfig::for_device(device));

        driver.init().await.unwrap();
        assert_eq!(driver.connection_status(), ConnectionStatus::ConnectionFailure);
    }

    #[tokio::test]
    async fn test_subscribe_replays_current_status() {
        let driver = offline_driver(UnitType::Ahm64);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        driver.subscribe_connection_status(Arc::new(move |status, _| seen_clone.lock().push(status)));

        driver.shutdown().await.unwrap();
        assert_eq!(seen.lock().first(), Some(&ConnectionStatus::Disconnected));
    }

    #[tokio::test]
    async fn test_actions_validate_params() {
        let driver = offline_driver(UnitType::Ahm16);

        assert!(driver.execute("mute", vec![json!("input"), json!(3)]).await.is_err());
        assert!(driver
            .execute("mute", vec![json!("input"), json!(20), json!(true)])
            .await
            .is_err());
        assert!(driver
            .execute("level", vec![json!("zone"), json!(1), json!(200)])
            .await
            .is_err());
        // Valid but not connected
        assert!(driver
            .execute("mute", vec![json!("input"), json!(3), json!(true)])
            .await
            .is_err());

        driver.execute("doesNotExist", vec![]).await.unwrap();
        driver.execute("refresh", vec![]).await.unwrap();
    }

    #[tokio::test]
    async fn test_monitor_and_unmonitor() {
        let driver = offline_driver(UnitType::Ahm16);

        driver.execute("monitor", vec![json!(3), json!(5)]).await.unwrap();
        assert_eq!(
            driver.monitored(),
            vec![MonitoredFeedback::send_mute(SendType::InputToZone, 3, 5)]
        );
        assert!(driver.execute("monitor", vec![json!(3), json!(17)]).await.is_err());

        driver.execute("unmonitor", vec![json!(3), json!(5)]).await.unwrap();
        assert!(driver.monitored().is_empty());
    }

    #[tokio::test]
    async fn test_mute_action_writes_set_command() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut device = DeviceConfig::new("127.0.0.1");
        device.port = port;
        device.unit = UnitType::Ahm16;
        let mut config = AppConfig::for_device(device);
        config.poll.request_delay_ms = 0;
        let driver = AhmDriver::new(config);

        driver.init().await.unwrap();
        let (mut socket, _) = listener.accept().await.unwrap();

        // Drain the 64-request readout first
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        while received.iter().filter(|b| **b == SYSEX_END).count() < 64 {
            let n = socket.read(&mut buf).await.unwrap();
            received.extend_from_slice(&buf[..n]);
        }
        // Readout frames all end in F7, nothing trails them
        assert_eq!(received.last(), Some(&SYSEX_END));

        driver
            .execute("mute", vec![json!("input"), json!(3), json!(true)])
            .await
            .unwrap();

        let mut command = [0u8; 6];
        tokio::time::timeout(Duration::from_secs(2), socket.read_exact(&mut command))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(command, [0x90, 0x02, MUTED_VALUE, 0x90, 0x02, 0x00]);

        driver.shutdown().await.unwrap();
        assert_eq!(driver.connection_status(), ConnectionStatus::Disconnected);
    }
}
