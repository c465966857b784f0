//! Configuration management for AHM Link
//!
//! Handles loading, parsing, and hot-reloading of YAML configuration files.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::fs;

use crate::feedback::MonitoredFeedback;
use crate::protocol::ChannelType;
use crate::state::UnitType;

pub use watcher::ConfigWatcher;

/// TCP port of the processor's MIDI control interface
pub const DEFAULT_MIDI_PORT: u16 = 51325;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    pub device: DeviceConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub monitored: Vec<MonitoredFeedback>,
}

/// Processor connection settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// IPv4 address; empty leaves the device unconfigured
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_unit")]
    pub unit: UnitType,
}

/// Request pacing and refresh settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PollConfig {
    /// Delay between successive requests
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: u64,
    /// Periodic refresh of monitored feedbacks; disabled when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: default_request_delay(),
            interval_ms: None,
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl PollConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl DeviceConfig {
    /// Build a device config with default port and unit
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            unit: default_unit(),
        }
    }

    /// Whether a host has been supplied
    pub fn is_configured(&self) -> bool {
        !self.host.trim().is_empty()
    }

    /// `host:port` for the socket
    pub fn address(&self) -> String {
        format!("{}:{}", self.host.trim(), self.port)
    }
}

impl AppConfig {
    /// Configuration for a device with all other settings defaulted
    pub fn for_device(device: DeviceConfig) -> Self {
        Self {
            device,
            poll: PollConfig::default(),
            monitored: Vec::new(),
        }
    }

    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path))?;

        Ok(config)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.device.is_configured() {
            self.device
                .host
                .trim()
                .parse::<Ipv4Addr>()
                .with_context(|| format!("Device host '{}' is not an IPv4 address", self.device.host))?;
        }

        if self.device.port == 0 {
            anyhow::bail!("Device port cannot be 0");
        }

        if self.poll.connect_timeout_ms == 0 {
            anyhow::bail!("poll.connect_timeout_ms must be greater than 0");
        }

        let unit = self.device.unit.unit();
        for (idx, entry) in self.monitored.iter().enumerate() {
            let (source, dest) = match entry.kind.send_type() {
                Some(send_type) => send_type.channels(),
                None if entry.kind == crate::feedback::FeedbackKind::ZoneMute => {
                    (ChannelType::Zone, ChannelType::Zone)
                }
                None => (ChannelType::Input, ChannelType::Input),
            };

            if !unit.contains(source, entry.channel) {
                anyhow::bail!(
                    "Monitored feedback {} ({}) channel {} is outside {} (1-{})",
                    idx,
                    entry.kind,
                    entry.channel,
                    self.device.unit,
                    unit.count(source)
                );
            }

            if entry.kind.send_type().is_some() {
                match entry.send_channel {
                    Some(ch) if unit.contains(dest, ch) => {}
                    Some(ch) => anyhow::bail!(
                        "Monitored feedback {} ({}) send channel {} is outside {} (1-{})",
                        idx,
                        entry.kind,
                        ch,
                        self.device.unit,
                        unit.count(dest)
                    ),
                    None => anyhow::bail!(
                        "Monitored feedback {} ({}) requires 'send_channel'",
                        idx,
                        entry.kind
                    ),
                }
            }
        }

        Ok(())
    }

    /// Whether switching to `other` requires tearing down the connection
    pub fn requires_reconnect(&self, other: &AppConfig) -> bool {
        self.device != other.device
    }
}

// Default value functions
fn default_port() -> u16 { DEFAULT_MIDI_PORT }
fn default_unit() -> UnitType { UnitType::Ahm64 }
fn default_request_delay() -> u64 { 150 }
fn default_connect_timeout() -> u64 { 5000 }
