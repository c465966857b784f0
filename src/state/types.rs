//! Device size presets

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::protocol::ChannelType;

/// Supported processor models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    Ahm16,
    Ahm32,
    Ahm64,
}

impl UnitType {
    /// All supported unit types
    pub fn all() -> &'static [UnitType] {
        &[UnitType::Ahm16, UnitType::Ahm32, UnitType::Ahm64]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UnitType::Ahm16 => "ahm16",
            UnitType::Ahm32 => "ahm32",
            UnitType::Ahm64 => "ahm64",
        }
    }

    /// Channel capacities for this model
    pub fn unit(&self) -> DeviceUnit {
        let count = match self {
            UnitType::Ahm16 => 16,
            UnitType::Ahm32 => 32,
            UnitType::Ahm64 => 64,
        };
        DeviceUnit {
            inputs: count,
            zones: count,
        }
    }
}

impl std::str::FromStr for UnitType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ahm16" => Ok(UnitType::Ahm16),
            "ahm32" => Ok(UnitType::Ahm32),
            "ahm64" => Ok(UnitType::Ahm64),
            other => anyhow::bail!("unknown unit type '{}' (expected ahm16, ahm32 or ahm64)", other),
        }
    }
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel counts of the configured unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceUnit {
    pub inputs: u8,
    pub zones: u8,
}

impl DeviceUnit {
    /// Number of channels of the given type
    pub fn count(&self, ch_type: ChannelType) -> u8 {
        match ch_type {
            ChannelType::Input => self.inputs,
            ChannelType::Zone => self.zones,
        }
    }

    /// Whether a 1-based channel number exists on this unit
    pub fn contains(&self, ch_type: ChannelType, channel: u8) -> bool {
        channel >= 1 && channel <= self.count(ch_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_sizes() {
        assert_eq!(UnitType::Ahm16.unit(), DeviceUnit { inputs: 16, zones: 16 });
        assert_eq!(UnitType::Ahm64.unit().count(ChannelType::Zone), 64);
    }

    #[test]
    fn test_unit_type_parsing() {
        assert_eq!("ahm32".parse::<UnitType>().unwrap(), UnitType::Ahm32);
        assert_eq!("AHM64".parse::<UnitType>().unwrap(), UnitType::Ahm64);
        assert!("ahm48".parse::<UnitType>().is_err());

        let parsed: UnitType = serde_yaml::from_str("ahm16").unwrap();
        assert_eq!(parsed, UnitType::Ahm16);
    }

    #[test]
    fn test_contains() {
        let unit = UnitType::Ahm16.unit();
        assert!(unit.contains(ChannelType::Input, 1));
        assert!(unit.contains(ChannelType::Input, 16));
        assert!(!unit.contains(ChannelType::Input, 0));
        assert!(!unit.contains(ChannelType::Zone, 17));
    }
}
