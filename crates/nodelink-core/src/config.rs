//! Configuration types for the nodelink system
//!
//! [`NodeConfig`] holds the runtime tunables of a node. Values persisted on
//! the device itself (network name, static addressing, peer identifiers)
//! live in [`crate::store::NodeSettings`] instead.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Main node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// UDP port peers broadcast their announcements on
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,

    /// Upper bound for one association attempt, provisioning portal included
    /// (in seconds)
    #[serde(default = "default_portal_timeout_secs")]
    pub portal_timeout_secs: u64,

    /// Number of scan attempts before the signal strength lookup gives up
    #[serde(default = "default_scan_attempts")]
    pub scan_attempts: usize,

    /// Interval between link checks in the control loop (in seconds)
    #[serde(default = "default_link_check_interval_secs")]
    pub link_check_interval_secs: u64,

    /// Network name used when the persisted settings do not carry one
    #[serde(default)]
    pub fallback_ssid: Option<String>,

    /// Capacity of the node event channel
    ///
    /// When full, new events are dropped with a warning log.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl NodeConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            discovery_port: default_discovery_port(),
            portal_timeout_secs: default_portal_timeout_secs(),
            scan_attempts: default_scan_attempts(),
            link_check_interval_secs: default_link_check_interval_secs(),
            fallback_ssid: None,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// Set the network name used when nothing is persisted
    pub fn with_fallback_ssid(mut self, ssid: impl Into<String>) -> Self {
        self.fallback_ssid = Some(ssid.into());
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.discovery_port == 0 {
            return Err(crate::Error::config("Discovery port must be > 0"));
        }
        if self.portal_timeout_secs == 0 {
            return Err(crate::Error::config("Portal timeout must be > 0"));
        }
        if !(1..=10).contains(&self.scan_attempts) {
            return Err(crate::Error::config(format!(
                "Scan attempts must be between 1 and 10, got {}",
                self.scan_attempts
            )));
        }
        if self.link_check_interval_secs == 0 {
            return Err(crate::Error::config("Link check interval must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        if let Some(ssid) = &self.fallback_ssid
            && (ssid.is_empty() || ssid.len() > MAX_SSID_LEN)
        {
            return Err(crate::Error::config(format!(
                "Fallback SSID must be 1..={} bytes",
                MAX_SSID_LEN
            )));
        }
        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Maximum SSID length (IEEE 802.11)
pub const MAX_SSID_LEN: usize = 32;

/// How the node obtains its network address
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AddressingMode {
    /// Address assigned by the network (DHCP)
    #[default]
    Dynamic,

    /// Address fixed by configuration
    Static {
        /// Node address
        address: Ipv4Addr,
        /// Default gateway
        gateway: Ipv4Addr,
        /// Subnet mask
        netmask: Ipv4Addr,
    },
}

impl AddressingMode {
    /// Whether this is the static variant
    pub fn is_static(&self) -> bool {
        matches!(self, AddressingMode::Static { .. })
    }
}

impl std::fmt::Display for AddressingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressingMode::Dynamic => write!(f, "dynamic"),
            AddressingMode::Static {
                address,
                gateway,
                netmask,
            } => write!(f, "static {} gw {} mask {}", address, gateway, netmask),
        }
    }
}

fn default_discovery_port() -> u16 {
    5000
}

fn default_portal_timeout_secs() -> u64 {
    180
}

fn default_scan_attempts() -> usize {
    4
}

fn default_link_check_interval_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.portal_timeout_secs, 180);
        assert_eq!(config.scan_attempts, 4);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: NodeConfig = serde_json::from_str(r#"{"discovery_port": 6000}"#).unwrap();
        assert_eq!(config.discovery_port, 6000);
        assert_eq!(config.portal_timeout_secs, 180);
        assert!(config.fallback_ssid.is_none());
    }

    #[test]
    fn test_rejects_out_of_range_scan_attempts() {
        let mut config = NodeConfig::default();
        config.scan_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_oversized_ssid() {
        let config = NodeConfig::default().with_fallback_ssid("x".repeat(33));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_addressing_mode_tagged_serialization() {
        let mode = AddressingMode::Static {
            address: Ipv4Addr::new(10, 0, 0, 5),
            gateway: Ipv4Addr::new(10, 0, 0, 1),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
        };
        let json = serde_json::to_value(mode).unwrap();
        assert_eq!(json["mode"], "static");
        assert_eq!(json["address"], "10.0.0.5");

        let dynamic: AddressingMode = serde_json::from_str(r#"{"mode":"dynamic"}"#).unwrap();
        assert_eq!(dynamic, AddressingMode::Dynamic);
    }
}
