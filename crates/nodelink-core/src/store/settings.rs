//! Typed view over the persisted config entries
//!
//! Call sites work with [`NodeSettings`] instead of raw keys. Validation
//! happens once, when the entries are loaded; keys this module does not
//! know about are carried in [`NodeSettings::extra`] untouched.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use crate::config::{AddressingMode, MAX_SSID_LEN};
use crate::error::Result;
use crate::peers::PeerRole;
use crate::traits::{ConfigEntries, ConfigStore, value_as_entry};

/// Installation location of the node
pub const KEY_LOCATION: &str = "devLoc";
/// Identifier of the paired light
pub const KEY_LIGHT_ID: &str = "lightID";
/// Identifier of the paired camera
pub const KEY_CAMERA_ID: &str = "camID";
/// Identifier of the paired security device
pub const KEY_SECURITY_ID: &str = "secID";
/// Network name to associate with
pub const KEY_SSID: &str = "ssid";
/// Static node address
pub const KEY_STATIC_IP: &str = "staticIP";
/// Static gateway address
pub const KEY_STATIC_GATEWAY: &str = "staticGateway";
/// Static subnet mask
pub const KEY_STATIC_NETMASK: &str = "staticNetmask";

const RECOGNIZED_KEYS: [&str; 8] = [
    KEY_LOCATION,
    KEY_LIGHT_ID,
    KEY_CAMERA_ID,
    KEY_SECURITY_ID,
    KEY_SSID,
    KEY_STATIC_IP,
    KEY_STATIC_GATEWAY,
    KEY_STATIC_NETMASK,
];

/// Location reported until one is configured
pub const DEFAULT_LOCATION: &str = "unknown";

/// Settings a node persists across reboots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSettings {
    /// Installation location
    pub location: String,
    /// Light identifier, empty when unpaired
    pub light_id: String,
    /// Camera identifier, empty when unpaired
    pub camera_id: String,
    /// Security device identifier, empty when unpaired
    pub security_id: String,
    /// Network name, if one was ever configured
    pub ssid: Option<String>,
    /// Addressing mode for association
    pub addressing: AddressingMode,
    /// Unrecognized entries, preserved as strings
    pub extra: BTreeMap<String, String>,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            location: DEFAULT_LOCATION.to_string(),
            light_id: String::new(),
            camera_id: String::new(),
            security_id: String::new(),
            ssid: None,
            addressing: AddressingMode::Dynamic,
            extra: BTreeMap::new(),
        }
    }
}

impl NodeSettings {
    /// Load settings from a config store
    pub async fn load(store: &dyn ConfigStore) -> Self {
        Self::from_entries(&store.entries().await)
    }

    /// Build settings from raw entries, validating as we go
    pub fn from_entries(entries: &ConfigEntries) -> Self {
        let text = |key: &str| entries.get(key).and_then(value_as_entry);

        let ssid = text(KEY_SSID).filter(|s| {
            let valid = !s.is_empty() && s.len() <= MAX_SSID_LEN;
            if !valid && !s.is_empty() {
                tracing::warn!("Ignoring persisted SSID longer than {} bytes", MAX_SSID_LEN);
            }
            valid
        });

        let extra = entries
            .iter()
            .filter(|(key, _)| !RECOGNIZED_KEYS.contains(&key.as_str()))
            .filter_map(|(key, value)| value_as_entry(value).map(|v| (key.clone(), v)))
            .collect();

        Self {
            location: text(KEY_LOCATION)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
            light_id: text(KEY_LIGHT_ID).unwrap_or_default(),
            camera_id: text(KEY_CAMERA_ID).unwrap_or_default(),
            security_id: text(KEY_SECURITY_ID).unwrap_or_default(),
            ssid,
            addressing: parse_addressing(
                text(KEY_STATIC_IP),
                text(KEY_STATIC_GATEWAY),
                text(KEY_STATIC_NETMASK),
            ),
            extra,
        }
    }

    /// Persist every recognized setting
    ///
    /// Each key goes through its own read-merge-write, so entries owned by
    /// other components survive. A dynamic addressing mode blanks the static
    /// keys so a stale static configuration is not picked up on next boot.
    pub async fn persist(&self, store: &dyn ConfigStore) -> Result<()> {
        store.save(KEY_LOCATION, &self.location).await?;
        store.save(KEY_LIGHT_ID, &self.light_id).await?;
        store.save(KEY_CAMERA_ID, &self.camera_id).await?;
        store.save(KEY_SECURITY_ID, &self.security_id).await?;
        if let Some(ssid) = &self.ssid {
            store.save(KEY_SSID, ssid).await?;
        }

        let (address, gateway, netmask) = match self.addressing {
            AddressingMode::Static {
                address,
                gateway,
                netmask,
            } => (address.to_string(), gateway.to_string(), netmask.to_string()),
            AddressingMode::Dynamic => (String::new(), String::new(), String::new()),
        };
        store.save(KEY_STATIC_IP, &address).await?;
        store.save(KEY_STATIC_GATEWAY, &gateway).await?;
        store.save(KEY_STATIC_NETMASK, &netmask).await?;

        Ok(())
    }

    /// Identifier configured for a peer role
    pub fn peer_id(&self, role: PeerRole) -> &str {
        match role {
            PeerRole::Light => &self.light_id,
            PeerRole::Camera => &self.camera_id,
            PeerRole::Security => &self.security_id,
        }
    }
}

fn parse_addressing(
    address: Option<String>,
    gateway: Option<String>,
    netmask: Option<String>,
) -> AddressingMode {
    let fields = [address, gateway, netmask];
    if fields
        .iter()
        .all(|f| f.as_deref().is_none_or(str::is_empty))
    {
        return AddressingMode::Dynamic;
    }

    let parsed: Vec<Option<Ipv4Addr>> = fields
        .iter()
        .map(|f| f.as_deref().and_then(|s| s.parse().ok()))
        .collect();

    match parsed[..] {
        [Some(address), Some(gateway), Some(netmask)] => AddressingMode::Static {
            address,
            gateway,
            netmask,
        },
        _ => {
            tracing::warn!(
                "Incomplete or invalid static addressing in config, falling back to dynamic"
            );
            AddressingMode::Dynamic
        }
    }
}
