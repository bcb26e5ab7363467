// # WiFi Radio Trait
//
// Defines the hardware seam between the connection state machine and the
// WiFi chip (or whatever stands in for it on a host).
//
// ## Implementations
//
// - Host radio backed by the Linux network stack: `nodelink-net` crate
// - Scripted radios in the core contract tests
//
// ## Responsibilities
//
// The radio executes single steps: apply addressing, try saved credentials,
// run the captive portal, scan. It never decides what to do next; timeouts,
// retries and remembering the last good configuration belong to
// `ConnectionManager`.

use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::config::AddressingMode;

/// One network seen during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedNetwork {
    /// Network name
    pub ssid: String,
    /// Received signal strength in dBm
    pub rssi: i32,
}

impl ScannedNetwork {
    /// Create a scan entry
    pub fn new(ssid: impl Into<String>, rssi: i32) -> Self {
        Self {
            ssid: ssid.into(),
            rssi,
        }
    }
}

/// Result of running the captive provisioning portal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortalOutcome {
    /// Whether the radio is associated when the portal closes
    pub associated: bool,
    /// Whether the user entered new settings that should be persisted
    pub settings_changed: bool,
}

impl PortalOutcome {
    /// Portal closed without an association
    pub fn failed() -> Self {
        Self {
            associated: false,
            settings_changed: false,
        }
    }
}

/// Trait for WiFi radio implementations
///
/// Implementations must be thread-safe; the node may hand the radio to a
/// monitoring task while the control loop keeps using it.
#[async_trait]
pub trait WifiRadio: Send + Sync {
    /// Apply the addressing mode for the next association
    ///
    /// `Dynamic` must undo any previously applied static configuration.
    async fn configure(&self, mode: &AddressingMode) -> Result<(), crate::Error>;

    /// Try to associate with `ssid` using saved credentials
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: associated
    /// - `Ok(false)`: no saved credentials worked
    /// - `Err(Error)`: radio failure
    async fn join_saved(&self, ssid: &str) -> Result<bool, crate::Error>;

    /// Run the captive provisioning portal named after `ssid`
    ///
    /// Returns when the user completed provisioning or `timeout` elapsed.
    async fn run_portal(&self, ssid: &str, timeout: Duration)
    -> Result<PortalOutcome, crate::Error>;

    /// Whether the radio currently holds an association
    async fn is_associated(&self) -> bool;

    /// Address assigned to the node on the current association
    async fn local_ip(&self) -> Option<Ipv4Addr>;

    /// Name of the network the radio is associated with right now
    async fn current_ssid(&self) -> Option<String>;

    /// Scan for visible networks
    ///
    /// An empty result is valid and may be transient right after association.
    async fn scan(&self) -> Result<Vec<ScannedNetwork>, crate::Error>;

    /// Erase all saved network credentials
    async fn erase_credentials(&self) -> Result<(), crate::Error>;
}
