//! WiFi connection state machine
//!
//! The [`ConnectionManager`] owns every piece of association state the node
//! keeps: the current [`ConnectionState`], the parameters of the last
//! successful connection, and the flag raised when provisioning produced new
//! settings.
//!
//! ## States
//!
//! ```text
//!                      ┌──────────────────────────────┐
//!                      ▼                              │
//! Unassociated ──▶ Associating ──▶ Associated ──reconnect()
//!                      │   ▲            │
//!                      │   │            └──link lost──▶ Unassociated
//!                      ▼   │
//!          ProvisioningActive
//!                      │
//!                      ▼
//!                    Failed
//!
//! any ──reset_credentials()──▶ FactoryReset (terminal)
//! ```
//!
//! ## Association Flow
//!
//! 1. Apply the addressing mode on the radio
//! 2. Try saved credentials
//! 3. If none work, run the captive provisioning portal
//! 4. Give up once the provisioning window has elapsed
//!
//! On success the mode and network name are remembered so that
//! [`ConnectionManager::reconnect`] reproduces the identical configuration.

use serde::Serialize;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{AddressingMode, MAX_SSID_LEN, NodeConfig};
use crate::error::{Error, Result};
use crate::traits::{DebugRelay, Indicator, ScannedNetwork, WifiRadio};

/// Sender id used for diagnostics from the connection manager
const SENDER_ID: &str = "WIFI";

/// Indicator intensity while associating
const CONNECT_FLASH_INTENSITY: f32 = 1.0;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No association and no attempt in progress
    Unassociated,
    /// Trying saved credentials
    Associating,
    /// Associated with a network
    Associated,
    /// Captive provisioning portal is running
    ProvisioningActive,
    /// The last attempt did not associate within the window
    Failed,
    /// Credentials were erased; the node must restart
    FactoryReset,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Unassociated => "unassociated",
            ConnectionState::Associating => "associating",
            ConnectionState::Associated => "associated",
            ConnectionState::ProvisioningActive => "provisioning",
            ConnectionState::Failed => "failed",
            ConnectionState::FactoryReset => "factory reset",
        };
        f.write_str(name)
    }
}

/// Outcome of the most recent connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptResult {
    /// Associated
    Success,
    /// Did not associate
    Failure,
}

/// Parameters of the last successful connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastConnection {
    /// Addressing mode that was applied
    pub mode: AddressingMode,
    /// Network name
    pub ssid: String,
    /// Address the node obtained
    pub address: Ipv4Addr,
}

/// WiFi association state machine
pub struct ConnectionManager {
    radio: Arc<dyn WifiRadio>,
    indicator: Arc<dyn Indicator>,
    relay: Arc<dyn DebugRelay>,
    portal_timeout: Duration,
    scan_attempts: usize,
    state: ConnectionState,
    last_success: Option<LastConnection>,
    last_result: Option<AttemptResult>,
    should_save: bool,
}

impl ConnectionManager {
    /// Create a manager in the `Unassociated` state
    pub fn new(
        radio: Arc<dyn WifiRadio>,
        indicator: Arc<dyn Indicator>,
        relay: Arc<dyn DebugRelay>,
        config: &NodeConfig,
    ) -> Self {
        Self {
            radio,
            indicator,
            relay,
            portal_timeout: Duration::from_secs(config.portal_timeout_secs),
            scan_attempts: config.scan_attempts,
            state: ConnectionState::Unassociated,
            last_success: None,
            last_result: None,
            should_save: false,
        }
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Parameters of the last successful connection
    pub fn last_connection(&self) -> Option<&LastConnection> {
        self.last_success.as_ref()
    }

    /// Outcome of the most recent attempt, if any was made
    pub fn last_result(&self) -> Option<AttemptResult> {
        self.last_result
    }

    /// Return and clear the "provisioning produced new settings" flag
    pub fn take_should_save(&mut self) -> bool {
        std::mem::take(&mut self.should_save)
    }

    /// Associate with `ssid` using `mode`
    ///
    /// # Returns
    ///
    /// - `Ok(address)`: associated; the local address is returned
    /// - `Err(Error::ConnectFailed)`: nothing associated within the
    ///   provisioning window; the state is `Failed`
    /// - `Err(Error::InvalidState)`: called after a factory reset
    pub async fn connect(&mut self, mode: AddressingMode, ssid: &str) -> Result<Ipv4Addr> {
        if self.state == ConnectionState::FactoryReset {
            return Err(Error::invalid_state(
                "credentials were reset, restart required",
            ));
        }
        if ssid.is_empty() || ssid.len() > MAX_SSID_LEN {
            return Err(Error::config(format!(
                "SSID must be 1..={} bytes",
                MAX_SSID_LEN
            )));
        }

        self.state = ConnectionState::Associating;
        self.indicator.start(CONNECT_FLASH_INTENSITY);
        info!("Connecting to {} ({})", ssid, mode);
        self.relay
            .report(&format!("Connecting to {} ({})", ssid, mode), SENDER_ID)
            .await;

        let window = self.portal_timeout;
        let attempt = tokio::time::timeout(window, self.associate(mode, ssid)).await;
        self.indicator.stop();

        match attempt {
            Ok(Ok(address)) => {
                self.state = ConnectionState::Associated;
                self.last_result = Some(AttemptResult::Success);
                self.last_success = Some(LastConnection {
                    mode,
                    ssid: ssid.to_string(),
                    address,
                });
                info!("Connected to {} as {}", ssid, address);
                self.relay
                    .report(&format!("Connected to {} as {}", ssid, address), SENDER_ID)
                    .await;
                Ok(address)
            }
            Ok(Err(e)) => self.fail(ssid, &e.to_string()).await,
            Err(_) => {
                self.fail(ssid, &format!("no association within {:?}", window))
                    .await
            }
        }
    }

    /// Replay the last successful connection
    ///
    /// Uses exactly the mode and network name that last succeeded; there is
    /// no fallback to another mode.
    pub async fn reconnect(&mut self) -> Result<Ipv4Addr> {
        if self.state == ConnectionState::FactoryReset {
            return Err(Error::invalid_state(
                "credentials were reset, restart required",
            ));
        }
        let Some(last) = self.last_success.clone() else {
            return Err(Error::invalid_state(
                "no successful connection to replay",
            ));
        };

        info!("Reconnecting to {} ({})", last.ssid, last.mode);
        self.connect(last.mode, &last.ssid).await
    }

    /// Erase saved credentials and enter the terminal `FactoryReset` state
    ///
    /// The next boot starts provisioning from scratch. The surrounding
    /// process is expected to restart the node once this returns.
    pub async fn reset_credentials(&mut self) -> Result<()> {
        self.radio.erase_credentials().await?;
        self.state = ConnectionState::FactoryReset;
        self.last_success = None;
        self.should_save = false;
        warn!("WiFi credentials erased, restart required");
        self.relay
            .report("WiFi credentials erased, restart required", SENDER_ID)
            .await;
        Ok(())
    }

    /// Whether the node is associated according to both the state machine
    /// and the radio
    pub async fn is_link_up(&self) -> bool {
        self.state == ConnectionState::Associated && self.radio.is_associated().await
    }

    /// Record that the association was dropped underneath us
    pub fn mark_link_lost(&mut self) {
        if self.state == ConnectionState::Associated {
            self.state = ConnectionState::Unassociated;
        }
    }

    /// RSSI of the network the radio is associated with, or 0 if not found
    ///
    /// The lookup target is the live network name reported by the radio.
    /// A scan may transiently come back empty (especially right after
    /// association), so each attempt rescans once on an empty result.
    pub async fn signal_strength(&self) -> i32 {
        let Some(target) = self.radio.current_ssid().await else {
            debug!("Not associated, no signal strength to report");
            return 0;
        };

        for attempt in 1..=self.scan_attempts {
            let mut networks = self.scan().await;
            if networks.is_empty() {
                networks = self.scan().await;
            }

            if let Some(network) = networks.iter().find(|n| n.ssid == target) {
                return network.rssi;
            }
            debug!(
                "Scan attempt {}/{} did not find {}",
                attempt, self.scan_attempts, target
            );
        }

        0
    }

    async fn associate(&mut self, mode: AddressingMode, ssid: &str) -> Result<Ipv4Addr> {
        self.radio.configure(&mode).await?;

        let mut joined = self.radio.join_saved(ssid).await?;
        if !joined {
            self.state = ConnectionState::ProvisioningActive;
            info!("No saved credentials for {} worked, starting provisioning portal", ssid);
            self.relay
                .report("Starting provisioning portal", SENDER_ID)
                .await;

            let outcome = self.radio.run_portal(ssid, self.portal_timeout).await?;
            if outcome.settings_changed {
                self.should_save = true;
            }
            joined = outcome.associated;
        }

        if !joined {
            return Err(Error::connect_failed(ssid));
        }

        self.radio
            .local_ip()
            .await
            .ok_or_else(|| Error::radio("associated without a local address"))
    }

    async fn fail(&mut self, ssid: &str, reason: &str) -> Result<Ipv4Addr> {
        self.state = ConnectionState::Failed;
        self.last_result = Some(AttemptResult::Failure);
        warn!("Connection to {} failed: {}", ssid, reason);
        self.relay
            .report(&format!("Connection to {} failed: {}", ssid, reason), SENDER_ID)
            .await;
        Err(Error::connect_failed(ssid))
    }

    async fn scan(&self) -> Vec<ScannedNetwork> {
        match self.radio.scan().await {
            Ok(networks) => networks,
            Err(e) => {
                warn!("Network scan failed: {}", e);
                Vec::new()
            }
        }
    }
}
