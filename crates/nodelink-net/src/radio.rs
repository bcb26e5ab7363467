//! Host WiFi radio
//!
//! On a host the operating system owns the WiFi association; this radio
//! observes it rather than driving it:
//!
//! - "Joining" succeeds when the host has a routable IPv4 address
//! - The local address is found by connecting an unbound UDP socket to a
//!   probe target (no packet is sent)
//! - Scans report the link level of the configured interface from
//!   `/proc/net/wireless`
//! - There is no captive portal; provisioning always fails
//! - `current_ssid` is the name passed to the last successful
//!   `join_saved`, reported only while the host still has an address.
//!   The kernel tables read here do not carry the network name, so a
//!   roam to another network made by the OS is not observed
//!
//! Static addressing cannot be applied without privileges, so a requested
//! static mode is only recorded and logged.

use async_trait::async_trait;
use nodelink_core::config::AddressingMode;
use nodelink_core::traits::{PortalOutcome, ScannedNetwork, WifiRadio};
use nodelink_core::{Error, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info, trace, warn};

/// Kernel table with per-interface wireless link quality
pub const DEFAULT_WIRELESS_PATH: &str = "/proc/net/wireless";

/// Target the local address probe "connects" to
const DEFAULT_PROBE_TARGET: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), 53);

#[derive(Debug, Default)]
struct LinkState {
    mode: AddressingMode,
    ssid: Option<String>,
    credentials_erased: bool,
}

/// WiFi radio backed by the host network stack
#[derive(Debug)]
pub struct HostRadio {
    interface: String,
    wireless_path: PathBuf,
    probe_target: SocketAddr,
    state: Mutex<LinkState>,
}

impl HostRadio {
    /// Create a radio observing `interface` (e.g. `wlan0`)
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            wireless_path: PathBuf::from(DEFAULT_WIRELESS_PATH),
            probe_target: DEFAULT_PROBE_TARGET,
            state: Mutex::new(LinkState::default()),
        }
    }

    /// Read link quality from `path` instead of `/proc/net/wireless`
    pub fn with_wireless_path(mut self, path: impl AsRef<Path>) -> Self {
        self.wireless_path = path.as_ref().to_path_buf();
        self
    }

    /// Probe the local address towards `target`
    pub fn with_probe_target(mut self, target: SocketAddr) -> Self {
        self.probe_target = target;
        self
    }

    /// Interface this radio reports on
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Addressing mode last applied through `configure`
    pub fn applied_mode(&self) -> AddressingMode {
        self.lock().mode
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LinkState> {
        // A poisoned lock only means a panic elsewhere; the state is plain data
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn probe_local_ip(&self) -> Option<Ipv4Addr> {
        let socket = match UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).await {
            Ok(socket) => socket,
            Err(e) => {
                trace!("Local address probe could not bind: {}", e);
                return None;
            }
        };
        if let Err(e) = socket.connect(self.probe_target).await {
            trace!("No route towards {}: {}", self.probe_target, e);
            return None;
        }

        match socket.local_addr().ok()?.ip() {
            IpAddr::V4(addr) if !addr.is_unspecified() => Some(addr),
            _ => None,
        }
    }
}

#[async_trait]
impl WifiRadio for HostRadio {
    async fn configure(&self, mode: &AddressingMode) -> Result<()> {
        if mode.is_static() {
            info!(
                "Static addressing requested ({}); it must be provided by the host network configuration",
                mode
            );
        }
        self.lock().mode = *mode;
        Ok(())
    }

    async fn join_saved(&self, ssid: &str) -> Result<bool> {
        if self.lock().credentials_erased {
            debug!("Credentials were erased, not joining {}", ssid);
            return Ok(false);
        }

        let joined = self.probe_local_ip().await.is_some();
        if joined {
            self.lock().ssid = Some(ssid.to_string());
        } else {
            debug!("Host has no routable IPv4 address");
        }
        Ok(joined)
    }

    async fn run_portal(&self, ssid: &str, _timeout: Duration) -> Result<PortalOutcome> {
        warn!(
            "Provisioning portal for {} is not available on a host, configure the network through the OS",
            ssid
        );
        Ok(PortalOutcome::failed())
    }

    async fn is_associated(&self) -> bool {
        let joined = self.lock().ssid.is_some();
        joined && self.probe_local_ip().await.is_some()
    }

    async fn local_ip(&self) -> Option<Ipv4Addr> {
        self.probe_local_ip().await
    }

    async fn current_ssid(&self) -> Option<String> {
        let ssid = self.lock().ssid.clone()?;
        self.probe_local_ip().await.map(|_| ssid)
    }

    async fn scan(&self) -> Result<Vec<ScannedNetwork>> {
        let Some(ssid) = self.lock().ssid.clone() else {
            return Ok(Vec::new());
        };

        let table = match tokio::fs::read_to_string(&self.wireless_path).await {
            Ok(table) => table,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::radio(format!(
                    "Failed to read {}: {}",
                    self.wireless_path.display(),
                    e
                )));
            }
        };

        Ok(parse_link_level(&table, &self.interface)
            .map(|rssi| vec![ScannedNetwork::new(ssid, rssi)])
            .unwrap_or_default())
    }

    async fn erase_credentials(&self) -> Result<()> {
        let mut state = self.lock();
        state.ssid = None;
        state.credentials_erased = true;
        info!("Forgot network credentials for {}", self.interface);
        Ok(())
    }
}

/// Signal level (dBm) of `interface` from a `/proc/net/wireless` table
///
/// ```text
/// Inter-| sta-|   Quality        |   Discarded packets               | Missed | WE
///  face | tus | link level noise |  nwid  crypt   frag  retry   misc | beacon | 22
///  wlan0: 0000   54.  -56.  -256        0      0      0      0      0        0
/// ```
fn parse_link_level(table: &str, interface: &str) -> Option<i32> {
    table.lines().skip(2).find_map(|line| {
        let (name, fields) = line.split_once(':')?;
        if name.trim() != interface {
            return None;
        }
        let level = fields.split_whitespace().nth(2)?;
        let level: f32 = level.trim_end_matches('.').parse().ok()?;
        Some(level as i32)
    })
}
