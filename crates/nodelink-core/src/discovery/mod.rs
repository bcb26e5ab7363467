//! Passive peer discovery
//!
//! Peers periodically broadcast a small JSON announcement carrying their
//! identifier in the `"de"` field:
//!
//! ```json
//! {"de": "cam-7"}
//! ```
//!
//! The [`DiscoveryListener`] receives those broadcasts and records the
//! sender address of every announcement whose identifier matches one of the
//! configured peer roles.
//!
//! ## States
//!
//! ```text
//! Idle ──start()──▶ Listening ──stop()──▶ Idle
//! ```
//!
//! ## Delivery
//!
//! Best effort, at most once per broadcast. Lost packets are not recovered;
//! peers are expected to announce again. Foreign or malformed traffic on the
//! same port is ignored without any error surfacing.

use serde_json::Value;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::error::Result;
use crate::peers::{PeerRole, PeerTable};
use crate::traits::{DiscoveryChannel, Indicator, MAX_DATAGRAM_LEN};

/// JSON field carrying the announcing device's identifier
pub const DEVICE_ID_FIELD: &str = "de";

/// Indicator intensity while a packet is processed
const POLL_FLASH_INTENSITY: f32 = 0.1;

/// Result of processing one announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// A peer's address was recorded
    AddressUpdated {
        /// Role that matched
        role: PeerRole,
        /// Sender address now recorded for the role
        address: IpAddr,
    },

    /// The packet did not match any configured peer
    NoMatch,
}

/// Listener lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Channel closed
    Idle,
    /// Channel bound to the discovery port
    Listening,
}

/// Receives peer announcements and updates the [`PeerTable`]
pub struct DiscoveryListener {
    channel: Box<dyn DiscoveryChannel>,
    peers: PeerTable,
    indicator: Arc<dyn Indicator>,
    port: u16,
    state: ListenerState,
}

impl DiscoveryListener {
    /// Create an idle listener for `port`
    pub fn new(
        channel: Box<dyn DiscoveryChannel>,
        peers: PeerTable,
        indicator: Arc<dyn Indicator>,
        port: u16,
    ) -> Self {
        Self {
            channel,
            peers,
            indicator,
            port,
            state: ListenerState::Idle,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// Whether the channel is bound
    pub fn is_listening(&self) -> bool {
        self.state == ListenerState::Listening
    }

    /// Bind the channel and start from a clean address table
    ///
    /// Addresses learned on a previous association are not trusted on a new
    /// one, so they are cleared here. Starting a listening listener rebinds.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_listening() {
            self.channel.close().await;
            self.state = ListenerState::Idle;
        }

        self.peers.clear_addresses().await;
        self.channel.bind(self.port).await?;
        self.state = ListenerState::Listening;
        info!("Listening for peer announcements on UDP port {}", self.port);
        Ok(())
    }

    /// Close the channel
    pub async fn stop(&mut self) {
        if self.is_listening() {
            self.channel.close().await;
            self.state = ListenerState::Idle;
            info!("Stopped listening for peer announcements");
        }
    }

    /// Wait for the next announcement and return its length
    ///
    /// An idle listener never yields, which keeps it inert inside a
    /// `select!` loop until it is started again.
    pub async fn next_packet(&mut self) -> Result<usize> {
        if !self.is_listening() {
            return std::future::pending().await;
        }
        self.channel.next_packet().await
    }

    /// Process the pending packet of `packet_len` bytes
    ///
    /// The channel is flushed in every case, so a malformed packet never
    /// leaks into the next poll.
    pub async fn poll(&mut self, packet_len: usize) -> DiscoveryOutcome {
        if !self.is_listening() {
            warn!("Discovery poll while idle, ignoring");
            return DiscoveryOutcome::NoMatch;
        }

        self.indicator.start(POLL_FLASH_INTENSITY);
        let outcome = self.absorb(packet_len).await;
        self.indicator.stop();
        outcome
    }

    async fn absorb(&mut self, packet_len: usize) -> DiscoveryOutcome {
        let sender = self.channel.remote_ip();

        let mut packet = vec![0u8; packet_len.min(MAX_DATAGRAM_LEN)];
        let read = self.channel.read(&mut packet);
        packet.truncate(read);
        self.channel.flush();

        // The payload is a C string on the wire; stop at the first NUL
        if let Some(end) = packet.iter().position(|b| *b == 0) {
            packet.truncate(end);
        }

        let Some(device_id) = parse_device_id(&packet) else {
            trace!("Ignoring non-announcement packet of {} bytes", read);
            return DiscoveryOutcome::NoMatch;
        };

        let Some(role) = self.peers.match_id(&device_id).await else {
            trace!("Announcement from unknown device {}", device_id);
            return DiscoveryOutcome::NoMatch;
        };

        let Some(address) = sender else {
            warn!("Announcement for {} without sender address", role);
            return DiscoveryOutcome::NoMatch;
        };

        self.peers.record_address(role, address).await;
        debug!("Found {} {} at {}", role, device_id, address);
        DiscoveryOutcome::AddressUpdated { role, address }
    }
}

/// Extract the device identifier from an announcement payload
fn parse_device_id(payload: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(payload).ok()?;
    value
        .as_object()?
        .get(DEVICE_ID_FIELD)?
        .as_str()
        .map(str::to_string)
}
