//! Peer identity registry
//!
//! The node cooperates with a fixed set of peers, one per [`PeerRole`]. Each
//! peer has an identifier taken from the persisted settings and an address
//! learned from discovery broadcasts.
//!
//! Addresses are only valid for the current association. They are never
//! persisted and are cleared whenever discovery restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::store::NodeSettings;

/// Capacity of the peer update broadcast; slow subscribers skip old updates
const UPDATE_CHANNEL_CAPACITY: usize = 32;

/// Logical role of a cooperating peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerRole {
    /// Additional light
    Light,
    /// Attached camera
    Camera,
    /// Security sensor
    Security,
}

impl PeerRole {
    /// All roles, in matching priority order
    pub const ALL: [PeerRole; 3] = [PeerRole::Light, PeerRole::Camera, PeerRole::Security];

    /// Role name
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerRole::Light => "light",
            PeerRole::Camera => "camera",
            PeerRole::Security => "security",
        }
    }

    fn index(self) -> usize {
        match self {
            PeerRole::Light => 0,
            PeerRole::Camera => 1,
            PeerRole::Security => 2,
        }
    }
}

impl std::fmt::Display for PeerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// Role this peer fills
    pub role: PeerRole,
    /// Configured identifier; empty means unpaired
    pub id: String,
    /// Last known address, `None` until discovered
    pub address: Option<IpAddr>,
    /// When the last matching announcement arrived
    pub last_seen: Option<DateTime<Utc>>,
}

impl Peer {
    fn unpaired(role: PeerRole) -> Self {
        Self {
            role,
            id: String::new(),
            address: None,
            last_seen: None,
        }
    }
}

/// Address change published to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerUpdate {
    /// Role whose address was recorded
    pub role: PeerRole,
    /// New address
    pub address: IpAddr,
    /// Address known before this update
    pub previous: Option<IpAddr>,
}

/// Shared peer address table
///
/// Cloning yields another handle to the same table. The discovery listener
/// is the only writer of addresses; anyone may read or subscribe.
#[derive(Debug, Clone)]
pub struct PeerTable {
    inner: Arc<RwLock<[Peer; 3]>>,
    updates: broadcast::Sender<PeerUpdate>,
}

impl PeerTable {
    /// Create a table with all roles unpaired
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(PeerRole::ALL.map(Peer::unpaired))),
            updates,
        }
    }

    /// Take peer identifiers from persisted settings
    ///
    /// Known addresses are dropped along with the old identifiers.
    pub async fn configure(&self, settings: &NodeSettings) {
        let mut guard = self.inner.write().await;
        for role in PeerRole::ALL {
            let peer = &mut guard[role.index()];
            peer.id = settings.peer_id(role).to_string();
            peer.address = None;
            peer.last_seen = None;
        }
    }

    /// Set a single identifier
    pub async fn set_id(&self, role: PeerRole, id: impl Into<String>) {
        let mut guard = self.inner.write().await;
        let peer = &mut guard[role.index()];
        peer.id = id.into();
        peer.address = None;
        peer.last_seen = None;
    }

    /// Snapshot of one peer
    pub async fn peer(&self, role: PeerRole) -> Peer {
        self.inner.read().await[role.index()].clone()
    }

    /// Last known address of a peer
    pub async fn address(&self, role: PeerRole) -> Option<IpAddr> {
        self.inner.read().await[role.index()].address
    }

    /// Snapshot of all peers
    pub async fn snapshot(&self) -> Vec<Peer> {
        self.inner.read().await.to_vec()
    }

    /// Role whose identifier equals `id`
    ///
    /// Roles are checked in [`PeerRole::ALL`] order and the first match wins.
    /// Unpaired roles never match.
    pub async fn match_id(&self, id: &str) -> Option<PeerRole> {
        if id.is_empty() {
            return None;
        }
        let guard = self.inner.read().await;
        guard.iter().find(|peer| peer.id == id).map(|peer| peer.role)
    }

    /// Record the address a peer announced itself from
    pub async fn record_address(&self, role: PeerRole, address: IpAddr) {
        let previous = {
            let mut guard = self.inner.write().await;
            let peer = &mut guard[role.index()];
            let previous = peer.address.replace(address);
            peer.last_seen = Some(Utc::now());
            previous
        };

        // No subscribers is fine
        let _ = self.updates.send(PeerUpdate {
            role,
            address,
            previous,
        });
    }

    /// Forget all addresses, keeping identifiers
    pub async fn clear_addresses(&self) {
        let mut guard = self.inner.write().await;
        for peer in guard.iter_mut() {
            peer.address = None;
            peer.last_seen = None;
        }
    }

    /// Stream of address updates recorded after this call
    pub fn updates(&self) -> Pin<Box<dyn Stream<Item = PeerUpdate> + Send + 'static>> {
        let stream = BroadcastStream::new(self.updates.subscribe()).filter_map(|update| update.ok());
        Box::pin(stream)
    }
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_ids() -> NodeSettings {
        NodeSettings {
            light_id: "lb-01".to_string(),
            camera_id: "cam-7".to_string(),
            security_id: "sec-1".to_string(),
            ..NodeSettings::default()
        }
    }

    #[tokio::test]
    async fn test_match_id() {
        let table = PeerTable::new();
        table.configure(&settings_with_ids()).await;

        assert_eq!(table.match_id("cam-7").await, Some(PeerRole::Camera));
        assert_eq!(table.match_id("sec-1").await, Some(PeerRole::Security));
        assert_eq!(table.match_id("unknown").await, None);
    }

    #[tokio::test]
    async fn test_unpaired_roles_never_match() {
        let table = PeerTable::new();
        assert_eq!(table.match_id("").await, None);

        table.set_id(PeerRole::Camera, "cam-7").await;
        assert_eq!(table.match_id("").await, None);
    }

    #[tokio::test]
    async fn test_first_role_wins_on_duplicate_ids() {
        let table = PeerTable::new();
        table.set_id(PeerRole::Camera, "dup").await;
        table.set_id(PeerRole::Light, "dup").await;
        assert_eq!(table.match_id("dup").await, Some(PeerRole::Light));
    }

    #[tokio::test]
    async fn test_record_and_clear_addresses() {
        let table = PeerTable::new();
        table.configure(&settings_with_ids()).await;
        let addr: IpAddr = "192.168.1.20".parse().unwrap();

        table.record_address(PeerRole::Light, addr).await;
        let light = table.peer(PeerRole::Light).await;
        assert_eq!(light.address, Some(addr));
        assert!(light.last_seen.is_some());

        table.clear_addresses().await;
        assert_eq!(table.address(PeerRole::Light).await, None);
        assert_eq!(table.peer(PeerRole::Light).await.id, "lb-01");
    }

    #[tokio::test]
    async fn test_updates_stream() {
        let table = PeerTable::new();
        let mut updates = table.updates();
        let first: IpAddr = "10.0.0.20".parse().unwrap();
        let second: IpAddr = "10.0.0.21".parse().unwrap();

        table.record_address(PeerRole::Security, first).await;
        table.record_address(PeerRole::Security, second).await;

        assert_eq!(
            updates.next().await,
            Some(PeerUpdate {
                role: PeerRole::Security,
                address: first,
                previous: None
            })
        );
        assert_eq!(
            updates.next().await.map(|u| u.previous),
            Some(Some(first))
        );
    }
}
