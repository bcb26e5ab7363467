//! Node orchestrator
//!
//! The Node is responsible for:
//! - Loading persisted settings and registering peer identifiers
//! - Bringing up the WiFi association through the ConnectionManager
//! - Running the discovery listener while associated
//! - Watching the link and replaying the last connection when it drops
//!
//! ## Architecture
//!
//! ```text
//!                      ┌──────────────┐
//!                      │ ConfigStore  │
//!                      └──────────────┘
//!                             │ NodeSettings
//!                             ▼
//! ┌─────────────┐      ┌──────────────┐      ┌───────────────────┐
//! │  WifiRadio  │◀─────│     Node     │─────▶│ DiscoveryListener │
//! └─────────────┘      └──────────────┘      └───────────────────┘
//!                             │                        │
//!                             ▼                        ▼
//!                      ┌──────────────┐      ┌───────────────────┐
//!                      │    Events    │      │     PeerTable     │
//!                      └──────────────┘      └───────────────────┘
//! ```
//!
//! ## Control Loop
//!
//! Everything runs on one task. Each iteration waits for whichever comes
//! first: a discovery packet, the link check tick or shutdown. A reconnect
//! blocks the loop until it succeeds or the provisioning window elapses.

use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::{AddressingMode, NodeConfig};
use crate::connection::{ConnectionManager, ConnectionState};
use crate::discovery::{DiscoveryListener, DiscoveryOutcome};
use crate::error::{Error, Result};
use crate::peers::{PeerRole, PeerTable};
use crate::store::NodeSettings;
use crate::traits::{ConfigStore, DebugRelay, DiscoveryChannel, Indicator, WifiRadio};

/// Events emitted by the Node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NodeEvent {
    /// Boot finished and discovery is running
    Booted {
        address: Ipv4Addr,
        mode: AddressingMode,
    },

    /// Association succeeded
    Associated { ssid: String, address: Ipv4Addr },

    /// Association did not succeed within the provisioning window
    ConnectFailed { ssid: String },

    /// Boot could not associate; the device needs provisioning
    ProvisioningRequired { ssid: String },

    /// A peer announced itself
    PeerDiscovered { role: PeerRole, address: IpAddr },

    /// The association dropped
    LinkLost,

    /// Credentials were erased; a restart is required
    FactoryReset,

    /// Control loop stopped
    Stopped { reason: String },
}

/// Node orchestrator
///
/// ## Lifecycle
///
/// 1. Create with [`Node::new()`]
/// 2. Bring the node up with [`Node::boot()`]
/// 3. Run the control loop with [`Node::run()`] until shutdown
pub struct Node {
    connection: ConnectionManager,
    discovery: DiscoveryListener,
    peers: PeerTable,
    store: Arc<dyn ConfigStore>,
    fallback_ssid: Option<String>,
    link_check_interval: Duration,
    event_tx: mpsc::Sender<NodeEvent>,
}

impl Node {
    /// Create a new node
    ///
    /// # Returns
    ///
    /// A tuple of (node, event_receiver) where event_receiver yields node events
    pub fn new(
        radio: Arc<dyn WifiRadio>,
        channel: Box<dyn DiscoveryChannel>,
        store: Arc<dyn ConfigStore>,
        indicator: Arc<dyn Indicator>,
        relay: Arc<dyn DebugRelay>,
        config: NodeConfig,
    ) -> Result<(Self, mpsc::Receiver<NodeEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let peers = PeerTable::new();
        let connection = ConnectionManager::new(radio, Arc::clone(&indicator), relay, &config);
        let discovery =
            DiscoveryListener::new(channel, peers.clone(), indicator, config.discovery_port);

        let node = Self {
            connection,
            discovery,
            peers,
            store,
            fallback_ssid: config.fallback_ssid,
            link_check_interval: Duration::from_secs(config.link_check_interval_secs),
            event_tx: tx,
        };

        Ok((node, rx))
    }

    /// Shared handle to the peer table
    pub fn peers(&self) -> PeerTable {
        self.peers.clone()
    }

    /// The connection state machine
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Whether the discovery listener is bound
    pub fn is_discovering(&self) -> bool {
        self.discovery.is_listening()
    }

    /// RSSI of the associated network, 0 if it cannot be found
    pub async fn signal_strength(&self) -> i32 {
        self.connection.signal_strength().await
    }

    /// Bring the node up
    ///
    /// Loads settings, registers peer identifiers, associates with the
    /// remembered addressing mode and starts discovery.
    ///
    /// # Returns
    ///
    /// - `Ok(address)`: associated and discovering
    /// - `Err(Error::ConnectFailed)`: no association; `ProvisioningRequired`
    ///   was emitted
    /// - `Err(Error::Config)`: no network name is known
    pub async fn boot(&mut self) -> Result<Ipv4Addr> {
        let mut settings = NodeSettings::load(self.store.as_ref()).await;
        self.peers.configure(&settings).await;

        let ssid = settings
            .ssid
            .clone()
            .or_else(|| self.fallback_ssid.clone())
            .ok_or_else(|| Error::config("No network name persisted and no fallback configured"))?;

        info!(
            "Booting node at {} ({} addressing)",
            settings.location, settings.addressing
        );

        let address = match self.connection.connect(settings.addressing, &ssid).await {
            Ok(address) => address,
            Err(e) => {
                if e.is_connect_failed() {
                    self.emit_event(NodeEvent::ConnectFailed { ssid: ssid.clone() });
                    self.emit_event(NodeEvent::ProvisioningRequired { ssid });
                }
                return Err(e);
            }
        };
        self.emit_event(NodeEvent::Associated {
            ssid: ssid.clone(),
            address,
        });

        if self.connection.take_should_save() {
            settings.ssid = Some(ssid);
            match settings.persist(self.store.as_ref()).await {
                Ok(()) => info!("Saved settings after provisioning"),
                Err(e) => error!("Failed to save settings after provisioning: {}", e),
            }
        }

        self.discovery.start().await?;
        self.emit_event(NodeEvent::Booted {
            address,
            mode: settings.addressing,
        });

        Ok(address)
    }

    /// Run the control loop until SIGINT
    pub async fn run(&mut self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the control loop until `shutdown_rx` fires
    ///
    /// With `None` this behaves like [`Node::run()`].
    pub async fn run_with_shutdown(&mut self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    /// Erase saved credentials and stop discovery
    ///
    /// The node cannot associate again until the process restarts.
    pub async fn factory_reset(&mut self) -> Result<()> {
        self.discovery.stop().await;
        self.connection.reset_credentials().await?;
        self.peers.clear_addresses().await;
        self.emit_event(NodeEvent::FactoryReset);
        Ok(())
    }

    async fn run_internal(&mut self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for shutdown signal: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::pin!(shutdown);

        let mut link_check = tokio::time::interval(self.link_check_interval);
        link_check.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        link_check.tick().await;

        loop {
            let step = tokio::select! {
                packet = self.discovery.next_packet() => Step::Packet(packet),
                _ = link_check.tick() => Step::LinkCheck,
                _ = &mut shutdown => Step::Shutdown,
            };

            match step {
                Step::Packet(Ok(len)) => self.handle_packet(len).await,
                Step::Packet(Err(e)) => {
                    error!("Discovery channel failed: {}", e);
                    // Rebound at the next link check
                    self.discovery.stop().await;
                }
                Step::LinkCheck => self.check_link().await,
                Step::Shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.discovery.stop().await;
        self.emit_event(NodeEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });
        info!("Node stopped");

        Ok(())
    }

    async fn handle_packet(&mut self, len: usize) {
        if let DiscoveryOutcome::AddressUpdated { role, address } = self.discovery.poll(len).await {
            self.emit_event(NodeEvent::PeerDiscovered { role, address });
        }
    }

    async fn check_link(&mut self) {
        if self.connection.is_link_up().await {
            if !self.discovery.is_listening() {
                self.restart_discovery().await;
            }
            return;
        }

        match self.connection.state() {
            ConnectionState::FactoryReset => return,
            ConnectionState::Associated => {
                warn!("WiFi link lost");
                self.connection.mark_link_lost();
                self.discovery.stop().await;
                self.peers.clear_addresses().await;
                self.emit_event(NodeEvent::LinkLost);
            }
            _ => {}
        }

        let Some(ssid) = self.connection.last_connection().map(|last| last.ssid.clone()) else {
            debug!("Link down and no connection to replay");
            return;
        };

        match self.connection.reconnect().await {
            Ok(address) => {
                self.emit_event(NodeEvent::Associated { ssid, address });
                self.restart_discovery().await;
            }
            Err(e) => {
                warn!("Reconnect failed, retrying at next link check: {}", e);
                if e.is_connect_failed() {
                    self.emit_event(NodeEvent::ConnectFailed { ssid });
                }
            }
        }
    }

    async fn restart_discovery(&mut self) {
        if let Err(e) = self.discovery.start().await {
            error!("Failed to start discovery: {}", e);
        }
    }

    /// Emit a node event
    fn emit_event(&self, event: NodeEvent) {
        // Full channel means the consumer lags; drop rather than grow
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

/// One iteration of the control loop
enum Step {
    Packet(Result<usize>),
    LinkCheck,
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_event_serialization() {
        let event = NodeEvent::PeerDiscovered {
            role: PeerRole::Camera,
            address: IpAddr::from([192, 168, 1, 7]),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "peer_discovered");
        assert_eq!(json["role"], "camera");
        assert_eq!(json["address"], "192.168.1.7");
    }

    #[test]
    fn test_booted_event_carries_mode() {
        let event = NodeEvent::Booted {
            address: Ipv4Addr::new(10, 0, 0, 5),
            mode: AddressingMode::Dynamic,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "booted");
        assert_eq!(json["mode"]["mode"], "dynamic");
    }
}
