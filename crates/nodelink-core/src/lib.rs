// # nodelink-core
//
// Core library for nodelink IoT nodes.
//
// ## Architecture Overview
//
// This library provides the connectivity core of a node:
// - **ConfigStore**: Trait for the durable key/value configuration file
// - **NodeSettings**: Typed, validated view over the persisted entries
// - **WifiRadio**: Trait for the WiFi hardware seam
// - **DiscoveryChannel**: Trait for the broadcast datagram seam
// - **ConnectionManager**: WiFi association state machine
// - **DiscoveryListener**: Matches peer announcements to configured peers
// - **Node**: Orchestrator that boots the node and runs the control loop
//
// ## Design Principles
//
// 1. **Hardware at the edges**: The radio, the datagram channel, the status
//    indicator and the debug relay are traits implemented outside the core
// 2. **Degrade, don't fail**: Unreadable config and foreign traffic read as
//    "no data"; only write failures and failed associations surface
// 3. **Single owner**: All mutable node state lives in the Node and the
//    components it owns; no globals
// 4. **Library-First**: All core functionality can be used as a library

pub mod config;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod node;
pub mod peers;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use config::{AddressingMode, NodeConfig};
pub use connection::{ConnectionManager, ConnectionState};
pub use discovery::{DiscoveryListener, DiscoveryOutcome};
pub use error::{Error, Result};
pub use node::{Node, NodeEvent};
pub use peers::{Peer, PeerRole, PeerTable};
pub use store::{FileConfigStore, MemoryConfigStore, NodeSettings};
pub use traits::{ConfigStore, DebugRelay, DiscoveryChannel, Indicator, WifiRadio};
