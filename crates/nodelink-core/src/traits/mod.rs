//! Core traits for the nodelink system
//!
//! This module defines the abstract interfaces the core is written against.
//!
//! - [`ConfigStore`]: Durable key/value configuration
//! - [`WifiRadio`]: WiFi association, scanning and provisioning
//! - [`DiscoveryChannel`]: Datagram channel carrying peer announcements
//! - [`Indicator`] and [`DebugRelay`]: Observational collaborators

pub mod collaborators;
pub mod config_store;
pub mod discovery_channel;
pub mod wifi_radio;

pub use collaborators::{DebugRelay, Indicator, NoopIndicator, TracingRelay};
pub use config_store::{ConfigEntries, ConfigStore, value_as_entry};
pub use discovery_channel::{DiscoveryChannel, MAX_DATAGRAM_LEN};
pub use wifi_radio::{PortalOutcome, ScannedNetwork, WifiRadio};
