// # Config Store Implementations
//
// This module provides implementations of the ConfigStore trait and the
// typed settings record built on top of it.

pub mod file;
pub mod memory;
pub mod settings;

pub use file::FileConfigStore;
pub use memory::MemoryConfigStore;
pub use settings::NodeSettings;
