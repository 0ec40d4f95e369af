// Copyright (c) 2024 Omerta Mesh Contributors

//! Bootstrap and periodic-ping peer discovery, folding gossip into the
//! shared peer cache.

pub mod bootstrap;
pub mod config;
pub mod engine;
pub mod error;

pub use bootstrap::BootstrapPeer;
pub use config::{DiscoveryConfig, DiscoveryConfigBuilder};
pub use engine::{spawn, DiscoveryEvent, DiscoveryHandle};
pub use error::DiscoveryError;
