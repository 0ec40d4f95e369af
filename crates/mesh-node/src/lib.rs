// Copyright (c) 2024 Omerta Mesh Contributors

//! The top-level mesh node: binds one UDP socket, wires identity,
//! transport, NAT detection, discovery, hole punching, relay, channel
//! dispatch and tunnel sessions together, and exposes the programmatic
//! surface applications use to join a network and exchange messages.

pub mod config;
pub mod error;
pub mod events;
pub mod node;
pub mod persistence;
pub mod stats;

pub use config::{MeshConfig, MeshConfigBuilder};
pub use error::{MeshError, Result};
pub use events::MeshEvent;
pub use node::{MeshNode, MeshNodeBuilder};
pub use persistence::{load_identity, load_networks, save_identity, save_networks, IdentityFile, NetworkRecord};
pub use stats::MeshStatistics;
