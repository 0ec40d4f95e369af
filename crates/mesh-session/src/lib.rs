// Copyright (c) 2024 Omerta Mesh Contributors

//! One negotiated tunnel per peer, layered entirely on top of channel
//! dispatch (§4.9): its own tiny control protocol carried as
//! `"tunnel-handshake"` payloads, a `"tunnel-data"` channel registered only
//! while active, and single-session preemption.

pub mod config;
pub mod control;
pub mod error;
pub mod manager;
pub mod policy;
pub mod session;

pub use config::{TunnelConfig, TunnelConfigBuilder};
pub use control::{RejectReason, TunnelControl};
pub use error::TunnelError;
pub use manager::{spawn, TunnelEvent, TunnelHandle, TunnelManagerStats};
pub use policy::{AutoAccept, TunnelPolicy};
pub use session::{TunnelSession, TunnelState};
