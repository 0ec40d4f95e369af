// Copyright (c) 2024 Omerta Mesh Contributors

//! Relay candidate selection, connection pool maintenance, and session
//! forwarding for peers that cannot reach each other directly or by
//! hole-punching.

pub mod candidate;
pub mod config;
pub mod connection;
pub mod error;
pub mod manager;
pub mod session;

pub use candidate::RelayCandidate;
pub use config::{RelayConfig, RelayConfigBuilder};
pub use connection::RelayConnection;
pub use error::RelayError;
pub use manager::{spawn, RelayDataEvent, RelayHandle, RelayManagerStats};
pub use session::{RelaySession, RelaySessionManager, RelaySessionStats, SessionRole};
