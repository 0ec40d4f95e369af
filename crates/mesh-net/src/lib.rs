// Copyright (c) 2024 Omerta Mesh Contributors

//! The node's one UDP socket: a reader/writer task plus a cloneable handle
//! producers use to enqueue outbound datagrams without touching the socket
//! directly.

pub mod error;
pub mod transport;

pub use error::NetError;
pub use transport::{spawn, Datagram, TransportHandle, TransportStats, MAX_DATAGRAM_LEN};
