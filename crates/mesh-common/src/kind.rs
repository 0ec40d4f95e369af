// Copyright (c) 2024 Omerta Mesh Contributors

//! The seven-variant error taxonomy every crate's error enum maps onto.

use displaydoc::Display;

/// Machine-readable error classification shared by every crate in the mesh
/// core, mirroring the taxonomy of the error-handling design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ErrorKind {
    /// configuration error, fatal at startup
    Configuration,
    /// cryptographic failure, packet dropped silently
    Cryptographic,
    /// transient network failure, caller should retry with backoff
    TransientNetwork,
    /// NAT/reachability failure
    Reachability,
    /// relay failure
    Relay,
    /// unexpected protocol frame for the current state
    Protocol,
    /// local resource exhausted or conflicting
    Resource,
}

/// Implemented by every crate-local error enum so callers can branch on
/// taxonomy without matching every concrete variant.
pub trait Classify {
    /// The taxonomy bucket this error falls into.
    fn kind(&self) -> ErrorKind;
}
