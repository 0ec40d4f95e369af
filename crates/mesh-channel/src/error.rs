// Copyright (c) 2024 Omerta Mesh Contributors

//! Channel-dispatch failure taxonomy (§4.8, §7 Resource/Reachability rows).

use displaydoc::Display;
use mesh_common::{kind::Classify, ErrorKind};
use thiserror::Error;

#[derive(Debug, Display, Error)]
pub enum ChannelError {
    /// a handler is already registered for this channel name
    AlreadyRegistered,
    /// channel name exceeds the wire frame's maximum length
    NameTooLong,
    /// no direct, hole-punched, or relayed path to the peer could be established
    NoPathEstablished,
    /// channel dispatcher has shut down
    Closed,
}

impl Classify for ChannelError {
    fn kind(&self) -> ErrorKind {
        match self {
            ChannelError::AlreadyRegistered => ErrorKind::Resource,
            ChannelError::NameTooLong => ErrorKind::Configuration,
            ChannelError::NoPathEstablished => ErrorKind::Reachability,
            ChannelError::Closed => ErrorKind::Resource,
        }
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
