// Copyright (c) 2024 Omerta Mesh Contributors

//! Wire codec errors.

use displaydoc::Display;
use mesh_common::{kind::Classify, ErrorKind};
use thiserror::Error;

/// Errors from encoding or decoding a [`crate::Frame`].
#[derive(Debug, Display, Error)]
pub enum WireError {
    /// failed to encode frame: {0}
    Encode(String),
    /// failed to decode frame: {0}
    Decode(String),
    /// channel name exceeds 64 bytes
    ChannelNameTooLong,
}

impl Classify for WireError {
    fn kind(&self) -> ErrorKind {
        match self {
            WireError::Encode(_) | WireError::Decode(_) => ErrorKind::Protocol,
            WireError::ChannelNameTooLong => ErrorKind::Resource,
        }
    }
}

pub type Result<T> = std::result::Result<T, WireError>;
