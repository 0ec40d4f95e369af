// Copyright (c) 2024 Omerta Mesh Contributors

//! Named logical channels layered over the mesh transport: handler
//! registration, strict per-(sender, channel) FIFO dispatch, and
//! establish-on-send path selection (§4.8).

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod message;

pub use config::{ChannelConfig, ChannelConfigBuilder};
pub use dispatcher::{ChannelDispatcher, ChannelStats};
pub use error::ChannelError;
pub use message::ChannelMessage;
