// Copyright (c) 2024 Omerta Mesh Contributors

//! The shape delivered to a registered channel handler.

use mesh_common::PeerId;

/// One inbound `channel_data` payload, already decrypted and attributed to
/// its sender.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub from_peer_id: PeerId,
    pub bytes: Vec<u8>,
}
