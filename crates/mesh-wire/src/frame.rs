// Copyright (c) 2024 Omerta Mesh Contributors

//! The tagged control-frame enum carried as the plaintext of every sealed
//! datagram (see the crypto envelope in `mesh-crypto`).
//!
//! Frames are CBOR-encoded. `serde_cbor`'s externally-tagged enum
//! representation (`{"ping": {...}}`) is self-describing enough that a
//! newer peer can add a variant without breaking an older one: the older
//! peer fails to decode the unrecognized map key and the caller drops the
//! frame (see [`crate::error::WireError::Decode`]) rather than panicking.

use crate::error::{Result, WireError};
use mesh_common::{Endpoint, NatType, PeerId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum length, in bytes, of a [`Frame::ChannelData`] channel name.
pub const MAX_CHANNEL_NAME_LEN: usize = 64;

/// A lightweight peer announcement carried in gossip payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GossipEntry {
    pub peer_id: PeerId,
    pub last_known_endpoint: Endpoint,
    pub nat_type: NatType,
    /// Unix timestamp (seconds) of the announcing node's last observation
    /// of this peer; used to resolve gossip merge races (§4.4: "update
    /// only if the incoming last_seen is strictly newer").
    pub last_seen: u64,
}

/// A common-clock moment, `~100ms` in the future, at which both
/// hole-punching parties should send their first probe burst. Measured in
/// the coordinator's frame per the component design (§4.5 step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSyncHint {
    /// Unix timestamp in milliseconds.
    pub at_unix_millis: u64,
}

/// Why a relay refused to open a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayDenyReason {
    /// The relay holds no live record for the requested target.
    TargetUnknown,
    /// The relay is already serving `max_sessions`.
    AtCapacity,
    /// The relay is shutting down or otherwise not accepting new sessions.
    NotAccepting,
}

/// The tagged control-frame enum. This is the plaintext sealed by the
/// crypto envelope; see §4.2 of the design for the full enumeration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Frame {
    /// Liveness probe plus gossip, sent periodically and on bootstrap.
    Ping {
        sender_peer_id: PeerId,
        recent_peers: Vec<GossipEntry>,
        my_nat_type: NatType,
    },
    /// Reply to [`Frame::Ping`], reporting back the sender's observed
    /// mapped endpoint so it can learn its own public address.
    Pong {
        sender_peer_id: PeerId,
        mapped_endpoint: Endpoint,
        recent_peers: Vec<GossipEntry>,
        observed_nat_type: NatType,
    },
    /// Unsolicited notice that the sender's externally-visible endpoint
    /// has changed, prompting the receiver to re-run NAT detection.
    EndpointReport {
        sender_peer_id: PeerId,
        endpoint: Endpoint,
    },
    /// Ask a coordinator to broker a hole-punch with `target_peer_id`.
    HolePunchRequest {
        requester_peer_id: PeerId,
        target_peer_id: PeerId,
    },
    /// Sent by a coordinator to each side of a hole-punch attempt,
    /// identifying the other party's endpoint and a common wall-clock
    /// moment at which both sides should begin their probe burst.
    HolePunchCoordinate {
        peer_other_peer_id: PeerId,
        peer_other_endpoint: Endpoint,
        time_sync_hint: TimeSyncHint,
    },
    /// One shot of a hole-punch probe burst.
    Probe { nonce: u64 },
    /// Reply to the first [`Frame::Probe`] received from a peer.
    ProbeAck { nonce: u64, rtt_millis: u32 },
    /// Ask a relay to open a session to `target_peer_id`.
    RelayRequest {
        requester_peer_id: PeerId,
        target_peer_id: PeerId,
        session_id: Uuid,
    },
    /// The relay accepted the session request; sent back to the requester.
    RelayAccept { session_id: Uuid },
    /// The relay refused the session request.
    RelayDeny {
        session_id: Uuid,
        reason: RelayDenyReason,
    },
    /// Sent by the relay to `target_peer_id` once it accepts a session, so
    /// the target can create its matching local session record before the
    /// first `relay_data` arrives (§4.7: "both endpoints create matching
    /// local session records").
    RelayOpened {
        session_id: Uuid,
        relay_peer_id: PeerId,
        initiator_peer_id: PeerId,
    },
    /// Opaque, still-sealed-under-the-network-key application payload
    /// forwarded through a relay session.
    RelayData { session_id: Uuid, bytes: Vec<u8> },
    /// Either endpoint is closing a relay session.
    RelayEnd { session_id: Uuid },
    /// An application payload addressed to a named logical channel.
    ChannelData { channel_name: String, bytes: Vec<u8> },
}

impl Frame {
    /// Build a [`Frame::ChannelData`], rejecting channel names over
    /// [`MAX_CHANNEL_NAME_LEN`] bytes.
    pub fn channel_data(channel_name: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        let channel_name = channel_name.into();
        if channel_name.len() > MAX_CHANNEL_NAME_LEN {
            return Err(WireError::ChannelNameTooLong);
        }
        Ok(Frame::ChannelData {
            channel_name,
            bytes,
        })
    }

    /// A short, stable name for this frame's variant, used in logs.
    pub fn tag(&self) -> &'static str {
        match self {
            Frame::Ping { .. } => "ping",
            Frame::Pong { .. } => "pong",
            Frame::EndpointReport { .. } => "endpoint_report",
            Frame::HolePunchRequest { .. } => "hole_punch_request",
            Frame::HolePunchCoordinate { .. } => "hole_punch_coordinate",
            Frame::Probe { .. } => "probe",
            Frame::ProbeAck { .. } => "probe_ack",
            Frame::RelayRequest { .. } => "relay_request",
            Frame::RelayAccept { .. } => "relay_accept",
            Frame::RelayDeny { .. } => "relay_deny",
            Frame::RelayOpened { .. } => "relay_opened",
            Frame::RelayData { .. } => "relay_data",
            Frame::RelayEnd { .. } => "relay_end",
            Frame::ChannelData { .. } => "channel_data",
        }
    }

    /// CBOR-encode this frame.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_cbor::to_vec(self).map_err(|e| WireError::Encode(e.to_string()))
    }

    /// Decode a frame from CBOR bytes. An unrecognized tag or malformed
    /// body is surfaced as [`WireError::Decode`]; per the protocol error
    /// policy, the caller logs and silently drops rather than propagating.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_cbor::from_slice(bytes).map_err(|e| WireError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sample_peer_id() -> PeerId {
        PeerId::from_hex("aaaaaaaaaaaaaaaa").unwrap()
    }

    #[test]
    fn channel_data_round_trips() {
        let frame = Frame::channel_data("jobs", b"hello".to_vec()).unwrap();
        let encoded = frame.encode().unwrap();
        let decoded = Frame::decode(&encoded).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn channel_name_too_long_is_rejected() {
        let name = "x".repeat(MAX_CHANNEL_NAME_LEN + 1);
        let err = Frame::channel_data(name, vec![]).unwrap_err();
        assert!(matches!(err, WireError::ChannelNameTooLong));
    }

    #[test]
    fn ping_pong_round_trip_with_gossip() {
        let entry = GossipEntry {
            peer_id: sample_peer_id(),
            last_known_endpoint: Endpoint::from_str("127.0.0.1:4001").unwrap(),
            nat_type: NatType::FullCone,
            last_seen: 1_700_000_000,
        };
        let ping = Frame::Ping {
            sender_peer_id: sample_peer_id(),
            recent_peers: vec![entry.clone()],
            my_nat_type: NatType::Public,
        };
        let decoded = Frame::decode(&ping.encode().unwrap()).unwrap();
        assert_eq!(ping, decoded);
        assert_eq!(ping.tag(), "ping");
    }

    #[test]
    fn decoding_garbage_is_a_decode_error_not_a_panic() {
        let err = Frame::decode(&[0xff, 0x00, 0x01]).unwrap_err();
        assert!(matches!(err, WireError::Decode(_)));
    }

    #[test]
    fn hole_punch_frames_round_trip() {
        let request = Frame::HolePunchRequest {
            requester_peer_id: sample_peer_id(),
            target_peer_id: sample_peer_id(),
        };
        assert_eq!(request, Frame::decode(&request.encode().unwrap()).unwrap());

        let coordinate = Frame::HolePunchCoordinate {
            peer_other_peer_id: sample_peer_id(),
            peer_other_endpoint: Endpoint::from_str("127.0.0.1:4001").unwrap(),
            time_sync_hint: TimeSyncHint {
                at_unix_millis: 1_700_000_000_000,
            },
        };
        assert_eq!(
            coordinate,
            Frame::decode(&coordinate.encode().unwrap()).unwrap()
        );

        let probe = Frame::Probe { nonce: 7 };
        assert_eq!(probe, Frame::decode(&probe.encode().unwrap()).unwrap());

        let ack = Frame::ProbeAck {
            nonce: 7,
            rtt_millis: 42,
        };
        assert_eq!(ack, Frame::decode(&ack.encode().unwrap()).unwrap());
    }

    #[test]
    fn relay_frames_round_trip() {
        let session_id = Uuid::new_v4();
        let req = Frame::RelayRequest {
            requester_peer_id: sample_peer_id(),
            target_peer_id: sample_peer_id(),
            session_id,
        };
        assert_eq!(req, Frame::decode(&req.encode().unwrap()).unwrap());

        let deny = Frame::RelayDeny {
            session_id,
            reason: RelayDenyReason::AtCapacity,
        };
        assert_eq!(deny, Frame::decode(&deny.encode().unwrap()).unwrap());

        let opened = Frame::RelayOpened {
            session_id,
            relay_peer_id: sample_peer_id(),
            initiator_peer_id: sample_peer_id(),
        };
        assert_eq!(opened, Frame::decode(&opened.encode().unwrap()).unwrap());
    }
}
