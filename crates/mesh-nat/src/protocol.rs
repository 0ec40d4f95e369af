// Copyright (c) 2024 Omerta Mesh Contributors

//! The minimal STUN-like request/response exchanged with rendezvous
//! servers, independent of any network key: a node must be able to learn
//! its own mapped endpoint before it has joined a network.
//!
//! Wire layout, both directions: `magic (4B) || transaction_id (12B)`,
//! with the request appending `change_port (1B)` and the response
//! appending `family (1B, 1=v4) || port (2B BE) || ip (4B)`.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

const MAGIC: [u8; 4] = *b"OMRV";
const FAMILY_V4: u8 = 1;

/// A rendezvous probe request: a transaction id to correlate the reply,
/// plus an optional STUN-style CHANGE-REQUEST asking the server to send
/// its reply from a different source port on the same IP. Used to
/// distinguish `restricted-cone` (any port from the mapped IP gets
/// through) from `port-restricted` (only the exact mapped port does).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeRequest {
    pub transaction_id: [u8; 12],
    pub change_port: bool,
}

impl ProbeRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(17);
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&self.transaction_id);
        out.push(self.change_port as u8);
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 17 || bytes[..4] != MAGIC {
            return None;
        }
        let mut transaction_id = [0u8; 12];
        transaction_id.copy_from_slice(&bytes[4..16]);
        Some(Self {
            transaction_id,
            change_port: bytes[16] != 0,
        })
    }
}

/// A rendezvous probe response, reporting back the mapped endpoint the
/// server observed the request arrive from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResponse {
    pub transaction_id: [u8; 12],
    pub mapped_endpoint: SocketAddr,
}

impl ProbeResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(23);
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&self.transaction_id);
        match self.mapped_endpoint {
            SocketAddr::V4(addr) => {
                out.push(FAMILY_V4);
                out.extend_from_slice(&addr.port().to_be_bytes());
                out.extend_from_slice(&addr.ip().octets());
            }
            SocketAddr::V6(_) => unimplemented!("IPv6 rendezvous responses are not emitted"),
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 23 || bytes[..4] != MAGIC {
            return None;
        }
        let mut transaction_id = [0u8; 12];
        transaction_id.copy_from_slice(&bytes[4..16]);
        if bytes[16] != FAMILY_V4 {
            return None;
        }
        let port = u16::from_be_bytes([bytes[17], bytes[18]]);
        let ip = Ipv4Addr::new(bytes[19], bytes[20], bytes[21], bytes[22]);
        Some(Self {
            transaction_id,
            mapped_endpoint: SocketAddr::V4(SocketAddrV4::new(ip, port)),
        })
    }

    /// True if this is a probe request's bytes rather than a response's.
    pub fn is_request(bytes: &[u8]) -> bool {
        bytes.len() == 17 && bytes[..4] == MAGIC
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips() {
        let req = ProbeRequest {
            transaction_id: [7u8; 12],
            change_port: false,
        };
        assert_eq!(ProbeRequest::decode(&req.encode()), Some(req));
    }

    #[test]
    fn change_port_flag_round_trips() {
        let req = ProbeRequest {
            transaction_id: [9u8; 12],
            change_port: true,
        };
        assert_eq!(ProbeRequest::decode(&req.encode()), Some(req));
    }

    #[test]
    fn response_round_trips() {
        let resp = ProbeResponse {
            transaction_id: [3u8; 12],
            mapped_endpoint: "203.0.113.9:51000".parse().unwrap(),
        };
        assert_eq!(ProbeResponse::decode(&resp.encode()), Some(resp));
    }

    #[test]
    fn request_and_response_bytes_are_distinguishable() {
        let req = ProbeRequest {
            transaction_id: [1u8; 12],
            change_port: false,
        };
        assert!(ProbeResponse::is_request(&req.encode()));

        let resp = ProbeResponse {
            transaction_id: [1u8; 12],
            mapped_endpoint: "203.0.113.9:1".parse().unwrap(),
        };
        assert!(!ProbeResponse::is_request(&resp.encode()));
    }
}
