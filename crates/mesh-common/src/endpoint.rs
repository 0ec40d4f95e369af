// Copyright (c) 2024 Omerta Mesh Contributors

//! The `ip:port` endpoint type shared by every transport-facing crate.

use std::net::SocketAddr;
use std::str::FromStr;

/// A UDP endpoint: `ip:port`. IPv4 is the primary target; IPv6 addresses
/// are accepted but receive no special NAT-traversal handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Endpoint(pub SocketAddr);

impl Endpoint {
    /// The IP address half of the endpoint.
    pub fn ip(&self) -> std::net::IpAddr {
        self.0.ip()
    }

    /// The port half of the endpoint.
    pub fn port(&self) -> u16 {
        self.0.port()
    }

    /// True if `other` shares this endpoint's IP but not its port.
    pub fn same_ip_different_port(&self, other: &Endpoint) -> bool {
        self.ip() == other.ip() && self.port() != other.port()
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(e: Endpoint) -> Self {
        e.0
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Endpoint {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays() {
        let e: Endpoint = "127.0.0.1:9000".parse().unwrap();
        assert_eq!(e.port(), 9000);
        assert_eq!(e.to_string(), "127.0.0.1:9000");
    }

    #[test]
    fn same_ip_different_port() {
        let a: Endpoint = "127.0.0.1:1".parse().unwrap();
        let b: Endpoint = "127.0.0.1:2".parse().unwrap();
        let c: Endpoint = "127.0.0.2:1".parse().unwrap();
        assert!(a.same_ip_different_port(&b));
        assert!(!a.same_ip_different_port(&c));
        assert!(!a.same_ip_different_port(&a));
    }
}
