// Copyright (c) 2024 Omerta Mesh Contributors

//! Tunnel manager configuration.

use std::time::Duration;

/// Configuration for one [`crate::manager::TunnelManager`].
#[derive(Debug, Clone, Copy)]
pub struct TunnelConfig {
    /// How long `create_session` waits for `ack`/`reject` before failing
    /// with [`crate::error::TunnelError::HandshakeTimeout`] (§4.9 default
    /// 10 s, matching the channel-establish timeout of §4.8).
    pub handshake_timeout: Duration,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// Builder for [`TunnelConfig`].
#[derive(Debug, Default)]
pub struct TunnelConfigBuilder {
    config: TunnelConfig,
}

impl TunnelConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    pub fn build(self) -> TunnelConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_component_design() {
        assert_eq!(TunnelConfig::default().handshake_timeout, Duration::from_secs(10));
    }
}
