// Copyright (c) 2024 Omerta Mesh Contributors

//! Channel dispatcher configuration.

use std::time::Duration;

/// Configuration for one [`crate::dispatcher::ChannelDispatcher`].
#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig {
    /// How long `send_on_channel` will wait for a path to be established
    /// (direct dial, hole punch, or relay session) before giving up
    /// (§4.8 default 10 s).
    pub establish_timeout: Duration,
    /// Pending messages buffered per registered channel before the
    /// dispatcher drops further traffic and surfaces a warning (§5
    /// default 256).
    pub queue_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            establish_timeout: Duration::from_secs(10),
            queue_capacity: 256,
        }
    }
}

/// Builder for [`ChannelConfig`].
#[derive(Debug, Default)]
pub struct ChannelConfigBuilder {
    config: ChannelConfig,
}

impl ChannelConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn establish_timeout(mut self, timeout: Duration) -> Self {
        self.config.establish_timeout = timeout;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn build(self) -> ChannelConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_component_design() {
        let config = ChannelConfig::default();
        assert_eq!(config.establish_timeout, Duration::from_secs(10));
        assert_eq!(config.queue_capacity, 256);
    }
}
