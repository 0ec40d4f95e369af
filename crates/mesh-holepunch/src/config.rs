// Copyright (c) 2024 Omerta Mesh Contributors

//! Hole-punch engine configuration.

use std::time::Duration;

/// Configuration for one [`crate::engine::HolePunchEngine`].
#[derive(Debug, Clone, Copy)]
pub struct HolePunchConfig {
    /// Probes sent per burst (§4.5 default 5).
    pub burst_size: u8,
    /// Minimum spacing between probes within a burst (§4.5: "≤ 20 ms").
    pub burst_spacing: Duration,
    /// Overall deadline for one attempt before it is abandoned (§4.5
    /// default 5 s).
    pub timeout: Duration,
    /// Half-width of the source-port sweep a symmetric-NAT driver tries
    /// after the first burst fails (§4.5 default ±8).
    pub port_prediction_window: u16,
}

impl Default for HolePunchConfig {
    fn default() -> Self {
        Self {
            burst_size: 5,
            burst_spacing: Duration::from_millis(20),
            timeout: Duration::from_secs(5),
            port_prediction_window: 8,
        }
    }
}

/// Builder for [`HolePunchConfig`].
#[derive(Debug, Default)]
pub struct HolePunchConfigBuilder {
    config: HolePunchConfig,
}

impl HolePunchConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn burst_size(mut self, burst_size: u8) -> Self {
        self.config.burst_size = burst_size;
        self
    }

    pub fn burst_spacing(mut self, spacing: Duration) -> Self {
        self.config.burst_spacing = spacing;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn port_prediction_window(mut self, window: u16) -> Self {
        self.config.port_prediction_window = window;
        self
    }

    pub fn build(self) -> HolePunchConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_component_design() {
        let config = HolePunchConfig::default();
        assert_eq!(config.burst_size, 5);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.port_prediction_window, 8);
    }
}
