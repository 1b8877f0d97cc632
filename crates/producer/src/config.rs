//! Producer configuration.

use std::time::Duration;

use pipetrace_protocol::MAX_FRAME_SIZE;
use pipetrace_transport::{CONNECT_TIMEOUT, EndpointName};
use serde::{Deserialize, Serialize};

use crate::{DEFAULT_BUFFER_CAPACITY, DEFAULT_RECONNECT_INTERVAL, ProducerError};

/// Producer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerConfig {
    /// Endpoint the collector listens on.
    #[serde(default)]
    pub endpoint: EndpointName,

    /// Ring buffer capacity (power of two, at least 2).
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Wait between reconnection attempts, in milliseconds.
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    /// Timeout for one connection attempt, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Maximum encoded frame size. Must match the collector.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    /// Stamp each frame with the time of the trace call.
    #[serde(default)]
    pub include_timestamp: bool,

    /// Stamp each frame with the producer's current activity id.
    #[serde(default)]
    pub include_activity_id: bool,
}

fn default_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}

fn default_reconnect_interval_ms() -> u64 {
    DEFAULT_RECONNECT_INTERVAL.as_millis() as u64
}

fn default_connect_timeout_ms() -> u64 {
    CONNECT_TIMEOUT.as_millis() as u64
}

fn default_max_frame_size() -> usize {
    MAX_FRAME_SIZE
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointName::default(),
            buffer_capacity: default_buffer_capacity(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            max_frame_size: default_max_frame_size(),
            include_timestamp: false,
            include_activity_id: false,
        }
    }
}

impl ProducerConfig {
    /// Config for `endpoint` with every other field at its default.
    pub fn for_endpoint(endpoint: EndpointName) -> Self {
        Self {
            endpoint,
            ..Self::default()
        }
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Checks the values that cannot be caught by the type system.
    pub fn validate(&self) -> Result<(), ProducerError> {
        if self.buffer_capacity < 2 || !self.buffer_capacity.is_power_of_two() {
            return Err(ProducerError::InvalidConfiguration(format!(
                "buffer_capacity must be a power of two >= 2, got {}",
                self.buffer_capacity
            )));
        }
        if self.reconnect_interval_ms == 0 {
            return Err(ProducerError::InvalidConfiguration(
                "reconnect_interval_ms must be > 0".into(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ProducerError::InvalidConfiguration(
                "connect_timeout_ms must be > 0".into(),
            ));
        }
        if self.max_frame_size == 0 || self.max_frame_size > u32::MAX as usize {
            return Err(ProducerError::InvalidConfiguration(format!(
                "max_frame_size out of range: {}",
                self.max_frame_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ProducerConfig::default();
        assert_eq!(config.endpoint, EndpointName::default());
        assert_eq!(config.buffer_capacity, 4096);
        assert_eq!(config.reconnect_interval(), Duration::from_secs(10));
        assert_eq!(config.max_frame_size, 256 * 1024);
        assert!(!config.include_timestamp);
        assert!(!config.include_activity_id);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: ProducerConfig = toml::from_str(
            r#"
            endpoint = "my.app.trace"
            buffer_capacity = 1024
            include_timestamp = true
            "#,
        )
        .unwrap();

        assert_eq!(config.endpoint.as_str(), "my.app.trace");
        assert_eq!(config.buffer_capacity, 1024);
        assert!(config.include_timestamp);
        assert_eq!(config.reconnect_interval_ms, 10_000);
    }

    #[test]
    fn invalid_endpoint_rejected_on_parse() {
        let result: Result<ProducerConfig, _> = toml::from_str(r#"endpoint = "a/b""#);
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_bad_capacity() {
        for capacity in [0, 1, 3, 1000] {
            let config = ProducerConfig {
                buffer_capacity: capacity,
                ..ProducerConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ProducerError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn validate_rejects_zero_intervals() {
        let config = ProducerConfig {
            reconnect_interval_ms: 0,
            ..ProducerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ProducerConfig {
            max_frame_size: 0,
            ..ProducerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
