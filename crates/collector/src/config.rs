//! Collector configuration.

use pipetrace_protocol::MAX_FRAME_SIZE;
use pipetrace_transport::{EndpointName, MAX_SERVER_INSTANCES};
use serde::{Deserialize, Serialize};

use crate::{CollectorError, DEFAULT_MAX_CONCURRENT_CONNECTIONS};

/// Collector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Endpoint producers connect to.
    #[serde(default)]
    pub endpoint: EndpointName,

    /// Number of endpoints kept listening at all times.
    #[serde(default = "default_max_concurrent_connections")]
    pub max_concurrent_connections: usize,

    /// Platform cap on server instances for one endpoint name.
    #[serde(default = "default_max_server_instances")]
    pub max_server_instances: usize,

    /// Maximum encoded frame size. Must match the producers.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

fn default_max_concurrent_connections() -> usize {
    DEFAULT_MAX_CONCURRENT_CONNECTIONS
}

fn default_max_server_instances() -> usize {
    MAX_SERVER_INSTANCES
}

fn default_max_frame_size() -> usize {
    MAX_FRAME_SIZE
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointName::default(),
            max_concurrent_connections: default_max_concurrent_connections(),
            max_server_instances: default_max_server_instances(),
            max_frame_size: default_max_frame_size(),
        }
    }
}

impl CollectorConfig {
    /// Config for `endpoint` serving up to `max_concurrent_connections`
    /// producers, other fields at their defaults.
    pub fn new(endpoint: EndpointName, max_concurrent_connections: usize) -> Self {
        Self {
            endpoint,
            max_concurrent_connections,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), CollectorError> {
        if self.max_server_instances == 0 || self.max_server_instances > MAX_SERVER_INSTANCES {
            return Err(CollectorError::InvalidConfiguration(format!(
                "max_server_instances must be in 1..={MAX_SERVER_INSTANCES}, got {}",
                self.max_server_instances
            )));
        }
        if self.max_concurrent_connections == 0 {
            return Err(CollectorError::InvalidConfiguration(
                "max_concurrent_connections must be > 0".into(),
            ));
        }
        if self.max_concurrent_connections > self.max_server_instances {
            return Err(CollectorError::InvalidConfiguration(format!(
                "max_concurrent_connections ({}) exceeds max_server_instances ({})",
                self.max_concurrent_connections, self.max_server_instances
            )));
        }
        if self.max_frame_size == 0 || self.max_frame_size > u32::MAX as usize {
            return Err(CollectorError::InvalidConfiguration(format!(
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
        let config = CollectorConfig::default();
        assert_eq!(config.max_concurrent_connections, 32);
        assert_eq!(config.max_server_instances, 254);
        assert_eq!(config.max_frame_size, 256 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_overrides() {
        let config: CollectorConfig = toml::from_str(
            r#"
            endpoint = "svc.trace"
            max_concurrent_connections = 4
            max_frame_size = 1048576
            "#,
        )
        .unwrap();
        assert_eq!(config.endpoint.as_str(), "svc.trace");
        assert_eq!(config.max_concurrent_connections, 4);
        assert_eq!(config.max_frame_size, 1024 * 1024);
        assert_eq!(config.max_server_instances, 254);
    }

    #[test]
    fn zero_connections_rejected() {
        let config = CollectorConfig::new(EndpointName::default(), 0);
        assert!(matches!(
            config.validate(),
            Err(CollectorError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn connections_above_instance_cap_rejected() {
        let config = CollectorConfig {
            max_concurrent_connections: 10,
            max_server_instances: 8,
            ..CollectorConfig::default()
        };
        assert!(config.validate().is_err());

        let config = CollectorConfig {
            max_server_instances: 255,
            ..CollectorConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
