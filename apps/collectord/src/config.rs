//! Collector daemon configuration.
//!
//! Read from the TOML file given on the command line. Every key is
//! optional:
//!
//! ```toml
//! poll_interval_ms = 100
//! output = "/var/log/svc-trace.log"
//! format = "json"
//!
//! [collector]
//! endpoint = "svc.trace"
//! max_concurrent_connections = 32
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use pipetrace_collector::CollectorConfig;
use serde::{Deserialize, Serialize};

/// How collected frames are written out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One human-readable line per frame.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// How often the collected queue is drained.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// File to append frames to. Stdout when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    #[serde(default)]
    pub format: OutputFormat,

    #[serde(default)]
    pub collector: CollectorConfig,
}

fn default_poll_interval_ms() -> u64 {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            output: None,
            format: OutputFormat::default(),
            collector: CollectorConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?
            }
            None => Config::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be > 0");
        }
        self.collector.validate()?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
