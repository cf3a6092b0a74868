use crate::collector::CollectorSettings;
use crate::metrics::IDENTIFIER_CAPACITY;
use crate::{IpvsError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Collector configuration, read from YAML. Every key is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Seconds between read cycles. Default: 10.
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Host name stamped on samples. Default: the system host name.
    #[serde(default)]
    pub hostname: Option<String>,

    /// Re-query the service count before every cycle. Default: true.
    #[serde(default = "default_true")]
    pub refresh_service_count: bool,

    /// Longest service/destination identifier emitted. Default: 63.
    #[serde(default = "default_identifier_capacity")]
    pub identifier_capacity: usize,

    #[serde(default)]
    pub sinks: SinksConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SinksConfig {
    /// Log every sample. Default: on when no other sink is configured.
    #[serde(default)]
    pub log: Option<bool>,

    /// Write samples to stdout as JSON lines.
    #[serde(default)]
    pub json: bool,

    /// node_exporter textfile to rewrite after each cycle.
    #[serde(default)]
    pub prometheus_textfile: Option<PathBuf>,
}

impl SinksConfig {
    pub fn log_enabled(&self) -> bool {
        self.log
            .unwrap_or(!self.json && self.prometheus_textfile.is_none())
    }
}

fn default_interval() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_identifier_capacity() -> usize {
    IDENTIFIER_CAPACITY
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            hostname: None,
            refresh_service_count: true,
            identifier_capacity: default_identifier_capacity(),
            sinks: SinksConfig::default(),
        }
    }
}

impl Config {
    /// Read and validate a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            IpvsError::ConfigError(format!("reading {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(text)
            .map_err(|e| IpvsError::ConfigError(format!("parsing config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(IpvsError::ConfigError(
                "interval must be at least 1 second".to_string(),
            ));
        }
        if self.identifier_capacity == 0 {
            return Err(IpvsError::ConfigError(
                "identifier_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    /// Configured host name, else the system's, else "localhost".
    pub fn resolve_hostname(&self) -> String {
        self.hostname
            .clone()
            .or_else(|| {
                hostname::get()
                    .ok()
                    .map(|h| h.to_string_lossy().into_owned())
            })
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "localhost".to_string())
    }

    pub fn collector_settings(&self) -> CollectorSettings {
        CollectorSettings {
            hostname: self.resolve_hostname(),
            interval: self.interval(),
            identifier_capacity: self.identifier_capacity,
            refresh_service_count: self.refresh_service_count,
        }
    }
}
