// Copyright (c) 2026 tensorq contributors
// SPDX-License-Identifier: MIT

use crate::config::consts::{
    DEFAULT_DEVICE, DEFAULT_MINBATCH_WAIT_MS, DEFAULT_THREADS_PER_QUEUE, MAX_MINBATCH_WAIT_MS,
    MAX_THREADS_PER_QUEUE,
};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Runtime configuration for the run engine.
///
/// Typically loaded from a YAML file; every field has a default so an empty
/// file (or no file at all) yields a working configuration.
///
/// # Example
/// ```yaml
/// threads_per_queue: 2
/// default_device: CPU
/// minbatch_wait_ms: 2
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    /// Worker threads spawned for each device queue.
    #[serde(default = "default_threads_per_queue")]
    pub threads_per_queue: usize,
    /// Device for jobs that do not pin one.
    #[serde(default = "default_device")]
    pub default_device: String,
    /// Bounded wait for a model's declared minimum batch, in milliseconds.
    #[serde(default = "default_minbatch_wait_ms")]
    pub minbatch_wait_ms: u64,
}

fn default_threads_per_queue() -> usize {
    DEFAULT_THREADS_PER_QUEUE
}

fn default_device() -> String {
    DEFAULT_DEVICE.to_string()
}

fn default_minbatch_wait_ms() -> u64 {
    DEFAULT_MINBATCH_WAIT_MS
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            threads_per_queue: DEFAULT_THREADS_PER_QUEUE,
            default_device: DEFAULT_DEVICE.to_string(),
            minbatch_wait_ms: DEFAULT_MINBATCH_WAIT_MS,
        }
    }
}

impl RuntimeConfig {
    pub fn minbatch_wait(&self) -> Duration {
        Duration::from_millis(self.minbatch_wait_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads_per_queue == 0 || self.threads_per_queue > MAX_THREADS_PER_QUEUE {
            return Err(ConfigError::Invalid(format!(
                "threads_per_queue must be in 1..={}, got {}",
                MAX_THREADS_PER_QUEUE, self.threads_per_queue
            )));
        }
        if self.default_device.is_empty() {
            return Err(ConfigError::Invalid(
                "default_device must not be empty".to_string(),
            ));
        }
        if self.minbatch_wait_ms > MAX_MINBATCH_WAIT_MS {
            return Err(ConfigError::Invalid(format!(
                "minbatch_wait_ms must be at most {}, got {}",
                MAX_MINBATCH_WAIT_MS, self.minbatch_wait_ms
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Load and validate a config from a YAML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RuntimeConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let cfg: RuntimeConfig = serde_yaml::from_str(&content)?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn parse_full_config() {
        let yaml = r#"
threads_per_queue: 4
default_device: "gpu:0"
minbatch_wait_ms: 10
"#;
        let cfg: RuntimeConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.threads_per_queue, 4);
        assert_eq!(cfg.default_device, "gpu:0");
        assert_eq!(cfg.minbatch_wait(), Duration::from_millis(10));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: RuntimeConfig = serde_yaml::from_str("threads_per_queue: 2").unwrap();
        assert_eq!(cfg.threads_per_queue, 2);
        assert_eq!(cfg.default_device, DEFAULT_DEVICE);
        assert_eq!(cfg.minbatch_wait_ms, DEFAULT_MINBATCH_WAIT_MS);
    }

    #[test]
    fn zero_threads_is_invalid() {
        let cfg = RuntimeConfig {
            threads_per_queue: 0,
            ..RuntimeConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn oversized_minbatch_wait_is_invalid() {
        let cfg = RuntimeConfig {
            minbatch_wait_ms: MAX_MINBATCH_WAIT_MS + 1,
            ..RuntimeConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_config_round_trips_through_a_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "threads_per_queue: 3").unwrap();
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.threads_per_queue, 3);
    }

    #[test]
    fn load_config_rejects_invalid_values() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "threads_per_queue: 0").unwrap();
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn load_config_surfaces_io_errors() {
        assert!(matches!(
            load_config("/nonexistent/path/config.yaml"),
            Err(ConfigError::Io(_))
        ));
    }
}
