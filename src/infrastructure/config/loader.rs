//! Hierarchical configuration loading and validation.

use std::collections::HashSet;

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A loop interval of zero
    #[error("Invalid {0} interval: must be at least 1ms")]
    InvalidInterval(&'static str),

    /// A call timeout of zero
    #[error("Invalid timeout {0}: must be at least 1ms")]
    InvalidTimeout(&'static str),

    /// Monitor unit timeout cannot fit one job's calls
    #[error(
        "monitor.unit_timeout_ms {unit_ms} is too short: metric, status and one start/stop round need {required_ms}ms"
    )]
    MonitorTimeoutTooShort {
        /// Configured unit timeout
        unit_ms: u64,
        /// Sum of the metric, status and start/stop timeouts
        required_ms: u64,
    },

    /// Restart budget of zero
    #[error("Invalid max_restarts: {0}. Must be at least 1")]
    InvalidMaxRestarts(u32),

    /// Keep-alive target count not positive
    #[error("Invalid keep_alive_target: {0}. Must be positive")]
    InvalidKeepAliveTarget(i64),

    /// Unknown tracing level
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// Unknown log format
    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    /// Unknown rotation policy
    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    /// Metric URL template without a resource placeholder
    #[error("Metric url_template must contain {{resource}}: {0}")]
    InvalidUrlTemplate(String),

    /// Two directory entries share an id
    #[error("Duplicate worker id: {0}")]
    DuplicateWorker(String),

    /// Catch-all for other invalid values
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .fleetkeeper/config.yaml
    /// 3. .fleetkeeper/local.yaml (optional local overrides)
    /// 4. Environment variables (FLEETKEEPER_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        let config: Config = Self::figment()
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".fleetkeeper/config.yaml"))
            .merge(Yaml::file(".fleetkeeper/local.yaml"))
            .merge(Env::prefixed("FLEETKEEPER_").split("__"))
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.reconciliation.interval_ms == 0 {
            return Err(ConfigError::InvalidInterval("reconciliation"));
        }
        if config.monitor.interval_ms == 0 {
            return Err(ConfigError::InvalidInterval("monitor"));
        }

        let timeouts = [
            ("reconciliation.unit_timeout_ms", config.reconciliation.unit_timeout_ms),
            ("monitor.unit_timeout_ms", config.monitor.unit_timeout_ms),
            ("timeouts.status_ms", config.timeouts.status_ms),
            ("timeouts.start_ms", config.timeouts.start_ms),
            ("timeouts.stop_ms", config.timeouts.stop_ms),
            ("timeouts.metric_ms", config.timeouts.metric_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, ms)| *ms == 0) {
            return Err(ConfigError::InvalidTimeout(*name));
        }

        let t = &config.timeouts;
        let required_ms = t
            .metric_ms
            .saturating_add(t.status_ms)
            .saturating_add(t.start_ms.max(t.stop_ms));
        if config.monitor.unit_timeout_ms < required_ms {
            return Err(ConfigError::MonitorTimeoutTooShort {
                unit_ms: config.monitor.unit_timeout_ms,
                required_ms,
            });
        }

        if config.monitor.max_restarts == 0 {
            return Err(ConfigError::InvalidMaxRestarts(config.monitor.max_restarts));
        }

        if config.reconciliation.keep_alive_target <= 0 {
            return Err(ConfigError::InvalidKeepAliveTarget(
                config.reconciliation.keep_alive_target,
            ));
        }

        if config.reconciliation.keep_alive_resource.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "keep_alive_resource cannot be empty".to_string(),
            ));
        }

        // Validate logging config
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        if !config.metric.url_template.contains("{resource}") {
            return Err(ConfigError::InvalidUrlTemplate(
                config.metric.url_template.clone(),
            ));
        }

        if config.metric.value_field.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "metric value_field cannot be empty".to_string(),
            ));
        }

        // Inline workers
        let mut seen = HashSet::new();
        for worker in &config.directory.workers {
            if worker.id.is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "worker id cannot be empty".to_string(),
                ));
            }
            if worker.endpoint.is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "worker '{}' endpoint cannot be empty",
                    worker.id
                )));
            }
            if !seen.insert(worker.id.as_str()) {
                return Err(ConfigError::DuplicateWorker(worker.id.clone()));
            }
        }

        Ok(())
    }
}
