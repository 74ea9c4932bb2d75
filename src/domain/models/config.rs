//! Typed configuration tree with defaults for every section.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::worker::WorkerDescriptor;

/// Main configuration structure for fleetkeeper
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Fleet keep-alive loop configuration
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,

    /// Job monitor configuration
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Per-call network timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Where fleet membership comes from
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// HTTP metric source configuration
    #[serde(default)]
    pub metric: MetricConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Reconciliation loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReconciliationConfig {
    /// Whether keep-alive reconciliation starts enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Milliseconds between ticks
    #[serde(default = "default_reconcile_interval_ms")]
    pub interval_ms: u64,

    /// Target sent with keep-alive starts
    #[serde(default = "default_keep_alive_target")]
    pub keep_alive_target: i64,

    /// Placeholder resource sent with keep-alive starts
    #[serde(default = "default_keep_alive_resource")]
    pub keep_alive_resource: String,

    /// Upper bound for one worker's work within a tick
    #[serde(default = "default_unit_timeout_ms")]
    pub unit_timeout_ms: u64,
}

const fn default_true() -> bool {
    true
}

const fn default_reconcile_interval_ms() -> u64 {
    30_000
}

const fn default_keep_alive_target() -> i64 {
    1_000_000_000
}

fn default_keep_alive_resource() -> String {
    "idle".to_string()
}

const fn default_unit_timeout_ms() -> u64 {
    25_000
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            interval_ms: default_reconcile_interval_ms(),
            keep_alive_target: default_keep_alive_target(),
            keep_alive_resource: default_keep_alive_resource(),
            unit_timeout_ms: default_unit_timeout_ms(),
        }
    }
}

impl ReconciliationConfig {
    /// Tick interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Per-unit timeout as a [`Duration`].
    pub fn unit_timeout(&self) -> Duration {
        Duration::from_millis(self.unit_timeout_ms)
    }
}

/// Job monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MonitorConfig {
    /// Milliseconds between ticks
    #[serde(default = "default_monitor_interval_ms")]
    pub interval_ms: u64,

    /// Auto-restart rounds allowed per job before giving up
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// Upper bound for one job's work within a tick: the metric read and
    /// status polls plus one start or stop round
    #[serde(default = "default_monitor_unit_timeout_ms")]
    pub unit_timeout_ms: u64,
}

const fn default_monitor_interval_ms() -> u64 {
    10_000
}

const fn default_monitor_unit_timeout_ms() -> u64 {
    30_000
}

const fn default_max_restarts() -> u32 {
    10
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_monitor_interval_ms(),
            max_restarts: default_max_restarts(),
            unit_timeout_ms: default_monitor_unit_timeout_ms(),
        }
    }
}

impl MonitorConfig {
    /// Tick interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Per-unit timeout as a [`Duration`].
    pub fn unit_timeout(&self) -> Duration {
        Duration::from_millis(self.unit_timeout_ms)
    }
}

/// Per-call timeouts. Status checks are shorter than start/stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// `GET /status` timeout in milliseconds
    #[serde(default = "default_status_ms")]
    pub status_ms: u64,

    /// `POST /start` timeout in milliseconds
    #[serde(default = "default_command_ms")]
    pub start_ms: u64,

    /// `POST /stop` timeout in milliseconds
    #[serde(default = "default_command_ms")]
    pub stop_ms: u64,

    /// Metric source read timeout in milliseconds
    #[serde(default = "default_metric_ms")]
    pub metric_ms: u64,
}

const fn default_status_ms() -> u64 {
    5_000
}

const fn default_command_ms() -> u64 {
    15_000
}

const fn default_metric_ms() -> u64 {
    10_000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            status_ms: default_status_ms(),
            start_ms: default_command_ms(),
            stop_ms: default_command_ms(),
            metric_ms: default_metric_ms(),
        }
    }
}

impl TimeoutConfig {
    /// Status check timeout.
    pub fn status(&self) -> Duration {
        Duration::from_millis(self.status_ms)
    }

    /// Start command timeout.
    pub fn start(&self) -> Duration {
        Duration::from_millis(self.start_ms)
    }

    /// Stop command timeout.
    pub fn stop(&self) -> Duration {
        Duration::from_millis(self.stop_ms)
    }

    /// Metric read timeout.
    pub fn metric(&self) -> Duration {
        Duration::from_millis(self.metric_ms)
    }
}

/// Fleet membership source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DirectoryConfig {
    /// JSON file holding the worker list, re-read on every tick
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Inline workers, used when no path is set
    #[serde(default)]
    pub workers: Vec<WorkerDescriptor>,
}

/// HTTP metric source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MetricConfig {
    /// URL with a `{resource}` placeholder
    #[serde(default = "default_url_template")]
    pub url_template: String,

    /// JSON field holding the numeric value
    #[serde(default = "default_value_field")]
    pub value_field: String,
}

fn default_url_template() -> String {
    "http://127.0.0.1:8090/counters/{resource}".to_string()
}

fn default_value_field() -> String {
    "value".to_string()
}

impl Default for MetricConfig {
    fn default() -> Self {
        Self {
            url_template: default_url_template(),
            value_field: default_value_field(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,

    /// Rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
