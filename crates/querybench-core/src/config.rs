//! Runtime configuration for the query load generator.
//!
//! Sources, highest priority first:
//! 1. Command line flags (applied by the binary)
//! 2. Environment variables (`QUERYBENCH_*`)
//! 3. TOML configuration file
//! 4. Default values

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use humantime_serde::re::humantime;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Number of series a single write-side host emits.
pub const SERIES_PER_HOST: usize = 101;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Query endpoints, one per backend replica
    /// (e.g. "http://replica-0:9090/api/v1/query_range")
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    /// Number of independent load loops (default: 2)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Number of hosts the write side emits metrics for (default: 100)
    #[serde(default = "default_num_write_hosts")]
    pub num_write_hosts: usize,

    /// Series a single load query should select (default: 1000)
    #[serde(default = "default_num_series")]
    pub num_series: usize,

    /// Time range of load queries (default: 1h)
    #[serde(default = "default_load_range", with = "humantime_serde")]
    pub load_range: Duration,

    /// Resolution step of load queries (default: 1m)
    #[serde(default = "default_load_step", with = "humantime_serde")]
    pub load_step: Duration,

    /// Time range of accuracy queries (default: 5m)
    #[serde(default = "default_accuracy_range", with = "humantime_serde")]
    pub accuracy_range: Duration,

    /// Resolution step of accuracy queries (default: 10s)
    #[serde(default = "default_accuracy_step", with = "humantime_serde")]
    pub accuracy_step: Duration,

    /// Aggregation wrapped around every query, e.g. "sum"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<String>,

    /// Fixed label matchers appended to every query
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Extra headers sent with every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Delay between loop iterations (default: 1s)
    #[serde(default = "default_sleep", with = "humantime_serde")]
    pub sleep: Duration,

    /// Log every request and (truncated) response body
    #[serde(default)]
    pub debug: bool,

    /// Maximum number of response bytes logged in debug mode, 0 = unlimited
    #[serde(default)]
    pub debug_length: usize,

    /// Per-request transport timeout (default: 30s)
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Host names the built-in checker starts with
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Known written samples the built-in checker validates against
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub datapoints: Vec<SeedDatapoint>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// A sample the write side is known to have stored for `host`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedDatapoint {
    pub host: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error (default: "info")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty (default: "pretty")
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_endpoints() -> Vec<String> {
    vec!["http://localhost:9090/api/v1/query_range".to_string()]
}

fn default_concurrency() -> usize {
    2
}

fn default_num_write_hosts() -> usize {
    100
}

fn default_num_series() -> usize {
    1000
}

fn default_load_range() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_load_step() -> Duration {
    Duration::from_secs(60)
}

fn default_accuracy_range() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_accuracy_step() -> Duration {
    Duration::from_secs(10)
}

fn default_sleep() -> Duration {
    Duration::from_secs(1)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            concurrency: default_concurrency(),
            num_write_hosts: default_num_write_hosts(),
            num_series: default_num_series(),
            load_range: default_load_range(),
            load_step: default_load_step(),
            accuracy_range: default_accuracy_range(),
            accuracy_step: default_accuracy_step(),
            aggregation: None,
            labels: BTreeMap::new(),
            headers: BTreeMap::new(),
            sleep: default_sleep(),
            debug: false,
            debug_length: 0,
            request_timeout: default_request_timeout(),
            hosts: Vec::new(),
            datapoints: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl BenchConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::TomlError { path, source: e })
    }

    /// Load configuration from `path` (or defaults when `None`) and apply
    /// environment variable overrides.
    pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `QUERYBENCH_ENDPOINTS` - Comma separated endpoint list
    /// - `QUERYBENCH_CONCURRENCY` - Number of load loops
    /// - `QUERYBENCH_NUM_WRITE_HOSTS` - Write-side host count
    /// - `QUERYBENCH_NUM_SERIES` - Series per load query
    /// - `QUERYBENCH_AGGREGATION` - Aggregation function, empty disables it
    /// - `QUERYBENCH_HOSTS` - Comma separated seed host names
    /// - `QUERYBENCH_SLEEP` - Delay between iterations (e.g. "500ms")
    /// - `QUERYBENCH_DEBUG` - Enable debug dumps
    /// - `QUERYBENCH_LOG_LEVEL` / `QUERYBENCH_LOG_FORMAT`
    ///
    /// Values that fail to parse are logged and ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(endpoints) = std::env::var("QUERYBENCH_ENDPOINTS") {
            self.endpoints = split_list(&endpoints);
        }

        if let Some(concurrency) = env_parsed("QUERYBENCH_CONCURRENCY") {
            self.concurrency = concurrency;
        }

        if let Some(hosts) = env_parsed("QUERYBENCH_NUM_WRITE_HOSTS") {
            self.num_write_hosts = hosts;
        }

        if let Some(series) = env_parsed("QUERYBENCH_NUM_SERIES") {
            self.num_series = series;
        }

        if let Ok(aggregation) = std::env::var("QUERYBENCH_AGGREGATION") {
            self.aggregation = Some(aggregation).filter(|a| !a.is_empty());
        }

        if let Ok(hosts) = std::env::var("QUERYBENCH_HOSTS") {
            self.hosts = split_list(&hosts);
        }

        if let Ok(raw) = std::env::var("QUERYBENCH_SLEEP") {
            match humantime::parse_duration(&raw) {
                Ok(sleep) => self.sleep = sleep,
                Err(e) => warn_ignored("QUERYBENCH_SLEEP", &raw, &e),
            }
        }

        if let Some(debug) = env_parsed("QUERYBENCH_DEBUG") {
            self.debug = debug;
        }

        if let Ok(level) = std::env::var("QUERYBENCH_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(format) = std::env::var("QUERYBENCH_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoints.is_empty() {
            return Err(ConfigError::ValidationError(
                "endpoints cannot be empty".to_string(),
            ));
        }

        for endpoint in &self.endpoints {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(ConfigError::ValidationError(format!(
                    "endpoint must be an http(s) URL: {endpoint}"
                )));
            }
        }

        if self.concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "concurrency must be > 0".to_string(),
            ));
        }

        if self.num_write_hosts == 0 {
            return Err(ConfigError::ValidationError(
                "num_write_hosts must be > 0".to_string(),
            ));
        }

        for (name, value) in [
            ("load_range", self.load_range),
            ("load_step", self.load_step),
            ("accuracy_range", self.accuracy_range),
            ("accuracy_step", self.accuracy_step),
            ("request_timeout", self.request_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be non-zero"
                )));
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.format must be one of: {}",
                valid_formats.join(", ")
            )));
        }

        Ok(())
    }

    /// Number of hosts one load query selects so that it spans roughly
    /// `num_series` series.
    ///
    /// Fails when the write side cannot produce that many series.
    pub fn hosts_per_query(&self) -> Result<usize, ConfigError> {
        let hosts = self.num_series.div_ceil(SERIES_PER_HOST).max(1);

        if hosts > self.num_write_hosts {
            return Err(ConfigError::Infeasible {
                num_series: self.num_series,
                max_series: self.num_write_hosts * SERIES_PER_HOST,
                num_write_hosts: self.num_write_hosts,
            });
        }

        Ok(hosts)
    }

    /// Aggregation name, treating an empty string as unset.
    pub fn aggregation(&self) -> Option<&str> {
        self.aggregation.as_deref().filter(|a| !a.is_empty())
    }
}

fn env_parsed<T>(name: &str) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn_ignored(name, &raw, &e);
            None
        }
    }
}

fn warn_ignored(name: &str, raw: &str, error: &dyn Display) {
    warn!(var = name, value = raw, error = %error, "ignoring invalid environment override");
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading configuration file
    #[error("Failed to read config file {path:?}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// TOML parsing error
    #[error("Failed to parse TOML in {path:?}: {source}")]
    TomlError {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Validation error
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// The write side cannot satisfy the requested series count
    #[error(
        "num series {num_series} exceeds metrics emitted by {num_write_hosts} write hosts (max {max_series})"
    )]
    Infeasible {
        num_series: usize,
        max_series: usize,
        num_write_hosts: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BenchConfig::default();

        assert_eq!(config.concurrency, 2);
        assert_eq!(config.endpoints.len(), 1);
        assert_eq!(config.load_step, Duration::from_secs(60));
        assert!(config.aggregation().is_none());
        assert!(!config.debug);
    }

    #[test]
    fn test_config_validation_valid() {
        let config = BenchConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_empty_endpoints() {
        let mut config = BenchConfig::default();
        config.endpoints.clear();

        let result = config.validate();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("endpoints cannot be empty"));
    }

    #[test]
    fn test_config_validation_bad_scheme() {
        let mut config = BenchConfig::default();
        config.endpoints = vec!["replica-0:9090".to_string()];

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("http(s) URL"));
    }

    #[test]
    fn test_config_validation_zero_step() {
        let mut config = BenchConfig::default();
        config.accuracy_step = Duration::ZERO;

        let result = config.validate();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("accuracy_step must be non-zero"));
    }

    #[test]
    fn test_config_validation_invalid_log_format() {
        let mut config = BenchConfig::default();
        config.logging.format = "xml".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_hosts_per_query() {
        let mut config = BenchConfig::default();

        config.num_series = 1000;
        assert_eq!(config.hosts_per_query().unwrap(), 10);

        config.num_series = 101;
        assert_eq!(config.hosts_per_query().unwrap(), 1);

        config.num_series = 102;
        assert_eq!(config.hosts_per_query().unwrap(), 2);

        config.num_series = 0;
        assert_eq!(config.hosts_per_query().unwrap(), 1);
    }

    #[test]
    fn test_hosts_per_query_infeasible() {
        let mut config = BenchConfig::default();
        config.num_write_hosts = 2;
        config.num_series = 3 * SERIES_PER_HOST;

        match config.hosts_per_query() {
            Err(ConfigError::Infeasible {
                max_series,
                num_write_hosts,
                ..
            }) => {
                assert_eq!(max_series, 2 * SERIES_PER_HOST);
                assert_eq!(num_write_hosts, 2);
            }
            other => panic!("expected infeasible config, got {other:?}"),
        }
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
            endpoints = ["http://a:9090/api/v1/query_range", "http://b:9090/api/v1/query_range"]
            concurrency = 4
            load_range = "2h"
            accuracy_step = "15s"
            sleep = "250ms"
            aggregation = "sum"

            [labels]
            env = "bench"

            [headers]
            "X-Scope-OrgID" = "tenant-1"

            [logging]
            format = "json"
        "#;

        let config: BenchConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.load_range, Duration::from_secs(2 * 60 * 60));
        assert_eq!(config.accuracy_step, Duration::from_secs(15));
        assert_eq!(config.sleep, Duration::from_millis(250));
        assert_eq!(config.aggregation(), Some("sum"));
        assert_eq!(config.labels.get("env").map(String::as_str), Some("bench"));
        assert_eq!(config.headers.len(), 1);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_seed_datapoints_deserialization() {
        let toml_str = r#"
            hosts = ["h0"]

            [[datapoints]]
            host = "h0"
            timestamp = "2024-01-01T00:00:00Z"
            value = 1.5

            [[datapoints]]
            host = "h1"
            timestamp = "2024-01-01T00:00:10Z"
            value = 2.0
        "#;

        let config: BenchConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.datapoints.len(), 2);
        assert_eq!(config.datapoints[0].host, "h0");
        assert_eq!(config.datapoints[0].value, 1.5);
        assert_eq!(config.datapoints[1].timestamp.timestamp(), 1_704_067_210);
    }

    #[test]
    fn test_toml_serialization() {
        let config = BenchConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("endpoints"));
        assert!(toml_str.contains("load_range = \"1h\""));
    }

    #[test]
    fn test_empty_aggregation_is_unset() {
        let mut config = BenchConfig::default();
        config.aggregation = Some(String::new());
        assert!(config.aggregation().is_none());
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("QUERYBENCH_ENDPOINTS", "http://x:1/q, http://y:2/q");
        std::env::set_var("QUERYBENCH_CONCURRENCY", "8");
        std::env::set_var("QUERYBENCH_SLEEP", "500ms");

        let mut config = BenchConfig::default();
        config.apply_env_overrides();

        assert_eq!(config.endpoints, vec!["http://x:1/q", "http://y:2/q"]);
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.sleep, Duration::from_millis(500));

        // Unparseable values leave the current setting alone.
        std::env::set_var("QUERYBENCH_CONCURRENCY", "lots");
        std::env::set_var("QUERYBENCH_SLEEP", "soon");
        std::env::set_var("QUERYBENCH_NUM_SERIES", "-5");

        let mut config = BenchConfig::default();
        config.apply_env_overrides();

        assert_eq!(config.concurrency, 2);
        assert_eq!(config.sleep, Duration::from_secs(1));
        assert_eq!(config.num_series, 1000);

        // Clean up
        std::env::remove_var("QUERYBENCH_NUM_SERIES");
        std::env::remove_var("QUERYBENCH_ENDPOINTS");
        std::env::remove_var("QUERYBENCH_CONCURRENCY");
        std::env::remove_var("QUERYBENCH_SLEEP");
    }
}
