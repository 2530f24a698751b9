//! Tracker configuration.
//!
//! A [`TrackerConfig`] is either built in code with the `with_*` methods or
//! loaded from a TOML file. Every field has a default, so a file only needs
//! the app token:
//!
//! ```toml
//! [tracker]
//! app_token = "abc123"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use track_core::{validate_app_token, Backoff, SessionWindow};
use track_types::{Environment, ValidationError};

/// Root configuration for a tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Identity of the host app.
    #[serde(default)]
    pub tracker: TrackerSection,
    /// Delivery and retry behavior.
    #[serde(default)]
    pub delivery: DeliveryConfig,
    /// Session accounting.
    #[serde(default)]
    pub session: SessionConfig,
}

/// Identity of the host app.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerSection {
    /// App token sent with every package.
    #[serde(default)]
    pub app_token: String,
    /// Sandbox or production (default: sandbox).
    #[serde(default)]
    pub environment: Environment,
    /// Directory for persisted state (used by `Tracker::initialize`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

/// Delivery and retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Collector base URL (default: https://collector.tally-track.io).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Failed attempts after which a package is dropped (default: 5).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds (default: 100).
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Longest retry delay, in milliseconds (default: 60 000).
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Lower bound of the jitter factor (default: 0.5).
    #[serde(default = "default_jitter_min")]
    pub jitter_min: f64,
    /// Upper bound of the jitter factor (default: 1.0).
    #[serde(default = "default_jitter_max")]
    pub jitter_max: f64,
    /// Deadline for one delivery attempt, in milliseconds (default: 60 000).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Most packages kept in the queue (default: 10 000).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Keep delivering while the app is in the background (default: true).
    #[serde(default = "default_send_in_background")]
    pub send_in_background: bool,
}

/// Session accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Background gap that starts a new session, in milliseconds
    /// (default: 30 minutes).
    #[serde(default = "default_session_interval_ms")]
    pub session_interval_ms: u64,
    /// Background gap that starts a new subsession, in milliseconds
    /// (default: 1 second).
    #[serde(default = "default_subsession_interval_ms")]
    pub subsession_interval_ms: u64,
    /// Foreground timer period, in milliseconds (default: 60 seconds).
    #[serde(default = "default_timer_interval_ms")]
    pub timer_interval_ms: u64,
}

// Default value functions
fn default_base_url() -> String {
    "https://collector.tally-track.io".to_string()
}

fn default_max_retries() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    100
}

fn default_backoff_max_ms() -> u64 {
    60_000
}

fn default_jitter_min() -> f64 {
    0.5
}

fn default_jitter_max() -> f64 {
    1.0
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

fn default_queue_capacity() -> usize {
    10_000
}

fn default_send_in_background() -> bool {
    true
}

fn default_session_interval_ms() -> u64 {
    30 * 60 * 1000 // 30 minutes
}

fn default_subsession_interval_ms() -> u64 {
    1000
}

fn default_timer_interval_ms() -> u64 {
    60 * 1000
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            jitter_min: default_jitter_min(),
            jitter_max: default_jitter_max(),
            request_timeout_ms: default_request_timeout_ms(),
            queue_capacity: default_queue_capacity(),
            send_in_background: default_send_in_background(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_interval_ms: default_session_interval_ms(),
            subsession_interval_ms: default_subsession_interval_ms(),
            timer_interval_ms: default_timer_interval_ms(),
        }
    }
}

impl TrackerConfig {
    /// Create a configuration with defaults for the given app token.
    pub fn new(app_token: &str) -> Self {
        Self {
            tracker: TrackerSection {
                app_token: app_token.to_string(),
                ..TrackerSection::default()
            },
            delivery: DeliveryConfig::default(),
            session: SessionConfig::default(),
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed. The result is
    /// not validated; `Tracker::initialize` does that.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Check that the configuration can drive a tracker.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_app_token(&self.tracker.app_token).map_err(ConfigError::AppToken)?;

        if self.delivery.base_url.is_empty() {
            return Err(ConfigError::Invalid("delivery.base_url is empty".into()));
        }
        if self.delivery.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "delivery.queue_capacity must be at least 1".into(),
            ));
        }
        if self.delivery.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "delivery.request_timeout_ms must be positive".into(),
            ));
        }
        if self.delivery.backoff_max_ms < self.delivery.backoff_base_ms {
            return Err(ConfigError::Invalid(
                "delivery.backoff_max_ms is below delivery.backoff_base_ms".into(),
            ));
        }
        if self.session.timer_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "session.timer_interval_ms must be positive".into(),
            ));
        }
        if self.session.subsession_interval_ms > self.session.session_interval_ms {
            return Err(ConfigError::Invalid(
                "session.subsession_interval_ms exceeds session.session_interval_ms".into(),
            ));
        }
        Ok(())
    }

    /// Set the environment.
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.tracker.environment = environment;
        self
    }

    /// Set the data directory.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tracker.data_dir = Some(dir.into());
        self
    }

    /// Set the collector base URL.
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.delivery.base_url = url.to_string();
        self
    }

    /// Set the retry ceiling.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.delivery.max_retries = max_retries;
        self
    }

    /// Set the backoff curve.
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.delivery.backoff_base_ms = millis(base);
        self.delivery.backoff_max_ms = millis(max);
        self
    }

    /// Set the jitter factor range.
    pub fn with_jitter(mut self, min: f64, max: f64) -> Self {
        self.delivery.jitter_min = min;
        self.delivery.jitter_max = max;
        self
    }

    /// Set the per-attempt deadline.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.delivery.request_timeout_ms = millis(timeout);
        self
    }

    /// Set the queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.delivery.queue_capacity = capacity;
        self
    }

    /// Deliver (or not) while backgrounded.
    pub fn with_send_in_background(mut self, enabled: bool) -> Self {
        self.delivery.send_in_background = enabled;
        self
    }

    /// Set the session and subsession thresholds.
    pub fn with_session_window(mut self, session: Duration, subsession: Duration) -> Self {
        self.session.session_interval_ms = millis(session);
        self.session.subsession_interval_ms = millis(subsession);
        self
    }

    /// Set the foreground timer period.
    pub fn with_timer_interval(mut self, interval: Duration) -> Self {
        self.session.timer_interval_ms = millis(interval);
        self
    }

    /// Backoff policy described by this configuration.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.delivery.backoff_base_ms),
            Duration::from_millis(self.delivery.backoff_max_ms),
        )
        .with_jitter(self.delivery.jitter_min, self.delivery.jitter_max)
    }

    /// Session thresholds described by this configuration.
    pub fn session_window(&self) -> SessionWindow {
        SessionWindow {
            session_interval: Duration::from_millis(self.session.session_interval_ms),
            subsession_interval: Duration::from_millis(self.session.subsession_interval_ms),
        }
    }

    /// Per-attempt deadline.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery.request_timeout_ms)
    }

    /// Foreground timer period.
    pub fn timer_interval(&self) -> Duration {
        Duration::from_millis(self.session.timer_interval_ms)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// The app token is missing or malformed.
    #[error("invalid app token: {0}")]
    AppToken(ValidationError),
    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = TrackerConfig::new("abc123");
        assert_eq!(config.tracker.environment, Environment::Sandbox);
        assert_eq!(config.delivery.max_retries, 5);
        assert_eq!(config.delivery.queue_capacity, 10_000);
        assert!(config.delivery.send_in_background);
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.timer_interval(), Duration::from_secs(60));
        assert_eq!(config.session_window(), SessionWindow::default());
        assert_eq!(config.backoff(), Backoff::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[tracker]
app_token = "abc123"
environment = "production"
data_dir = "/var/lib/tally"

[delivery]
base_url = "http://localhost:8080"
max_retries = 3
queue_capacity = 50
send_in_background = false

[session]
session_interval_ms = 600000
"#;

        let config: TrackerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.tracker.app_token, "abc123");
        assert_eq!(config.tracker.environment, Environment::Production);
        assert_eq!(config.tracker.data_dir, Some(PathBuf::from("/var/lib/tally")));
        assert_eq!(config.delivery.base_url, "http://localhost:8080");
        assert_eq!(config.delivery.max_retries, 3);
        assert_eq!(config.delivery.queue_capacity, 50);
        assert!(!config.delivery.send_in_background);
        assert_eq!(config.session.session_interval_ms, 600_000);
        assert_eq!(config.session.subsession_interval_ms, 1000);
    }

    #[test]
    fn config_missing_sections_use_defaults() {
        let config: TrackerConfig = toml::from_str("[tracker]\napp_token = \"x1\"\n").unwrap();
        assert_eq!(config.delivery, DeliveryConfig::default());
        assert_eq!(config.session, SessionConfig::default());
    }

    #[test]
    fn toml_output_loads_back() {
        let config = TrackerConfig::new("abc123")
            .with_environment(Environment::Production)
            .with_max_retries(2);
        let text = config.to_toml().unwrap();
        let restored: TrackerConfig = toml::from_str(&text).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn from_file_reports_missing_file() {
        let err = TrackerConfig::from_file(Path::new("/nonexistent/tally.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }

    #[test]
    fn from_file_reports_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tally.toml");
        std::fs::write(&path, "[tracker\napp_token = ").unwrap();

        let err = TrackerConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn empty_app_token_is_invalid() {
        let err = TrackerConfig::new("").validate().unwrap_err();
        assert!(matches!(err, ConfigError::AppToken(_)));
    }

    #[test]
    fn zero_capacity_is_invalid() {
        let err = TrackerConfig::new("abc")
            .with_queue_capacity(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn inverted_session_window_is_invalid() {
        let config = TrackerConfig::new("abc")
            .with_session_window(Duration::from_secs(1), Duration::from_secs(10));
        assert!(config.validate().is_err());
    }

    #[test]
    fn builder_methods_apply() {
        let config = TrackerConfig::new("abc")
            .with_backoff(Duration::from_millis(5), Duration::from_millis(50))
            .with_request_timeout(Duration::from_millis(250))
            .with_timer_interval(Duration::from_millis(20));

        assert_eq!(config.backoff().ceiling(2), Duration::from_millis(10));
        assert_eq!(config.request_timeout(), Duration::from_millis(250));
        assert_eq!(config.timer_interval(), Duration::from_millis(20));
    }
}
