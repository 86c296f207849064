//! Feed Configuration Settings
//!
//! Configuration types for the quote feed bridge, loaded from environment
//! variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::application::retry::RetryConfig;
use crate::infrastructure::driver::PollSettings;

/// Which batch source adapter to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    /// Poll an HTTP endpoint for tick batches.
    #[default]
    Http,
    /// Replay a recorded fixture file.
    Fixture,
}

impl SourceKind {
    /// Parse source kind from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "fixture" => Self::Fixture,
            _ => Self::Http,
        }
    }

    /// Get the source kind name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Fixture => "fixture",
        }
    }
}

/// Batch source settings.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// Which adapter to construct.
    pub kind: SourceKind,
    /// Endpoint for the HTTP source.
    pub http_endpoint: String,
    /// Per-request timeout for the HTTP source.
    pub http_request_timeout: Duration,
    /// Fixture file for the replay source.
    pub fixture_path: Option<PathBuf>,
    /// Ticks per replayed batch.
    pub fixture_chunk_size: usize,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            kind: SourceKind::Http,
            http_endpoint: "http://localhost:8080/query?id=1".to_string(),
            http_request_timeout: Duration::from_secs(2),
            fixture_path: None,
            fixture_chunk_size: 25,
        }
    }
}

/// Polling cadence settings.
#[derive(Debug, Clone)]
pub struct PollingSettings {
    /// Interval between fetch attempts.
    pub interval: Duration,
    /// Upper bound on a single fetch.
    pub fetch_timeout: Duration,
    /// Capacity of the driver-to-merge batch channel.
    pub batch_channel_capacity: usize,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            fetch_timeout: Duration::from_secs(2),
            batch_channel_capacity: 256,
        }
    }
}

impl PollingSettings {
    /// Driver settings derived from this configuration.
    #[must_use]
    pub const fn to_poll_settings(&self) -> PollSettings {
        PollSettings::new(self.interval, self.fetch_timeout)
    }
}

/// Sink apply retry settings.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Backoff multiplier between attempts.
    pub multiplier: f64,
    /// Maximum retries per batch (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            max_attempts: 3,
        }
    }
}

impl RetrySettings {
    /// Retry policy configuration derived from these settings.
    #[must_use]
    pub const fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::new(
            self.initial_delay,
            self.max_delay,
            self.multiplier,
            0.1, // Default jitter
            self.max_attempts,
        )
    }
}

/// Complete feed configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Batch source settings.
    pub source: SourceSettings,
    /// Polling cadence settings.
    pub polling: PollingSettings,
    /// Sink apply retry settings.
    pub retry: RetrySettings,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            source: SourceSettings::default(),
            polling: PollingSettings::default(),
            retry: RetrySettings::default(),
            metrics_port: 9090,
        }
    }
}

impl FeedConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error when the fixture source is selected without a
    /// fixture path, or when a required value is empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let kind = std::env::var("QUOTE_FEED_SOURCE")
            .map(|s| SourceKind::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let http_endpoint = std::env::var("QUOTE_FEED_SOURCE_URL")
            .unwrap_or_else(|_| SourceSettings::default().http_endpoint);
        if kind == SourceKind::Http && http_endpoint.is_empty() {
            return Err(ConfigError::EmptyValue("QUOTE_FEED_SOURCE_URL".to_string()));
        }

        let fixture_path = std::env::var("QUOTE_FEED_FIXTURE_PATH")
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        if kind == SourceKind::Fixture && fixture_path.is_none() {
            return Err(ConfigError::MissingEnvVar(
                "QUOTE_FEED_FIXTURE_PATH".to_string(),
            ));
        }

        let source = SourceSettings {
            kind,
            http_endpoint,
            http_request_timeout: parse_env_duration_millis(
                "QUOTE_FEED_HTTP_TIMEOUT_MS",
                SourceSettings::default().http_request_timeout,
            ),
            fixture_path,
            fixture_chunk_size: parse_env_usize(
                "QUOTE_FEED_FIXTURE_CHUNK",
                SourceSettings::default().fixture_chunk_size,
            ),
        };

        let polling = PollingSettings {
            interval: parse_env_duration_millis(
                "QUOTE_FEED_POLL_INTERVAL_MS",
                PollingSettings::default().interval,
            ),
            fetch_timeout: parse_env_duration_millis(
                "QUOTE_FEED_FETCH_TIMEOUT_MS",
                PollingSettings::default().fetch_timeout,
            ),
            batch_channel_capacity: parse_env_usize(
                "QUOTE_FEED_BATCH_CHANNEL_CAPACITY",
                PollingSettings::default().batch_channel_capacity,
            ),
        };

        let retry = RetrySettings {
            initial_delay: parse_env_duration_millis(
                "QUOTE_FEED_APPLY_RETRY_INITIAL_MS",
                RetrySettings::default().initial_delay,
            ),
            max_delay: parse_env_duration_millis(
                "QUOTE_FEED_APPLY_RETRY_MAX_MS",
                RetrySettings::default().max_delay,
            ),
            multiplier: parse_env_f64(
                "QUOTE_FEED_APPLY_RETRY_MULTIPLIER",
                RetrySettings::default().multiplier,
            ),
            max_attempts: parse_env_u32(
                "QUOTE_FEED_APPLY_RETRY_MAX_ATTEMPTS",
                RetrySettings::default().max_attempts,
            ),
        };

        let metrics_port = parse_env_u16("QUOTE_FEED_METRICS_PORT", 9090);

        Ok(Self {
            source,
            polling,
            retry,
            metrics_port,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
