//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use inventory::ReservationConfig;
use saga::{DispatcherConfig, RetryConfig};

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Service configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `text` or `json` (default: `text`)
/// - `DATABASE_URL` — PostgreSQL connection string; in-memory adapters when unset
/// - `CONSUMER_WORKERS` — saga worker tasks (default: `4`)
/// - `RESERVATION_TTL_SECS` — reservation lifetime (default: `900`)
/// - `EXPIRY_SWEEP_INTERVAL_SECS` — expiry sweep period (default: `60`)
/// - `RETRY_MAX_ATTEMPTS` — attempts for transient failures (default: `3`)
/// - `RETRY_BASE_DELAY_MS` — linear backoff step (default: `100`)
///
/// Unparseable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub consumer_workers: usize,
    pub reservation_ttl_secs: u32,
    pub expiry_sweep_interval_secs: u64,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref().map(str::trim) {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => defaults.log_format,
            },
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            consumer_workers: parse(&lookup, "CONSUMER_WORKERS")
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.consumer_workers),
            reservation_ttl_secs: parse(&lookup, "RESERVATION_TTL_SECS")
                .unwrap_or(defaults.reservation_ttl_secs),
            expiry_sweep_interval_secs: parse(&lookup, "EXPIRY_SWEEP_INTERVAL_SECS")
                .filter(|&s: &u64| s > 0)
                .unwrap_or(defaults.expiry_sweep_interval_secs),
            retry_max_attempts: parse(&lookup, "RETRY_MAX_ATTEMPTS")
                .filter(|&n: &u32| n > 0)
                .unwrap_or(defaults.retry_max_attempts),
            retry_base_delay_ms: parse(&lookup, "RETRY_BASE_DELAY_MS")
                .unwrap_or(defaults.retry_base_delay_ms),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry_max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }

    pub fn dispatcher(&self) -> DispatcherConfig {
        DispatcherConfig {
            workers: self.consumer_workers,
            retry: self.retry(),
            ..DispatcherConfig::default()
        }
    }

    pub fn reservations(&self) -> ReservationConfig {
        ReservationConfig {
            reservation_ttl: chrono::Duration::seconds(i64::from(self.reservation_ttl_secs)),
        }
    }

    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_interval_secs)
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            consumer_workers: 4,
            reservation_ttl_secs: 900,
            expiry_sweep_interval_secs: 60,
            retry_max_attempts: 3,
            retry_base_delay_ms: 100,
        }
    }
}
