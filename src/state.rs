use anyhow::Context;
use std::{str::FromStr, sync::Arc, time::Duration};

use crate::{notification::NotificationService, websocket::NotificationHub};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub notification_service: NotificationService,
    pub hub: NotificationHub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackend {
    Postgres,
    Memory,
}

impl FromStr for QueueBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" => Ok(QueueBackend::Postgres),
            "memory" => Ok(QueueBackend::Memory),
            other => anyhow::bail!("unknown QUEUE_BACKEND '{}'", other),
        }
    }
}

/// Tuning for the deadline watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub interval: Duration,
    pub lookahead_horizon: chrono::Duration,
    pub suppression_window: chrono::Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            lookahead_horizon: chrono::Duration::minutes(60),
            suppression_window: chrono::Duration::minutes(60),
        }
    }
}

/// Tuning for the queue consumer.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub max_messages: usize,
    pub wait: Duration,
    pub error_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_messages: 1,
            wait: Duration::from_secs(20),
            error_backoff: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub redis_url: Option<String>,
    pub queue_backend: QueueBackend,
    pub queue_visibility_timeout: Duration,
    pub hub_write_timeout: Duration,
    pub notification_channel: String,
    pub host: String,
    pub port: u16,
    pub watcher: WatcherConfig,
    pub worker: WorkerConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let watcher = WatcherConfig {
            interval: parse_period("WATCHER_INTERVAL_SECS", 60)?,
            lookahead_horizon: parse_window("LOOKAHEAD_HORIZON_MINUTES", 60)?,
            suppression_window: parse_window("SUPPRESSION_WINDOW_MINUTES", 60)?,
        };

        let max_messages: usize = parse_var("QUEUE_MAX_MESSAGES", 1)?;
        if max_messages == 0 {
            anyhow::bail!("QUEUE_MAX_MESSAGES must be at least 1");
        }

        let worker = WorkerConfig {
            max_messages,
            wait: parse_period("QUEUE_WAIT_SECS", 20)?,
            error_backoff: parse_period("WORKER_BACKOFF_SECS", 5)?,
        };

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            jwt_secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            redis_url: std::env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            queue_backend: parse_var("QUEUE_BACKEND", QueueBackend::Postgres)?,
            queue_visibility_timeout: parse_period("QUEUE_VISIBILITY_TIMEOUT_SECS", 30)?,
            hub_write_timeout: parse_period("HUB_WRITE_TIMEOUT_SECS", 5)?,
            notification_channel: std::env::var("NOTIFICATION_CHANNEL")
                .unwrap_or_else(|_| "notifications".to_string()),
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_var("PORT", 3000)?,
            watcher,
            worker,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

const MAX_PERIOD_SECS: u64 = 7 * 24 * 60 * 60;
const MAX_WINDOW_MINUTES: i64 = 366 * 24 * 60;

/// A timer or timeout in whole seconds, between one second and one week.
fn parse_period(name: &str, default_secs: u64) -> anyhow::Result<Duration> {
    let secs: u64 = parse_var(name, default_secs)?;
    if !(1..=MAX_PERIOD_SECS).contains(&secs) {
        anyhow::bail!("{} must be between 1 and {} seconds", name, MAX_PERIOD_SECS);
    }
    Ok(Duration::from_secs(secs))
}

/// A lookahead or suppression window in whole minutes, at most a year.
fn parse_window(name: &str, default_minutes: i64) -> anyhow::Result<chrono::Duration> {
    let minutes: i64 = parse_var(name, default_minutes)?;
    if !(1..=MAX_WINDOW_MINUTES).contains(&minutes) {
        anyhow::bail!("{} must be between 1 and {} minutes", name, MAX_WINDOW_MINUTES);
    }
    chrono::Duration::try_minutes(minutes).with_context(|| format!("{} is out of range", name))
}

#[cfg(test)]
impl Config {
    pub(crate) fn for_tests(jwt_secret: &str) -> Self {
        Self {
            database_url: "postgres://localhost/unused".to_string(),
            jwt_secret: jwt_secret.to_string(),
            redis_url: None,
            queue_backend: QueueBackend::Memory,
            queue_visibility_timeout: Duration::from_secs(30),
            hub_write_timeout: Duration::from_secs(5),
            notification_channel: "notifications".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            watcher: WatcherConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{} must be valid: {}", name, e)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_backend_parse() {
        assert_eq!("postgres".parse::<QueueBackend>().unwrap(), QueueBackend::Postgres);
        assert_eq!("MEMORY".parse::<QueueBackend>().unwrap(), QueueBackend::Memory);
        assert!("sqs".parse::<QueueBackend>().is_err());
    }

    #[test]
    fn test_parse_var_default_and_error() {
        assert_eq!(parse_var("DEADLINE_NOTIFIER_TEST_UNSET", 42u64).unwrap(), 42);

        std::env::set_var("DEADLINE_NOTIFIER_TEST_BAD", "soon");
        assert!(parse_var::<u64>("DEADLINE_NOTIFIER_TEST_BAD", 1).is_err());
        std::env::remove_var("DEADLINE_NOTIFIER_TEST_BAD");
    }

    #[test]
    fn test_periods_reject_zero_and_huge_values() {
        std::env::set_var("DEADLINE_NOTIFIER_TEST_PERIOD_ZERO", "0");
        assert!(parse_period("DEADLINE_NOTIFIER_TEST_PERIOD_ZERO", 60).is_err());

        std::env::set_var("DEADLINE_NOTIFIER_TEST_PERIOD_HUGE", u64::MAX.to_string());
        assert!(parse_period("DEADLINE_NOTIFIER_TEST_PERIOD_HUGE", 60).is_err());

        std::env::set_var("DEADLINE_NOTIFIER_TEST_PERIOD_OK", "15");
        assert_eq!(
            parse_period("DEADLINE_NOTIFIER_TEST_PERIOD_OK", 60).unwrap(),
            Duration::from_secs(15)
        );
        assert_eq!(
            parse_period("DEADLINE_NOTIFIER_TEST_PERIOD_UNSET", 60).unwrap(),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_windows_reject_non_positive_and_overflowing_values() {
        for (name, raw) in [
            ("DEADLINE_NOTIFIER_TEST_WINDOW_ZERO", "0".to_string()),
            ("DEADLINE_NOTIFIER_TEST_WINDOW_NEGATIVE", "-30".to_string()),
            ("DEADLINE_NOTIFIER_TEST_WINDOW_HUGE", i64::MAX.to_string()),
        ] {
            std::env::set_var(name, raw);
            assert!(parse_window(name, 60).is_err(), "{} should be rejected", name);
        }

        std::env::set_var("DEADLINE_NOTIFIER_TEST_WINDOW_OK", "90");
        assert_eq!(
            parse_window("DEADLINE_NOTIFIER_TEST_WINDOW_OK", 60).unwrap(),
            chrono::Duration::minutes(90)
        );
    }

    #[test]
    fn test_watcher_defaults() {
        let config = WatcherConfig::default();
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.lookahead_horizon, chrono::Duration::minutes(60));
        assert_eq!(config.suppression_window, chrono::Duration::minutes(60));
    }
}
