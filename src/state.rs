use anyhow::Context;
use std::{str::FromStr, sync::Arc, time::Duration};

use crate::notification::Registry;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Registry,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let registry = Registry::new(config.viewed_retention);
        Self {
            config: Arc::new(config),
            registry,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub sweep_interval: Duration,
    pub notification_max_age: Duration,
    pub viewed_retention: Duration,
    pub ws_send_timeout: Duration,
    pub ws_queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            sweep_interval: Duration::from_secs(120),
            notification_max_age: Duration::from_secs(600),
            viewed_retention: Duration::from_secs(5),
            ws_send_timeout: Duration::from_secs(10),
            ws_queue_capacity: 64,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_or("PORT", defaults.port)?,
            sweep_interval: secs_or("SWEEP_INTERVAL_SECS", defaults.sweep_interval)?,
            notification_max_age: secs_or(
                "NOTIFICATION_MAX_AGE_SECS",
                defaults.notification_max_age,
            )?,
            viewed_retention: secs_or("VIEWED_RETENTION_SECS", defaults.viewed_retention)?,
            ws_send_timeout: secs_or("WS_SEND_TIMEOUT_SECS", defaults.ws_send_timeout)?,
            ws_queue_capacity: env_or("WS_QUEUE_CAPACITY", defaults.ws_queue_capacity)?,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number, got {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

fn secs_or(key: &str, default: Duration) -> anyhow::Result<Duration> {
    env_or(key, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.addr(), "127.0.0.1:8000");
        assert_eq!(config.sweep_interval, Duration::from_secs(120));
        assert_eq!(config.notification_max_age, Duration::from_secs(600));
    }

    #[test]
    fn test_env_or_reads_and_rejects() {
        std::env::set_var("RELAY_TEST_QUEUE", "16");
        assert_eq!(env_or("RELAY_TEST_QUEUE", 64usize).unwrap(), 16);

        std::env::set_var("RELAY_TEST_QUEUE_BAD", "lots");
        let err = env_or("RELAY_TEST_QUEUE_BAD", 64usize).unwrap_err();
        assert!(err.to_string().contains("RELAY_TEST_QUEUE_BAD"));

        assert_eq!(env_or("RELAY_TEST_QUEUE_UNSET", 64usize).unwrap(), 64);
    }

    #[test]
    fn test_secs_or_default() {
        assert_eq!(
            secs_or("RELAY_TEST_INTERVAL_UNSET", Duration::from_secs(120)).unwrap(),
            Duration::from_secs(120)
        );
    }
}
