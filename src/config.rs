use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::ExponentialBackoff;
use uuid::Uuid;

use crate::models::{BrokerEndpoint, NetworkCredentials};

/// Backoff delays never grow beyond this, matching the session retry cap.
const MAX_BACKOFF_MS: u64 = 60_000;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub wifi_ssid: String,
    pub wifi_password: String,
    pub wifi_probe_addr: String,
    pub wifi_poll_interval_ms: u64,
    pub wifi_max_attempts: u32,

    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_client_id: String,
    pub mqtt_max_retries: i32,
    pub mqtt_retry_interval_ms: u64,

    pub publish_interval_ms: u64,
    pub telemetry_topic: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable {0} is missing or invalid.")]
    MissingOrInvalid(String),
    #[error("Parsing error: {0}")]
    ParsingError(String),
}

/// One retry shape for both reconnect procedures: a bounded (or unbounded)
/// number of attempts with doubling delays capped at `max_interval_ms`.
/// The link procedure pins the cap to the initial interval, which keeps its
/// polls at a fixed cadence.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: Option<u32>,
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
}

impl RetryPolicy {
    pub fn delays(&self) -> Box<dyn Iterator<Item = Duration> + Send> {
        let backoff = ExponentialBackoff::from_millis(2)
            .factor(self.initial_interval_ms / 2)
            .max_delay(Duration::from_millis(self.max_interval_ms));
        match self.max_attempts {
            Some(attempts) => Box::new(backoff.take(attempts as usize)),
            None => Box::new(backoff),
        }
    }
}

impl Config {
    /// Validate timeout values and other critical configurations.
    fn validate_timeouts(&self) -> Result<(), ConfigError> {
        const MIN_TIMEOUT: u64 = 100;
        const MAX_TIMEOUT: u64 = 1_000_000;

        for (name, value) in [
            ("WIFI_POLL_INTERVAL_MS", self.wifi_poll_interval_ms),
            ("MQTT_RETRY_INTERVAL_MS", self.mqtt_retry_interval_ms),
            ("PUBLISH_INTERVAL_MS", self.publish_interval_ms),
        ] {
            if !(MIN_TIMEOUT..=MAX_TIMEOUT).contains(&value) {
                return Err(ConfigError::ParsingError(format!(
                    "{} must be between {} and {} ms",
                    name, MIN_TIMEOUT, MAX_TIMEOUT
                )));
            }
        }

        Ok(())
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok(); // Load environment variables from .env file

        // Helper to prepend root topic if available
        let prepend_root_topic = |root: &str, topic: &str| {
            if !root.is_empty() {
                format!("{}/{}", root.trim_end_matches('/'), topic.trim_start_matches('/'))
            } else {
                topic.to_string()
            }
        };

        let mqtt_root_topic = env::var("MQTT_ROOT_TOPIC").unwrap_or_default();

        let mqtt_host = env::var("MQTT_HOST")
            .map_err(|_| ConfigError::MissingOrInvalid("MQTT_HOST".to_string()))?;
        let mqtt_port = env::var("MQTT_PORT")
            .unwrap_or_else(|_| "1883".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::ParsingError("MQTT_PORT must be a valid number".to_string()))?;

        let config = Self {
            // Network configuration
            wifi_ssid: env::var("WIFI_SSID").unwrap_or_default(), // Default to empty
            wifi_password: env::var("WIFI_PASSWORD").unwrap_or_default(), // Default to empty
            wifi_probe_addr: env::var("WIFI_PROBE_ADDR")
                .unwrap_or_else(|_| format!("{}:{}", mqtt_host, mqtt_port)),
            wifi_poll_interval_ms: env::var("WIFI_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse::<u64>()
                .map_err(|_| {
                    ConfigError::ParsingError("WIFI_POLL_INTERVAL_MS must be a valid number".to_string())
                })?,
            wifi_max_attempts: env::var("WIFI_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "20".to_string())
                .parse::<u32>()
                .map_err(|_| {
                    ConfigError::ParsingError("WIFI_MAX_ATTEMPTS must be a valid number".to_string())
                })?,

            // MQTT configuration
            mqtt_host,
            mqtt_port,
            mqtt_client_id: env::var("MQTT_CLIENT_ID")
                .unwrap_or_else(|_| format!("sensorflux_{}", Uuid::new_v4())),
            mqtt_max_retries: env::var("MQTT_MAX_RETRIES")
                .unwrap_or_else(|_| "5".to_string())
                .parse::<i32>()
                .map_err(|_| ConfigError::ParsingError("MQTT_MAX_RETRIES must be an integer".to_string()))?,
            mqtt_retry_interval_ms: env::var("MQTT_RETRY_INTERVAL_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse::<u64>()
                .map_err(|_| {
                    ConfigError::ParsingError("MQTT_RETRY_INTERVAL_MS must be a valid number".to_string())
                })?,

            // Telemetry configuration
            publish_interval_ms: env::var("PUBLISH_INTERVAL_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse::<u64>()
                .map_err(|_| {
                    ConfigError::ParsingError("PUBLISH_INTERVAL_MS must be a valid number".to_string())
                })?,
            telemetry_topic: prepend_root_topic(&mqtt_root_topic, "sensor/temperature"),
        };

        // Validate timeouts after constructing the configuration
        config.validate_timeouts()?;

        Ok(config)
    }

    pub fn credentials(&self) -> NetworkCredentials {
        NetworkCredentials {
            network_name: self.wifi_ssid.clone(),
            shared_secret: self.wifi_password.clone(),
        }
    }

    pub fn broker_endpoint(&self) -> BrokerEndpoint {
        BrokerEndpoint {
            host: self.mqtt_host.clone(),
            port: self.mqtt_port,
        }
    }

    /// The link waits at a fixed cadence for a bounded number of polls.
    pub fn wifi_retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: Some(self.wifi_max_attempts),
            initial_interval_ms: self.wifi_poll_interval_ms,
            max_interval_ms: self.wifi_poll_interval_ms,
        }
    }

    /// The session backs off with doubling delays; a negative retry count
    /// means unbounded attempts, which blocks the cycle until connected.
    pub fn mqtt_retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: if self.mqtt_max_retries >= 0 {
                Some(self.mqtt_max_retries as u32)
            } else {
                None
            },
            initial_interval_ms: self.mqtt_retry_interval_ms,
            max_interval_ms: MAX_BACKOFF_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_cadence_policy_repeats_the_interval() {
        let policy = RetryPolicy {
            max_attempts: Some(4),
            initial_interval_ms: 500,
            max_interval_ms: 500,
        };
        let delays: Vec<_> = policy.delays().collect();
        assert_eq!(delays, vec![Duration::from_millis(500); 4]);
    }

    #[test]
    fn backoff_policy_doubles_until_the_cap() {
        let policy = RetryPolicy {
            max_attempts: Some(6),
            initial_interval_ms: 5_000,
            max_interval_ms: 60_000,
        };
        let delays: Vec<_> = policy.delays().map(|d| d.as_millis() as u64).collect();
        assert_eq!(delays, vec![5_000, 10_000, 20_000, 40_000, 60_000, 60_000]);
    }

    #[test]
    fn unbounded_policy_keeps_yielding_delays() {
        let policy = RetryPolicy {
            max_attempts: None,
            initial_interval_ms: 5_000,
            max_interval_ms: 60_000,
        };
        assert_eq!(policy.delays().take(100).count(), 100);
    }

    #[test]
    fn from_env_applies_defaults_and_validates() {
        // One test mutates the process environment to avoid races between
        // parallel test threads.
        env::set_var("MQTT_HOST", "192.168.73.79");
        env::remove_var("MQTT_PORT");
        env::remove_var("MQTT_ROOT_TOPIC");
        env::remove_var("WIFI_PROBE_ADDR");
        env::remove_var("PUBLISH_INTERVAL_MS");

        let config = Config::from_env().unwrap();
        assert_eq!(config.mqtt_port, 1883);
        assert_eq!(config.telemetry_topic, "sensor/temperature");
        assert_eq!(config.wifi_probe_addr, "192.168.73.79:1883");
        assert_eq!(config.wifi_max_attempts, 20);
        assert_eq!(config.publish_interval_ms, 5_000);
        assert!(config.mqtt_client_id.starts_with("sensorflux_"));

        env::set_var("MQTT_ROOT_TOPIC", "lab/");
        let config = Config::from_env().unwrap();
        assert_eq!(config.telemetry_topic, "lab/sensor/temperature");
        env::remove_var("MQTT_ROOT_TOPIC");

        env::set_var("PUBLISH_INTERVAL_MS", "10");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::ParsingError(_))
        ));
        env::remove_var("PUBLISH_INTERVAL_MS");

        env::remove_var("MQTT_HOST");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::MissingOrInvalid(_))
        ));
    }
}
