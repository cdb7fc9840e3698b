//! Scheduler configuration.
//!
//! Configuration is loaded from environment variables. The database URL and
//! the chat service token are redacted in Debug output.

use crate::services::conflict::ConflictPolicy;
use crate::services::lifecycle::{LifecyclePolicy, DEFAULT_MAX_MEETING_DURATION_MINUTES};
use crate::services::slots::{
    SlotPolicy, DEFAULT_DAY_END_HOUR, DEFAULT_DAY_START_HOUR, DEFAULT_GRANULARITY_MINUTES,
};
use crate::tasks::start_notifier::{
    StartNotifierConfig, DEFAULT_TICK_INTERVAL_SECONDS, DEFAULT_WINDOW_SECONDS, MAX_WINDOW_SECONDS,
};
use secrecy::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use thiserror::Error;

/// Default chat service base URL.
pub const DEFAULT_CHAT_SERVICE_URL: &str = "http://localhost:8090";

/// Default shutdown drain period in seconds.
pub const DEFAULT_DRAIN_SECONDS: u64 = 5;

/// Scheduler configuration.
#[derive(Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Seconds between start notifier ticks.
    pub notifier_tick_seconds: u64,

    /// Half-width of the start window in seconds.
    pub start_window_seconds: u64,

    /// Neighbouring-booking policy.
    pub conflict_policy: ConflictPolicy,

    /// First slot hour, conference-local.
    pub slot_day_start_hour: u32,

    /// Slot end hour (exclusive), conference-local.
    pub slot_day_end_hour: u32,

    /// Slot step in minutes.
    pub slot_granularity_minutes: u32,

    /// Longest meeting a request may ask for.
    pub max_meeting_duration_minutes: u32,

    /// Chat session service base URL.
    pub chat_service_url: String,

    /// Bearer token for the chat session service.
    pub chat_service_token: SecretString,

    /// Prometheus exporter address; no exporter when unset.
    pub metrics_bind_address: Option<SocketAddr>,

    /// Seconds to wait for background tasks on shutdown.
    pub drain_seconds: u64,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("notifier_tick_seconds", &self.notifier_tick_seconds)
            .field("start_window_seconds", &self.start_window_seconds)
            .field("conflict_policy", &self.conflict_policy)
            .field("slot_day_start_hour", &self.slot_day_start_hour)
            .field("slot_day_end_hour", &self.slot_day_end_hour)
            .field("slot_granularity_minutes", &self.slot_granularity_minutes)
            .field(
                "max_meeting_duration_minutes",
                &self.max_meeting_duration_minutes,
            )
            .field("chat_service_url", &self.chat_service_url)
            .field("chat_service_token", &"[REDACTED]")
            .field("metrics_bind_address", &self.metrics_bind_address)
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid notifier configuration: {0}")]
    InvalidNotifier(String),

    #[error("Invalid conflict policy: {0}")]
    InvalidConflictPolicy(String),

    #[error("Invalid slot configuration: {0}")]
    InvalidSlots(String),

    #[error("Invalid meeting duration limit: {0}")]
    InvalidDurationLimit(String),

    #[error("Invalid metrics bind address: {0}")]
    InvalidMetricsAddress(String),

    #[error("Invalid drain period: {0}")]
    InvalidDrain(String),
}

/// Parse `name` as `T`, falling back to `default` when unset.
fn parse_var<T>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
    err: fn(String) -> ConfigError,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match vars.get(name) {
        Some(value_str) => value_str.trim().parse().map_err(|e| {
            err(format!(
                "{} must be a valid non-negative integer, got '{}': {}",
                name, value_str, e
            ))
        }),
        None => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = vars
            .get("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?
            .clone();

        let notifier_tick_seconds = parse_var(
            vars,
            "NOTIFIER_TICK_SECONDS",
            DEFAULT_TICK_INTERVAL_SECONDS,
            ConfigError::InvalidNotifier,
        )?;
        if notifier_tick_seconds == 0 {
            return Err(ConfigError::InvalidNotifier(
                "NOTIFIER_TICK_SECONDS must be greater than 0".to_string(),
            ));
        }

        let start_window_seconds = parse_var(
            vars,
            "START_WINDOW_SECONDS",
            DEFAULT_WINDOW_SECONDS,
            ConfigError::InvalidNotifier,
        )?;
        if start_window_seconds == 0 {
            return Err(ConfigError::InvalidNotifier(
                "START_WINDOW_SECONDS must be greater than 0".to_string(),
            ));
        }
        if start_window_seconds > MAX_WINDOW_SECONDS {
            return Err(ConfigError::InvalidNotifier(format!(
                "START_WINDOW_SECONDS must not exceed {}, got {}",
                MAX_WINDOW_SECONDS, start_window_seconds
            )));
        }

        let conflict_policy = match vars.get("CONFLICT_POLICY") {
            Some(value) => value
                .parse::<ConflictPolicy>()
                .map_err(|e| ConfigError::InvalidConflictPolicy(format!("CONFLICT_POLICY {}", e)))?,
            None => ConflictPolicy::default(),
        };

        let slot_day_start_hour = parse_var(
            vars,
            "SLOT_DAY_START_HOUR",
            DEFAULT_DAY_START_HOUR,
            ConfigError::InvalidSlots,
        )?;
        let slot_day_end_hour = parse_var(
            vars,
            "SLOT_DAY_END_HOUR",
            DEFAULT_DAY_END_HOUR,
            ConfigError::InvalidSlots,
        )?;
        if slot_day_start_hour > 23 {
            return Err(ConfigError::InvalidSlots(format!(
                "SLOT_DAY_START_HOUR must be between 0 and 23, got {}",
                slot_day_start_hour
            )));
        }
        if !(1..=24).contains(&slot_day_end_hour) {
            return Err(ConfigError::InvalidSlots(format!(
                "SLOT_DAY_END_HOUR must be between 1 and 24, got {}",
                slot_day_end_hour
            )));
        }
        if slot_day_start_hour >= slot_day_end_hour {
            return Err(ConfigError::InvalidSlots(format!(
                "SLOT_DAY_START_HOUR ({}) must be before SLOT_DAY_END_HOUR ({})",
                slot_day_start_hour, slot_day_end_hour
            )));
        }

        let slot_granularity_minutes = parse_var(
            vars,
            "SLOT_GRANULARITY_MINUTES",
            DEFAULT_GRANULARITY_MINUTES,
            ConfigError::InvalidSlots,
        )?;
        if !(1..=1440).contains(&slot_granularity_minutes) {
            return Err(ConfigError::InvalidSlots(format!(
                "SLOT_GRANULARITY_MINUTES must be between 1 and 1440, got {}",
                slot_granularity_minutes
            )));
        }

        let max_meeting_duration_minutes = parse_var(
            vars,
            "MAX_MEETING_DURATION_MINUTES",
            DEFAULT_MAX_MEETING_DURATION_MINUTES,
            ConfigError::InvalidDurationLimit,
        )?;
        if max_meeting_duration_minutes == 0 {
            return Err(ConfigError::InvalidDurationLimit(
                "MAX_MEETING_DURATION_MINUTES must be greater than 0".to_string(),
            ));
        }

        let chat_service_url = vars
            .get("CHAT_SERVICE_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_CHAT_SERVICE_URL.to_string());

        let chat_service_token =
            SecretString::from(vars.get("CHAT_SERVICE_TOKEN").cloned().unwrap_or_default());

        let metrics_bind_address = match vars.get("METRICS_BIND_ADDRESS") {
            Some(value) if !value.trim().is_empty() => {
                Some(value.trim().parse::<SocketAddr>().map_err(|e| {
                    ConfigError::InvalidMetricsAddress(format!(
                        "METRICS_BIND_ADDRESS must be a socket address, got '{}': {}",
                        value, e
                    ))
                })?)
            }
            _ => None,
        };

        let drain_seconds = parse_var(
            vars,
            "SCHEDULER_DRAIN_SECONDS",
            DEFAULT_DRAIN_SECONDS,
            ConfigError::InvalidDrain,
        )?;

        Ok(Config {
            database_url,
            notifier_tick_seconds,
            start_window_seconds,
            conflict_policy,
            slot_day_start_hour,
            slot_day_end_hour,
            slot_granularity_minutes,
            max_meeting_duration_minutes,
            chat_service_url,
            chat_service_token,
            metrics_bind_address,
            drain_seconds,
        })
    }

    /// Slot generator settings.
    pub fn slot_policy(&self) -> SlotPolicy {
        SlotPolicy {
            day_start_hour: self.slot_day_start_hour,
            day_end_hour: self.slot_day_end_hour,
            granularity_minutes: self.slot_granularity_minutes,
        }
    }

    /// Lifecycle service settings.
    pub fn lifecycle_policy(&self) -> LifecyclePolicy {
        LifecyclePolicy {
            conflict_policy: self.conflict_policy,
            max_duration_minutes: self.max_meeting_duration_minutes,
            slot_policy: self.slot_policy(),
        }
    }

    /// Start notifier settings.
    pub fn start_notifier(&self) -> StartNotifierConfig {
        StartNotifierConfig {
            tick_interval_seconds: self.notifier_tick_seconds,
            window_seconds: self.start_window_seconds,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([(
            "DATABASE_URL".to_string(),
            "postgresql://localhost/scheduler_test".to_string(),
        )])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.database_url, "postgresql://localhost/scheduler_test");
        assert_eq!(config.notifier_tick_seconds, 60);
        assert_eq!(config.start_window_seconds, 60);
        assert_eq!(config.conflict_policy, ConflictPolicy::Padded);
        assert_eq!(config.slot_policy(), SlotPolicy::default());
        assert_eq!(config.lifecycle_policy(), LifecyclePolicy::default());
        assert_eq!(config.start_notifier(), StartNotifierConfig::default());
        assert_eq!(config.chat_service_url, DEFAULT_CHAT_SERVICE_URL);
        assert!(config.chat_service_token.expose_secret().is_empty());
        assert!(config.metrics_bind_address.is_none());
        assert_eq!(config.drain_seconds, DEFAULT_DRAIN_SECONDS);
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("NOTIFIER_TICK_SECONDS".to_string(), "15".to_string());
        vars.insert("START_WINDOW_SECONDS".to_string(), "90".to_string());
        vars.insert("CONFLICT_POLICY".to_string(), "Strict".to_string());
        vars.insert("SLOT_DAY_START_HOUR".to_string(), "8".to_string());
        vars.insert("SLOT_DAY_END_HOUR".to_string(), "24".to_string());
        vars.insert("SLOT_GRANULARITY_MINUTES".to_string(), "15".to_string());
        vars.insert("MAX_MEETING_DURATION_MINUTES".to_string(), "60".to_string());
        vars.insert(
            "CHAT_SERVICE_URL".to_string(),
            "https://chat.internal".to_string(),
        );
        vars.insert("CHAT_SERVICE_TOKEN".to_string(), "tok".to_string());
        vars.insert(
            "METRICS_BIND_ADDRESS".to_string(),
            "127.0.0.1:9100".to_string(),
        );
        vars.insert("SCHEDULER_DRAIN_SECONDS".to_string(), "0".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(
            config.start_notifier(),
            StartNotifierConfig {
                tick_interval_seconds: 15,
                window_seconds: 90,
            }
        );
        let policy = config.lifecycle_policy();
        assert_eq!(policy.conflict_policy, ConflictPolicy::Strict);
        assert_eq!(policy.max_duration_minutes, 60);
        assert_eq!(
            policy.slot_policy,
            SlotPolicy {
                day_start_hour: 8,
                day_end_hour: 24,
                granularity_minutes: 15,
            }
        );
        assert_eq!(config.chat_service_url, "https://chat.internal");
        assert_eq!(config.chat_service_token.expose_secret(), "tok");
        assert_eq!(
            config.metrics_bind_address,
            Some("127.0.0.1:9100".parse().unwrap())
        );
        assert_eq!(config.drain_seconds, 0);
    }

    #[test]
    fn test_from_vars_missing_database_url() {
        let result = Config::from_vars(&HashMap::new());
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "DATABASE_URL"));
    }

    #[test]
    fn test_notifier_tick_rejects_zero() {
        let mut vars = base_vars();
        vars.insert("NOTIFIER_TICK_SECONDS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidNotifier(msg)) if msg.contains("must be greater than 0"))
        );
    }

    #[test]
    fn test_start_window_rejects_non_numeric() {
        let mut vars = base_vars();
        vars.insert("START_WINDOW_SECONDS".to_string(), "a minute".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidNotifier(msg)) if msg.contains("START_WINDOW_SECONDS"))
        );
    }

    #[test]
    fn test_start_window_rejects_too_large() {
        let mut vars = base_vars();
        vars.insert("START_WINDOW_SECONDS".to_string(), "3601".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidNotifier(msg)) if msg.contains("must not exceed 3600"))
        );
    }

    #[test]
    fn test_conflict_policy_rejects_unknown() {
        let mut vars = base_vars();
        vars.insert("CONFLICT_POLICY".to_string(), "lenient".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidConflictPolicy(msg)) if msg.contains("lenient"))
        );
    }

    #[test]
    fn test_slot_hours_must_be_ordered() {
        let mut vars = base_vars();
        vars.insert("SLOT_DAY_START_HOUR".to_string(), "18".to_string());
        vars.insert("SLOT_DAY_END_HOUR".to_string(), "9".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidSlots(msg)) if msg.contains("must be before")));
    }

    #[test]
    fn test_slot_end_hour_rejects_out_of_range() {
        let mut vars = base_vars();
        vars.insert("SLOT_DAY_END_HOUR".to_string(), "25".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidSlots(msg)) if msg.contains("between 1 and 24"))
        );
    }

    #[test]
    fn test_slot_granularity_rejects_zero() {
        let mut vars = base_vars();
        vars.insert("SLOT_GRANULARITY_MINUTES".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidSlots(_))));
    }

    #[test]
    fn test_max_duration_rejects_negative() {
        let mut vars = base_vars();
        vars.insert("MAX_MEETING_DURATION_MINUTES".to_string(), "-30".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidDurationLimit(_))));
    }

    #[test]
    fn test_metrics_address_rejects_garbage() {
        let mut vars = base_vars();
        vars.insert("METRICS_BIND_ADDRESS".to_string(), "localhost".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidMetricsAddress(_))));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut vars = base_vars();
        vars.insert("CHAT_SERVICE_TOKEN".to_string(), "super-secret".to_string());
        let config = Config::from_vars(&vars).expect("Config should load successfully");

        let debug_output = format!("{:?}", config);

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("postgresql://"));
        assert!(!debug_output.contains("scheduler_test"));
        assert!(!debug_output.contains("super-secret"));
    }
}
