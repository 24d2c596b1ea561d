use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::generation::GeneratorConfig;
use crate::rate_limit::RateLimitConfig;

pub const ENV_SESSION_DURATION_SECS: &str = "PITCHCOACH_SESSION_DURATION_SECS";
pub const ENV_REMOTE_TIMEOUT_MS: &str = "PITCHCOACH_REMOTE_TIMEOUT_MS";
pub const ENV_HISTORY_WINDOW: &str = "PITCHCOACH_HISTORY_WINDOW";
pub const ENV_LOW_CONFIDENCE_THRESHOLD: &str = "PITCHCOACH_LOW_CONFIDENCE_THRESHOLD";
pub const ENV_SESSION_COST: &str = "PITCHCOACH_SESSION_COST";
pub const ENV_LEDGER_TIMEOUT_MS: &str = "PITCHCOACH_LEDGER_TIMEOUT_MS";
pub const ENV_FEATURE_KEY: &str = "PITCHCOACH_FEATURE_KEY";
pub const ENV_AUTO_GRANT_TRIAL: &str = "PITCHCOACH_AUTO_GRANT_TRIAL";
pub const ENV_PENDING_UTTERANCES: &str = "PITCHCOACH_PENDING_UTTERANCES";
pub const ENV_OPEN_WITH_OBJECTION: &str = "PITCHCOACH_OPEN_WITH_OBJECTION";
pub const ENV_FALLBACK_SEED: &str = "PITCHCOACH_FALLBACK_SEED";
pub const ENV_GENERATION_URL: &str = "PITCHCOACH_GENERATION_URL";
pub const ENV_RATE_LIMIT_MAX: &str = "PITCHCOACH_RATE_LIMIT_MAX";
pub const ENV_RATE_LIMIT_WINDOW_SECS: &str = "PITCHCOACH_RATE_LIMIT_WINDOW_SECS";

pub const MAX_SESSION_DURATION: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("{key} is out of range: {reason}")]
    OutOfRange {
        key: &'static str,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub session_duration: Duration,
    pub remote_timeout: Duration,
    pub history_window: usize,
    pub low_confidence_threshold: f32,
    pub session_cost: u32,
    pub ledger_timeout: Duration,
    pub feature_key: String,
    pub auto_grant_trial: bool,
    pub pending_utterance_capacity: usize,
    pub open_with_objection: bool,
    pub fallback_seed: Option<u64>,
    pub generation_endpoint: Option<String>,
    pub rate_limit: RateLimitConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_duration: Duration::from_secs(60),
            remote_timeout: Duration::from_secs(8),
            history_window: 6,
            low_confidence_threshold: 0.5,
            session_cost: 1,
            ledger_timeout: Duration::from_secs(5),
            feature_key: "objection_practice".to_string(),
            auto_grant_trial: true,
            pending_utterance_capacity: 4,
            open_with_objection: true,
            fallback_seed: None,
            generation_endpoint: None,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl EngineConfig {
    /// 在默认值上叠加 `PITCHCOACH_*` 环境变量。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let read = |key: &'static str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(secs) = parse_opt::<u64>(ENV_SESSION_DURATION_SECS, read(ENV_SESSION_DURATION_SECS))? {
            config.session_duration = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_opt::<u64>(ENV_REMOTE_TIMEOUT_MS, read(ENV_REMOTE_TIMEOUT_MS))? {
            config.remote_timeout = Duration::from_millis(ms);
        }
        if let Some(window) = parse_opt(ENV_HISTORY_WINDOW, read(ENV_HISTORY_WINDOW))? {
            config.history_window = window;
        }
        if let Some(threshold) =
            parse_opt(ENV_LOW_CONFIDENCE_THRESHOLD, read(ENV_LOW_CONFIDENCE_THRESHOLD))?
        {
            config.low_confidence_threshold = threshold;
        }
        if let Some(cost) = parse_opt(ENV_SESSION_COST, read(ENV_SESSION_COST))? {
            config.session_cost = cost;
        }
        if let Some(ms) = parse_opt::<u64>(ENV_LEDGER_TIMEOUT_MS, read(ENV_LEDGER_TIMEOUT_MS))? {
            config.ledger_timeout = Duration::from_millis(ms);
        }
        if let Some(feature_key) = read(ENV_FEATURE_KEY) {
            config.feature_key = feature_key;
        }
        if let Some(flag) = read(ENV_AUTO_GRANT_TRIAL) {
            config.auto_grant_trial = parse_bool(ENV_AUTO_GRANT_TRIAL, &flag)?;
        }
        if let Some(capacity) = parse_opt(ENV_PENDING_UTTERANCES, read(ENV_PENDING_UTTERANCES))? {
            config.pending_utterance_capacity = capacity;
        }
        if let Some(flag) = read(ENV_OPEN_WITH_OBJECTION) {
            config.open_with_objection = parse_bool(ENV_OPEN_WITH_OBJECTION, &flag)?;
        }
        if let Some(seed) = parse_opt(ENV_FALLBACK_SEED, read(ENV_FALLBACK_SEED))? {
            config.fallback_seed = Some(seed);
        }
        if let Some(url) = read(ENV_GENERATION_URL) {
            config.generation_endpoint = Some(url);
        }
        if let Some(max) = parse_opt(ENV_RATE_LIMIT_MAX, read(ENV_RATE_LIMIT_MAX))? {
            config.rate_limit.max_requests = max;
        }
        if let Some(secs) =
            parse_opt::<u64>(ENV_RATE_LIMIT_WINDOW_SECS, read(ENV_RATE_LIMIT_WINDOW_SECS))?
        {
            config.rate_limit.window = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_duration.is_zero() {
            return Err(ConfigError::OutOfRange {
                key: ENV_SESSION_DURATION_SECS,
                reason: "session duration must be positive",
            });
        }
        if self.session_duration > MAX_SESSION_DURATION {
            return Err(ConfigError::OutOfRange {
                key: ENV_SESSION_DURATION_SECS,
                reason: "session duration must not exceed two hours",
            });
        }
        if self.remote_timeout.is_zero() {
            return Err(ConfigError::OutOfRange {
                key: ENV_REMOTE_TIMEOUT_MS,
                reason: "remote timeout must be positive",
            });
        }
        if self.ledger_timeout.is_zero() {
            return Err(ConfigError::OutOfRange {
                key: ENV_LEDGER_TIMEOUT_MS,
                reason: "ledger timeout must be positive",
            });
        }
        if self.history_window == 0 {
            return Err(ConfigError::OutOfRange {
                key: ENV_HISTORY_WINDOW,
                reason: "history window must hold at least one message",
            });
        }
        if !(0.0..=1.0).contains(&self.low_confidence_threshold) {
            return Err(ConfigError::OutOfRange {
                key: ENV_LOW_CONFIDENCE_THRESHOLD,
                reason: "threshold must be within [0, 1]",
            });
        }
        if self.rate_limit.window.is_zero() {
            return Err(ConfigError::OutOfRange {
                key: ENV_RATE_LIMIT_WINDOW_SECS,
                reason: "rate limit window must be positive",
            });
        }
        Ok(())
    }

    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            remote_timeout: self.remote_timeout,
            history_window: self.history_window,
        }
    }
}

fn parse_opt<T: FromStr>(key: &'static str, raw: Option<String>) -> Result<Option<T>, ConfigError> {
    raw.map(|value| {
        value
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { key, value })
    })
    .transpose()
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_engine_contract() {
        let config = EngineConfig::default();
        assert_eq!(config.session_duration, Duration::from_secs(60));
        assert_eq!(config.remote_timeout, Duration::from_secs(8));
        assert_eq!(config.history_window, 6);
        assert_eq!(config.session_cost, 1);
        assert!(config.auto_grant_trial);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_SESSION_DURATION_SECS, "90"),
            (ENV_REMOTE_TIMEOUT_MS, "2500"),
            (ENV_AUTO_GRANT_TRIAL, "no"),
            (ENV_FALLBACK_SEED, "42"),
            (ENV_GENERATION_URL, " http://localhost:9000/reply "),
            (ENV_RATE_LIMIT_MAX, "5"),
            (ENV_LEDGER_TIMEOUT_MS, "1500"),
        ]))
        .expect("config");

        assert_eq!(config.session_duration, Duration::from_secs(90));
        assert_eq!(config.remote_timeout, Duration::from_millis(2_500));
        assert!(!config.auto_grant_trial);
        assert_eq!(config.fallback_seed, Some(42));
        assert_eq!(
            config.generation_endpoint.as_deref(),
            Some("http://localhost:9000/reply")
        );
        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(config.ledger_timeout, Duration::from_millis(1_500));
        assert_eq!(config.generator_config().remote_timeout, Duration::from_millis(2_500));
    }

    #[test]
    fn blank_values_keep_defaults() {
        let config =
            EngineConfig::from_lookup(lookup(&[(ENV_HISTORY_WINDOW, "  ")])).expect("config");
        assert_eq!(config.history_window, 6);
    }

    #[test]
    fn unparsable_values_are_rejected() {
        let err = EngineConfig::from_lookup(lookup(&[(ENV_SESSION_COST, "one")]))
            .expect_err("should fail");
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: ENV_SESSION_COST,
                value: "one".to_string()
            }
        );

        assert!(EngineConfig::from_lookup(lookup(&[(ENV_OPEN_WITH_OBJECTION, "maybe")])).is_err());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(matches!(
            EngineConfig::from_lookup(lookup(&[(ENV_LOW_CONFIDENCE_THRESHOLD, "1.5")])),
            Err(ConfigError::OutOfRange { .. })
        ));
        assert!(matches!(
            EngineConfig::from_lookup(lookup(&[(ENV_SESSION_DURATION_SECS, "0")])),
            Err(ConfigError::OutOfRange { .. })
        ));
        assert!(matches!(
            EngineConfig::from_lookup(lookup(&[(
                ENV_SESSION_DURATION_SECS,
                "18446744073709551615"
            )])),
            Err(ConfigError::OutOfRange { .. })
        ));
        assert!(EngineConfig::from_lookup(lookup(&[(ENV_SESSION_DURATION_SECS, "7200")])).is_ok());
    }
}
