//! Conference client configuration.
//!
//! Loaded from `CC_*` environment variables with defaults for everything.
//! Unlike the server crates nothing here is mandatory, but malformed values
//! are rejected instead of silently replaced.

use common::config::{ObservabilityConfig, DEFAULT_LOG_FILTER};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default delay between speech-to-text subscription passes.
pub const DEFAULT_STT_RETRY_INTERVAL_MS: u64 = 2000;

/// Nickname used when connection metadata carries none.
pub const DEFAULT_NICKNAME: &str = "Participant";

/// Default capacity of the transport event channel.
pub const DEFAULT_EVENT_CHANNEL_BUFFER: usize = 256;

/// Language requested from the transcription service.
pub const DEFAULT_STT_LANGUAGE: &str = "en-US";

/// Conference client configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    /// Whether this execution context can capture the screen. Mobile and
    /// other constrained contexts never create the screen session.
    pub screen_capture_supported: bool,

    /// Retry capture once with the last-known-good device when the platform
    /// reports access denied (needed on some browsers).
    pub device_fallback_on_access_denied: bool,

    /// Delay between speech-to-text subscription passes.
    pub stt_retry_interval: Duration,

    /// Transcription language.
    pub stt_language: String,

    /// Nickname used when remote metadata is missing or malformed.
    pub default_nickname: String,

    /// Capacity of the transport event channel.
    pub event_channel_buffer: usize,

    pub observability: ObservabilityConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("screen_capture_supported", &self.screen_capture_supported)
            .field(
                "device_fallback_on_access_denied",
                &self.device_fallback_on_access_denied,
            )
            .field(
                "stt_retry_interval_ms",
                &self.stt_retry_interval.as_millis(),
            )
            .field("stt_language", &self.stt_language)
            .field("default_nickname", &self.default_nickname)
            .field("event_channel_buffer", &self.event_channel_buffer)
            .field("log_level", &self.observability.log_level)
            .field("json_logs", &self.observability.json_logs)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            screen_capture_supported: true,
            device_fallback_on_access_denied: false,
            stt_retry_interval: Duration::from_millis(DEFAULT_STT_RETRY_INTERVAL_MS),
            stt_language: DEFAULT_STT_LANGUAGE.to_string(),
            default_nickname: DEFAULT_NICKNAME.to_string(),
            event_channel_buffer: DEFAULT_EVENT_CHANNEL_BUFFER,
            observability: ObservabilityConfig::default(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

fn parse_bool(vars: &HashMap<String, String>, key: &str, default: bool) -> Result<bool, ConfigError> {
    match vars.get(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(format!(
                "{key} must be a boolean, got '{v}'"
            ))),
        },
    }
}

fn parse_number<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key) {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|_| {
            ConfigError::InvalidValue(format!("{key} must be a non-negative integer, got '{v}'"))
        }),
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let screen_capture_supported = parse_bool(vars, "CC_SCREEN_CAPTURE_SUPPORTED", true)?;
        let device_fallback_on_access_denied =
            parse_bool(vars, "CC_DEVICE_FALLBACK_ON_ACCESS_DENIED", false)?;

        let stt_retry_ms = parse_number(
            vars,
            "CC_STT_RETRY_INTERVAL_MS",
            DEFAULT_STT_RETRY_INTERVAL_MS,
        )?;
        if stt_retry_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "CC_STT_RETRY_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }

        let event_channel_buffer =
            parse_number(vars, "CC_EVENT_CHANNEL_BUFFER", DEFAULT_EVENT_CHANNEL_BUFFER)?;
        if event_channel_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "CC_EVENT_CHANNEL_BUFFER must be greater than zero".to_string(),
            ));
        }

        let stt_language = vars
            .get("CC_STT_LANGUAGE")
            .cloned()
            .unwrap_or_else(|| DEFAULT_STT_LANGUAGE.to_string());

        let default_nickname = vars
            .get("CC_DEFAULT_NICKNAME")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_NICKNAME.to_string());

        let log_level = vars
            .get("CC_LOG_LEVEL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        let json_logs = parse_bool(vars, "CC_JSON_LOGS", false)?;

        Ok(Config {
            screen_capture_supported,
            device_fallback_on_access_denied,
            stt_retry_interval: Duration::from_millis(stt_retry_ms),
            stt_language,
            default_nickname,
            event_channel_buffer,
            observability: ObservabilityConfig {
                log_level,
                json_logs,
            },
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&HashMap::new()).expect("Config should load successfully");

        assert!(config.screen_capture_supported);
        assert!(!config.device_fallback_on_access_denied);
        assert_eq!(config.stt_retry_interval, Duration::from_millis(2000));
        assert_eq!(config.stt_language, DEFAULT_STT_LANGUAGE);
        assert_eq!(config.default_nickname, DEFAULT_NICKNAME);
        assert_eq!(config.event_channel_buffer, DEFAULT_EVENT_CHANNEL_BUFFER);
        assert_eq!(config.observability.log_level, DEFAULT_LOG_FILTER);
        assert!(!config.observability.json_logs);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let vars = HashMap::from([
            ("CC_SCREEN_CAPTURE_SUPPORTED".to_string(), "false".to_string()),
            (
                "CC_DEVICE_FALLBACK_ON_ACCESS_DENIED".to_string(),
                "1".to_string(),
            ),
            ("CC_STT_RETRY_INTERVAL_MS".to_string(), "500".to_string()),
            ("CC_STT_LANGUAGE".to_string(), "es-ES".to_string()),
            ("CC_DEFAULT_NICKNAME".to_string(), "Guest".to_string()),
            ("CC_EVENT_CHANNEL_BUFFER".to_string(), "32".to_string()),
            ("CC_LOG_LEVEL".to_string(), "info".to_string()),
            ("CC_JSON_LOGS".to_string(), "yes".to_string()),
        ]);

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert!(!config.screen_capture_supported);
        assert!(config.device_fallback_on_access_denied);
        assert_eq!(config.stt_retry_interval, Duration::from_millis(500));
        assert_eq!(config.stt_language, "es-ES");
        assert_eq!(config.default_nickname, "Guest");
        assert_eq!(config.event_channel_buffer, 32);
        assert_eq!(config.observability.log_level, "info");
        assert!(config.observability.json_logs);
    }

    #[test]
    fn test_invalid_boolean_rejected() {
        let vars = HashMap::from([(
            "CC_SCREEN_CAPTURE_SUPPORTED".to_string(),
            "maybe".to_string(),
        )]);

        let err = Config::from_vars(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(msg) if msg.contains("CC_SCREEN_CAPTURE_SUPPORTED")));
    }

    #[test]
    fn test_invalid_number_rejected() {
        let vars = HashMap::from([(
            "CC_STT_RETRY_INTERVAL_MS".to_string(),
            "soon".to_string(),
        )]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));

        let vars = HashMap::from([("CC_EVENT_CHANNEL_BUFFER".to_string(), "0".to_string())]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_blank_nickname_falls_back_to_default() {
        let vars = HashMap::from([("CC_DEFAULT_NICKNAME".to_string(), "   ".to_string())]);
        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.default_nickname, DEFAULT_NICKNAME);
    }

    #[test]
    fn test_debug_output_lists_fields() {
        let debug = format!("{:?}", Config::default());
        assert!(debug.contains("stt_retry_interval_ms: 2000"));
        assert!(debug.contains("screen_capture_supported: true"));
    }
}
