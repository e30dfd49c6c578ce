//! Configuration types for the enhancement pipeline.
//!
//! This module provides the configuration structures controlling the AI
//! backend connection, call timeouts and retry, the confirmation strategy,
//! and the editor event stream.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "lessonlift.json";

/// Default base URL of the AI suggestion backend.
fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

/// Default per-call timeout in seconds.
const fn default_request_timeout() -> u64 {
    60
}

/// Default number of attempts per collaborator call (no retry).
const fn default_max_attempts() -> u32 {
    1
}

/// Default delay before the first retry, in milliseconds.
const fn default_initial_backoff() -> u64 {
    500
}

/// Default cap on the retry delay, in milliseconds.
const fn default_max_backoff() -> u64 {
    8_000
}

/// Default buffer size of the editor event channel.
const fn default_event_capacity() -> usize {
    100
}

/// Main configuration for the enhancement service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Connection settings for the AI suggestion backend.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Retry policy applied to every collaborator call.
    #[serde(default)]
    pub retry: RetryConfig,

    /// How confirmations compose the final document.
    #[serde(default)]
    pub confirmation_strategy: ConfirmationStrategy,

    /// Buffer size for each editor event subscriber.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            retry: RetryConfig::default(),
            confirmation_strategy: ConfirmationStrategy::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `lessonlift.json` in the current directory. If not found,
    /// returns default configuration.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            PipelineError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `lessonlift.json` in a specific directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        Self::load_from_file(&config_path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::ConfigParseError` if the file exists but contains
    /// invalid JSON or invalid enum values, and
    /// `PipelineError::ConfigValidationError` if the values are out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(PipelineError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| PipelineError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// - `backend.baseUrl` must be an `http://` or `https://` URL
    /// - `backend.requestTimeoutSecs` must be greater than 0
    /// - `retry.maxAttempts` must be greater than 0
    /// - `retry.initialBackoffMs` must not exceed `retry.maxBackoffMs`
    /// - `eventCapacity` must be greater than 0
    pub fn validate(&self) -> Result<()> {
        let base_url = self.backend.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(PipelineError::config_validation(
                format!("backend.baseUrl must be an http(s) URL, got '{base_url}'"),
                "Set backend.baseUrl to the suggestion service, e.g. http://localhost:8000/api",
            ));
        }

        if self.backend.request_timeout_secs == 0 {
            return Err(PipelineError::config_validation(
                "backend.requestTimeoutSecs must be greater than 0",
                "Set backend.requestTimeoutSecs to at least 1 second in your lessonlift.json",
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(PipelineError::config_validation(
                "retry.maxAttempts must be greater than 0",
                "Set retry.maxAttempts to 1 to disable retries",
            ));
        }

        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(PipelineError::config_validation(
                "retry.initialBackoffMs must not exceed retry.maxBackoffMs",
                "Lower retry.initialBackoffMs or raise retry.maxBackoffMs",
            ));
        }

        if self.event_capacity == 0 {
            return Err(PipelineError::config_validation(
                "eventCapacity must be greater than 0",
                "Set eventCapacity to at least 1 (100 is typical)",
            ));
        }

        Ok(())
    }
}

/// Connection settings for the AI suggestion backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /// Base URL the collaborator endpoints are resolved against.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the environment variable holding the bearer token, if any.
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Timeout for a single collaborator call in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl BackendConfig {
    /// Returns the per-call timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Bounded retry with exponential backoff for collaborator calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Total attempts per call, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds. Doubles on each retry.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound on the retry delay in milliseconds.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl RetryConfig {
    /// Returns the delay to wait after the given failed attempt (1-indexed).
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .initial_backoff_ms
            .saturating_mul(1_u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }
}

/// How a confirmation produces the resulting document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfirmationStrategy {
    /// Recompose the selected changes locally (default).
    #[default]
    Local,
    /// Delegate composition to the collaborator's `confirmEnhancement`.
    Remote,
}

impl ConfirmationStrategy {
    /// Parses a string into a `ConfirmationStrategy`, case-insensitively.
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "local" => Some(Self::Local),
            "remote" => Some(Self::Remote),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for ConfirmationStrategy {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid confirmation strategy '{s}': expected one of 'local', 'remote'"
            ))
        })
    }
}

impl Serialize for ConfirmationStrategy {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            Self::Local => "local",
            Self::Remote => "remote",
        };
        serializer.serialize_str(s)
    }
}
