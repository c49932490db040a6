use std::time::Duration;

use serde::Deserialize;
use tablestore_api::Direction;

use crate::error::EngineError;
use crate::retry::policy::{
    AlwaysRetryConfig, CustomRetryConfig, DEFAULT_MAX_RETRIES, DefaultRetryConfig, RetryPolicy,
};

/// Root configuration, parsed from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub scan: ScanConfig,

    /// Backend-specific table, handed to the store as-is.
    #[serde(default)]
    pub memory: Option<toml::Value>,
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, EngineError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| EngineError::from(e).with_context(path))?;
        Self::parse(&content).map_err(|e| e.with_context(path))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, EngineError> {
        toml::from_str(toml_str).map_err(|e| EngineError::Config(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Always,
    #[default]
    Default,
    Custom,
}

/// `[retry]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default)]
    pub strategy: StrategyKind,
    pub max_retries: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub retry_writes_on_server_error: Option<bool>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
}

impl RetryConfig {
    /// Turn the section into a policy, rejecting options the chosen strategy
    /// does not understand.
    pub fn build(&self) -> Result<RetryPolicy, EngineError> {
        let max_retries = self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES);
        if let (Some(initial), Some(max)) = (self.initial_backoff_ms, self.max_backoff_ms) {
            if initial > max {
                return Err(EngineError::Config(format!(
                    "initial_backoff_ms ({initial}) exceeds max_backoff_ms ({max})"
                )));
            }
        }
        if self.initial_backoff_ms == Some(0) {
            return Err(EngineError::Config("initial_backoff_ms must be positive".into()));
        }
        if self.timeout_ms == Some(0) {
            return Err(EngineError::Config("timeout_ms must be positive".into()));
        }

        match self.strategy {
            StrategyKind::Always => {
                self.reject(self.timeout_ms.is_some(), "timeout_ms")?;
                self.reject(
                    self.retry_writes_on_server_error.is_some(),
                    "retry_writes_on_server_error",
                )?;
                let defaults = AlwaysRetryConfig::default();
                Ok(RetryPolicy::AlwaysRetry(AlwaysRetryConfig {
                    max_retries,
                    initial_base: self
                        .initial_backoff_ms
                        .map_or(defaults.initial_base, Duration::from_millis),
                    max_base: self
                        .max_backoff_ms
                        .map_or(defaults.max_base, Duration::from_millis),
                }))
            }
            StrategyKind::Default => {
                self.reject(
                    self.retry_writes_on_server_error.is_some(),
                    "retry_writes_on_server_error",
                )?;
                self.reject(self.initial_backoff_ms.is_some(), "initial_backoff_ms")?;
                self.reject(self.max_backoff_ms.is_some(), "max_backoff_ms")?;
                let defaults = DefaultRetryConfig::default();
                Ok(RetryPolicy::Default(DefaultRetryConfig {
                    max_retries,
                    timeout: self.timeout_ms.map_or(defaults.timeout, Duration::from_millis),
                }))
            }
            StrategyKind::Custom => {
                let defaults = CustomRetryConfig::default();
                Ok(RetryPolicy::Custom(CustomRetryConfig {
                    max_retries,
                    timeout: self.timeout_ms.map_or(defaults.timeout, Duration::from_millis),
                    retry_writes_on_server_error: self
                        .retry_writes_on_server_error
                        .unwrap_or(defaults.retry_writes_on_server_error),
                    initial_base: self
                        .initial_backoff_ms
                        .map_or(defaults.initial_base, Duration::from_millis),
                    max_base: self
                        .max_backoff_ms
                        .map_or(defaults.max_base, Duration::from_millis),
                }))
            }
        }
    }

    fn reject(&self, present: bool, field: &str) -> Result<(), EngineError> {
        if present {
            return Err(EngineError::Config(format!(
                "{field} is not supported by the {:?} retry strategy",
                self.strategy
            )));
        }
        Ok(())
    }
}

/// `[scan]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanConfig {
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default)]
    pub direction: Direction,
    pub buffer_size: Option<usize>,
    pub max_count: Option<usize>,
    /// Columns to return. Empty means all.
    #[serde(default)]
    pub columns: Vec<String>,
}

fn default_table() -> String {
    "demo".to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            direction: Direction::Forward,
            buffer_size: None,
            max_count: None,
            columns: Vec::new(),
        }
    }
}
