//! Environment-backed runtime configuration for the sync engine.

use std::{env, time::Duration};

use thiserror::Error;

use sync_core::ResubscribeBackoff;

const DEFAULT_PAGE_SIZE: u16 = 15;
const DEFAULT_SCROLL_THRESHOLD: f32 = 100.0;
const DEFAULT_SCROLL_COOLDOWN_MS: u64 = 750;
const DEFAULT_RESUBSCRIBE_BASE_MS: u64 = 500;
const DEFAULT_RESUBSCRIBE_MAX_MS: u64 = 30_000;

/// Runtime tuning for the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Messages requested per backward page.
    pub page_size: u16,
    /// Top-proximity threshold (scroll units) for auto-pagination.
    pub scroll_threshold: f32,
    /// Cooldown suppressing repeated scroll triggers.
    pub scroll_cooldown_ms: u64,
    /// Base delay before the first live-feed resubscribe attempt.
    pub resubscribe_base_ms: u64,
    /// Cap on the resubscribe delay.
    pub resubscribe_max_ms: u64,
}

impl SyncConfig {
    /// Parse configuration from `TERN_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let page_size = parse_u16("TERN_PAGE_SIZE", DEFAULT_PAGE_SIZE, &mut lookup)?;
        let scroll_threshold =
            parse_f32("TERN_SCROLL_THRESHOLD", DEFAULT_SCROLL_THRESHOLD, &mut lookup)?;
        let scroll_cooldown_ms = parse_u64(
            "TERN_SCROLL_COOLDOWN_MS",
            DEFAULT_SCROLL_COOLDOWN_MS,
            &mut lookup,
        )?;
        let resubscribe_base_ms = parse_u64(
            "TERN_RESUBSCRIBE_BASE_MS",
            DEFAULT_RESUBSCRIBE_BASE_MS,
            &mut lookup,
        )?;
        let resubscribe_max_ms = parse_u64(
            "TERN_RESUBSCRIBE_MAX_MS",
            DEFAULT_RESUBSCRIBE_MAX_MS,
            &mut lookup,
        )?;

        if page_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TERN_PAGE_SIZE",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        if scroll_threshold <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "TERN_SCROLL_THRESHOLD",
                value: scroll_threshold.to_string(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if resubscribe_base_ms > resubscribe_max_ms {
            return Err(ConfigError::InvalidValue {
                key: "TERN_RESUBSCRIBE_BASE_MS",
                value: resubscribe_base_ms.to_string(),
                reason: format!("must not exceed TERN_RESUBSCRIBE_MAX_MS ({resubscribe_max_ms})"),
            });
        }

        Ok(Self {
            page_size,
            scroll_threshold,
            scroll_cooldown_ms,
            resubscribe_base_ms,
            resubscribe_max_ms,
        })
    }

    /// Scroll trigger cooldown as a duration.
    pub fn scroll_cooldown(&self) -> Duration {
        Duration::from_millis(self.scroll_cooldown_ms)
    }

    /// Resubscribe backoff schedule derived from the delay bounds.
    pub fn backoff(&self) -> ResubscribeBackoff {
        ResubscribeBackoff::new(
            Duration::from_millis(self.resubscribe_base_ms),
            Duration::from_millis(self.resubscribe_max_ms),
        )
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            scroll_threshold: DEFAULT_SCROLL_THRESHOLD,
            scroll_cooldown_ms: DEFAULT_SCROLL_COOLDOWN_MS,
            resubscribe_base_ms: DEFAULT_RESUBSCRIBE_BASE_MS,
            resubscribe_max_ms: DEFAULT_RESUBSCRIBE_MAX_MS,
        }
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An environment value failed validation.
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        /// Environment variable name.
        key: &'static str,
        /// Offending value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },
}

fn parse_u16<F>(key: &'static str, default: u16, lookup: &mut F) -> Result<u16, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    match trimmed(key, lookup) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            key,
            value,
            reason: "expected an unsigned 16-bit integer".to_owned(),
        }),
    }
}

fn parse_u64<F>(key: &'static str, default: u64, lookup: &mut F) -> Result<u64, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    match trimmed(key, lookup) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            key,
            value,
            reason: "expected an unsigned integer".to_owned(),
        }),
    }
}

fn parse_f32<F>(key: &'static str, default: f32, lookup: &mut F) -> Result<f32, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    match trimmed(key, lookup) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            key,
            value,
            reason: "expected a number".to_owned(),
        }),
    }
}

fn trimmed<F>(key: &str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}
