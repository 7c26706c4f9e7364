use std::time::Duration;

use qxl_queue::RetryPolicy;
use thiserror::Error;

/// Default number of buffered commands.
pub const DEFAULT_CAPACITY: usize = 1024;

pub const ENV_CAPACITY: &str = "QXL_BRIDGE_CAPACITY";
pub const ENV_RETRY_LIMIT: &str = "QXL_BRIDGE_RETRY_LIMIT";
pub const ENV_RETRY_DELAY_US: &str = "QXL_BRIDGE_RETRY_DELAY_US";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for env var {0}")]
    InvalidEnv(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Maximum number of buffered commands.
    pub capacity: usize,
    /// Back-pressure budget for pushes into a full queue.
    pub retry: RetryPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            retry: RetryPolicy::default(),
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unset keys fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let capacity = parse_var(&lookup, ENV_CAPACITY)?.unwrap_or(defaults.capacity);
        if capacity == 0 {
            return Err(ConfigError::InvalidEnv(ENV_CAPACITY));
        }
        let retry_limit =
            parse_var(&lookup, ENV_RETRY_LIMIT)?.unwrap_or(defaults.retry.retry_limit);
        let retry_delay = parse_var::<u64, _>(&lookup, ENV_RETRY_DELAY_US)?
            .map(Duration::from_micros)
            .unwrap_or(defaults.retry.retry_delay);

        Ok(Self {
            capacity,
            retry: RetryPolicy::new(retry_limit, retry_delay),
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv(key)),
    }
}
