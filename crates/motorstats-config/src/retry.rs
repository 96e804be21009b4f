use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Retry ceiling and exponential backoff for transient step failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
  #[serde(default = "default_max_attempts")]
  pub max_attempts: u32,
  #[serde(default = "default_initial_backoff_ms")]
  pub initial_backoff_ms: u64,
  #[serde(default = "default_max_backoff_ms")]
  pub max_backoff_ms: u64,
  #[serde(default = "default_multiplier")]
  pub multiplier: f64,
}

fn default_max_attempts() -> u32 {
  3
}

fn default_initial_backoff_ms() -> u64 {
  500
}

fn default_max_backoff_ms() -> u64 {
  30_000
}

fn default_multiplier() -> f64 {
  2.0
}

impl Default for RetrySettings {
  fn default() -> Self {
    Self {
      max_attempts: default_max_attempts(),
      initial_backoff_ms: default_initial_backoff_ms(),
      max_backoff_ms: default_max_backoff_ms(),
      multiplier: default_multiplier(),
    }
  }
}

impl RetrySettings {
  pub(crate) fn validate(&self) -> Result<(), ConfigError> {
    if self.max_attempts == 0 {
      return Err(ConfigError::invalid("retry.max_attempts", "must be at least 1"));
    }
    if !self.multiplier.is_finite() || self.multiplier < 1.0 {
      return Err(ConfigError::invalid(
        "retry.multiplier",
        format!("must be a finite number >= 1.0, got {}", self.multiplier),
      ));
    }
    if self.initial_backoff_ms > self.max_backoff_ms {
      return Err(ConfigError::invalid(
        "retry.initial_backoff_ms",
        "must not exceed retry.max_backoff_ms",
      ));
    }
    Ok(())
  }
}
