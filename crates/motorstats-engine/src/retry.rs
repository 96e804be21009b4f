use std::time::Duration;

use motorstats_config::RetrySettings;

/// Retry ceiling and capped exponential backoff for transient step failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
  /// Total attempts allowed, the first one included.
  pub max_attempts: u32,
  pub initial_backoff: Duration,
  pub max_backoff: Duration,
  pub multiplier: f64,
}

impl RetryPolicy {
  /// A policy that retries immediately, for tests.
  pub fn immediate(max_attempts: u32) -> Self {
    Self {
      max_attempts,
      initial_backoff: Duration::ZERO,
      max_backoff: Duration::ZERO,
      multiplier: 1.0,
    }
  }

  /// Whether another attempt is allowed after `attempts` finished ones.
  pub fn should_retry(&self, attempts: u32) -> bool {
    attempts < self.max_attempts
  }

  /// Delay after the `attempt`-th failed attempt (1-based).
  pub fn backoff(&self, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let millis = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
    let cap = self.max_backoff.as_millis() as f64;
    Duration::from_millis(millis.min(cap) as u64)
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::from(&RetrySettings::default())
  }
}

impl From<&RetrySettings> for RetryPolicy {
  fn from(settings: &RetrySettings) -> Self {
    Self {
      max_attempts: settings.max_attempts.max(1),
      initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
      max_backoff: Duration::from_millis(settings.max_backoff_ms),
      multiplier: settings.multiplier,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_backoff_grows_and_caps() {
    let policy = RetryPolicy {
      max_attempts: 10,
      initial_backoff: Duration::from_millis(100),
      max_backoff: Duration::from_millis(1_000),
      multiplier: 2.0,
    };

    assert_eq!(policy.backoff(1), Duration::from_millis(100));
    assert_eq!(policy.backoff(2), Duration::from_millis(200));
    assert_eq!(policy.backoff(4), Duration::from_millis(800));
    assert_eq!(policy.backoff(5), Duration::from_millis(1_000));
    assert_eq!(policy.backoff(500), Duration::from_millis(1_000));
  }

  #[test]
  fn test_ceiling() {
    let policy = RetryPolicy::immediate(3);
    assert!(policy.should_retry(1));
    assert!(policy.should_retry(2));
    assert!(!policy.should_retry(3));
    assert_eq!(policy.backoff(2), Duration::ZERO);
  }

  #[test]
  fn test_from_settings() {
    let policy = RetryPolicy::from(&RetrySettings::default());
    assert_eq!(policy.max_attempts, 3);
    assert_eq!(policy.initial_backoff, Duration::from_millis(500));
    assert_eq!(policy.max_backoff, Duration::from_secs(30));
  }
}
