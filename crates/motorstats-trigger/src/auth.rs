//! Credential checks for the trigger boundary.

use std::fmt;

use motorstats_config::TriggerConfig;

use crate::error::TriggerError;

/// A credential presented by a caller.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
  /// `Authorization: Bearer <token>`.
  Bearer(String),
  /// A secret shared with the scheduler.
  SharedSecret(String),
}

// Never print the secret itself.
impl fmt::Debug for Credential {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Credential::Bearer(_) => f.write_str("Bearer(..)"),
      Credential::SharedSecret(_) => f.write_str("SharedSecret(..)"),
    }
  }
}

/// Checks credentials against the configured shared secret and bearer tokens.
///
/// With nothing configured every credential is rejected.
#[derive(Clone, Default)]
pub struct Authenticator {
  shared_secret: Option<String>,
  bearer_tokens: Vec<String>,
}

impl Authenticator {
  pub fn new(config: &TriggerConfig) -> Self {
    Self {
      shared_secret: config.shared_secret.clone().filter(|s| !s.is_empty()),
      bearer_tokens: config
        .bearer_tokens
        .iter()
        .filter(|t| !t.is_empty())
        .cloned()
        .collect(),
    }
  }

  pub fn check(&self, credential: &Credential) -> Result<(), TriggerError> {
    let accepted = match credential {
      Credential::SharedSecret(secret) => self
        .shared_secret
        .as_deref()
        .is_some_and(|expected| constant_time_eq(expected.as_bytes(), secret.as_bytes())),
      // Compare against every token so timing does not reveal which matched.
      Credential::Bearer(token) => self
        .bearer_tokens
        .iter()
        .fold(false, |acc, expected| {
          constant_time_eq(expected.as_bytes(), token.as_bytes()) | acc
        }),
    };

    if accepted {
      Ok(())
    } else {
      Err(TriggerError::Unauthorized)
    }
  }
}

/// Byte comparison whose duration depends only on the lengths.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
  if a.len() != b.len() {
    return false;
  }
  a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}
