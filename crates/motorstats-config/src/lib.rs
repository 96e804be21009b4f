//! Motorstats Config
//!
//! Serializable configuration for a motorstats deployment. The CLI loads it
//! from a JSON file (`--config=motorstats.json`); every field has a default
//! so an empty object `{}` is a valid configuration.
//!
//! The config only describes collaborators. Turning a `ChannelConfig` into a
//! live channel client, or a `DataSourceConfig` into an HTTP source, is done
//! by the binary.

mod channel;
mod error;
mod retry;

pub use channel::{ChannelConfig, ChannelKind};
pub use error::ConfigError;
pub use retry::RetrySettings;

use std::path::Path;

use motorstats_workflow::Entity;
use serde::{Deserialize, Serialize};

/// How the outcome of a fan-out decides the announce step's outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnouncePolicy {
  /// The step succeeds whatever the channels report.
  #[default]
  BestEffort,
  /// The step fails permanently when every configured channel failed.
  AtLeastOne,
}

/// Credentials accepted by the trigger boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfig {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub shared_secret: Option<String>,
  #[serde(default)]
  pub bearer_tokens: Vec<String>,
}

impl TriggerConfig {
  pub fn has_credentials(&self) -> bool {
    self.shared_secret.is_some() || !self.bearer_tokens.is_empty()
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceConfig {
  /// Base URL of the upstream statistics API. Without it, data refreshes
  /// only see rows that are already persisted.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub base_url: Option<String>,
}

/// Periodic data refreshes started by `motorstats serve`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
  #[serde(default = "default_schedule_entities")]
  pub entities: Vec<Entity>,
  #[serde(default = "default_interval_secs")]
  pub interval_secs: u64,
}

impl Default for ScheduleConfig {
  fn default() -> Self {
    Self {
      entities: default_schedule_entities(),
      interval_secs: default_interval_secs(),
    }
  }
}

fn default_schedule_entities() -> Vec<Entity> {
  Entity::ALL.to_vec()
}

fn default_interval_secs() -> u64 {
  86_400
}

fn default_site_url() -> String {
  "http://localhost:3000".to_string()
}

fn default_step_timeout_ms() -> u64 {
  60_000
}

/// Top level configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
  /// Public URL of the site; announcement links are built from it.
  #[serde(default = "default_site_url")]
  pub site_url: String,
  #[serde(default)]
  pub retry: RetrySettings,
  /// Upper bound on a single attempt of a single step.
  #[serde(default = "default_step_timeout_ms")]
  pub step_timeout_ms: u64,
  #[serde(default)]
  pub announce_policy: AnnouncePolicy,
  #[serde(default)]
  pub trigger: TriggerConfig,
  #[serde(default)]
  pub data_source: DataSourceConfig,
  #[serde(default)]
  pub channels: Vec<ChannelConfig>,
  #[serde(default)]
  pub schedule: ScheduleConfig,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      site_url: default_site_url(),
      retry: RetrySettings::default(),
      step_timeout_ms: default_step_timeout_ms(),
      announce_policy: AnnouncePolicy::default(),
      trigger: TriggerConfig::default(),
      data_source: DataSourceConfig::default(),
      channels: Vec::new(),
      schedule: ScheduleConfig::default(),
    }
  }
}

impl AppConfig {
  /// Read, parse and validate a JSON configuration file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.display().to_string(),
      source,
    })?;
    let config = Self::from_json(&content).map_err(|e| match e {
      ConfigError::Parse { source, .. } => ConfigError::Parse {
        path: path.display().to_string(),
        source,
      },
      other => other,
    })?;
    Ok(config)
  }

  /// Parse and validate a configuration from a JSON string.
  pub fn from_json(content: &str) -> Result<Self, ConfigError> {
    let config: AppConfig =
      serde_json::from_str(content).map_err(|source| ConfigError::Parse {
        path: "<inline>".to_string(),
        source,
      })?;
    config.validate()?;
    Ok(config)
  }

  /// Check cross-field constraints serde cannot express.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if !(self.site_url.starts_with("http://") || self.site_url.starts_with("https://")) {
      return Err(ConfigError::invalid(
        "site_url",
        format!("expected an http(s) URL, got '{}'", self.site_url),
      ));
    }
    if self.step_timeout_ms == 0 {
      return Err(ConfigError::invalid("step_timeout_ms", "must be greater than zero"));
    }
    if self.schedule.interval_secs == 0 {
      return Err(ConfigError::invalid("schedule.interval_secs", "must be greater than zero"));
    }
    if self.trigger.shared_secret.as_deref() == Some("") {
      return Err(ConfigError::invalid("trigger.shared_secret", "must not be empty"));
    }
    if self.trigger.bearer_tokens.iter().any(|t| t.is_empty()) {
      return Err(ConfigError::invalid("trigger.bearer_tokens", "tokens must not be empty"));
    }

    self.retry.validate()?;

    for (index, channel) in self.channels.iter().enumerate() {
      channel.validate(index)?;
    }

    Ok(())
  }

  /// The site URL without a trailing slash.
  pub fn site_base(&self) -> &str {
    self.site_url.trim_end_matches('/')
  }
}
