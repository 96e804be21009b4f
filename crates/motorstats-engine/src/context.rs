use std::sync::Arc;
use std::time::Duration;

use motorstats_cache::CacheStore;
use motorstats_config::{AnnouncePolicy, AppConfig};
use motorstats_publisher::FanOutPublisher;
use motorstats_store::{DataStore, RunStore};

use crate::events::{ExecutionNotifier, NoopNotifier};
use crate::generator::ContentGenerator;
use crate::retry::RetryPolicy;
use crate::source::DataSource;

/// Tunables of the engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
  pub retry: RetryPolicy,
  /// Upper bound on one attempt of one step.
  pub step_timeout: Duration,
  pub announce_policy: AnnouncePolicy,
  /// Base of announcement links, without a trailing slash.
  pub site_url: String,
}

impl Default for EngineSettings {
  fn default() -> Self {
    Self::from(&AppConfig::default())
  }
}

impl From<&AppConfig> for EngineSettings {
  fn from(config: &AppConfig) -> Self {
    Self {
      retry: RetryPolicy::from(&config.retry),
      step_timeout: Duration::from_millis(config.step_timeout_ms),
      announce_policy: config.announce_policy,
      site_url: config.site_base().to_string(),
    }
  }
}

/// Every collaborator a run needs, passed explicitly to each step.
#[derive(Clone)]
pub struct RunContext {
  pub runs: Arc<dyn RunStore>,
  pub data: Arc<dyn DataStore>,
  pub cache: Arc<dyn CacheStore>,
  pub source: Arc<dyn DataSource>,
  pub generator: Arc<dyn ContentGenerator>,
  pub publisher: FanOutPublisher,
  pub notifier: Arc<dyn ExecutionNotifier>,
  pub settings: EngineSettings,
}

impl RunContext {
  pub fn new(
    runs: Arc<dyn RunStore>,
    data: Arc<dyn DataStore>,
    cache: Arc<dyn CacheStore>,
    source: Arc<dyn DataSource>,
    generator: Arc<dyn ContentGenerator>,
    publisher: FanOutPublisher,
  ) -> Self {
    Self {
      runs,
      data,
      cache,
      source,
      generator,
      publisher,
      notifier: Arc::new(NoopNotifier),
      settings: EngineSettings::default(),
    }
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  pub fn with_settings(mut self, settings: EngineSettings) -> Self {
    self.settings = settings;
    self
  }
}
