use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which client delivers announcements for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
  /// POST the announcement as JSON to `url`.
  Webhook,
  /// Only log the announcement.
  Log,
}

/// One announcement channel. Channels are announced to in file order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
  /// `discord`, `linkedin`, `telegram`, `twitter`, or any other name for a
  /// generic webhook.
  pub channel: String,
  pub kind: ChannelKind,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub url: Option<String>,
  /// Sent as a bearer token when present.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub token: Option<String>,
}

impl ChannelConfig {
  pub(crate) fn validate(&self, index: usize) -> Result<(), ConfigError> {
    let field = format!("channels[{}]", index);
    if self.channel.trim().is_empty() {
      return Err(ConfigError::invalid(field, "channel name must not be empty"));
    }
    if self.kind == ChannelKind::Webhook && self.url.is_none() {
      return Err(ConfigError::invalid(
        field,
        format!("webhook channel '{}' requires a url", self.channel),
      ));
    }
    Ok(())
  }
}
