use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A named announcement destination.
///
/// Serialized as its lowercase name; any name that is not a known platform
/// is a generic webhook. Names are the identity: a `Webhook` carrying a
/// platform name such as `"discord"` serializes to that name and reads back
/// as the platform variant, so build channels with `Channel::from(name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Channel {
  Discord,
  LinkedIn,
  Telegram,
  Twitter,
  /// Any other name. Must not be one of the platform names above.
  Webhook(String),
}

impl Channel {
  pub fn name(&self) -> &str {
    match self {
      Channel::Discord => "discord",
      Channel::LinkedIn => "linkedin",
      Channel::Telegram => "telegram",
      Channel::Twitter => "twitter",
      Channel::Webhook(name) => name,
    }
  }
}

impl fmt::Display for Channel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl From<String> for Channel {
  fn from(name: String) -> Self {
    match name.as_str() {
      "discord" => Channel::Discord,
      "linkedin" => Channel::LinkedIn,
      "telegram" => Channel::Telegram,
      "twitter" => Channel::Twitter,
      _ => Channel::Webhook(name),
    }
  }
}

impl From<&str> for Channel {
  fn from(name: &str) -> Self {
    Channel::from(name.to_string())
  }
}

impl From<Channel> for String {
  fn from(channel: Channel) -> Self {
    channel.name().to_string()
  }
}

/// Errors a channel client can report for one delivery.
#[derive(Debug, Error)]
pub enum ChannelError {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("channel rejected the message with status {status}: {body}")]
  Rejected { status: u16, body: String },

  #[error("channel error: {message}")]
  Other { message: String },
}

/// Delivers one announcement to one external platform.
#[async_trait]
pub trait ChannelClient: Send + Sync {
  /// Publish `message`, returning the platform's identifier for the post.
  async fn publish(&self, message: &str, link: Option<&str>) -> Result<String, ChannelError>;
}

/// A channel paired with the client that delivers to it.
#[derive(Clone)]
pub struct ChannelHandler {
  pub channel: Channel,
  pub client: Arc<dyn ChannelClient>,
}

impl ChannelHandler {
  pub fn new(channel: Channel, client: Arc<dyn ChannelClient>) -> Self {
    Self { channel, client }
  }
}

impl fmt::Debug for ChannelHandler {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ChannelHandler")
      .field("channel", &self.channel)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_channel_names() {
    assert_eq!(Channel::from("linkedin"), Channel::LinkedIn);
    assert_eq!(Channel::from("ops-hook"), Channel::Webhook("ops-hook".into()));
    assert_eq!(
      serde_json::to_value(Channel::Telegram).unwrap(),
      serde_json::json!("telegram")
    );
    let channel: Channel = serde_json::from_value(serde_json::json!("slack")).unwrap();
    assert_eq!(channel.to_string(), "slack");
  }

  #[test]
  fn test_webhook_with_platform_name_reads_back_as_platform() {
    let value = serde_json::to_value(Channel::Webhook("discord".into())).unwrap();
    assert_eq!(value, serde_json::json!("discord"));
    let channel: Channel = serde_json::from_value(value).unwrap();
    assert_eq!(channel, Channel::Discord);
    assert_eq!(Channel::from("discord"), Channel::Discord);
  }
}
