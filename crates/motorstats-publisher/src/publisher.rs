use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::channel::{Channel, ChannelError, ChannelHandler};

/// Outcome of announcing to one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPublishResult {
  pub channel: Channel,
  pub success: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl ChannelPublishResult {
  fn delivered(channel: Channel, id: String) -> Self {
    Self {
      channel,
      success: true,
      id: Some(id),
      error: None,
    }
  }

  fn failed(channel: Channel, error: String) -> Self {
    Self {
      channel,
      success: false,
      id: None,
      error: Some(error),
    }
  }
}

/// Announces to an ordered list of channels concurrently.
#[derive(Debug, Clone, Default)]
pub struct FanOutPublisher {
  handlers: Vec<ChannelHandler>,
}

impl FanOutPublisher {
  pub fn new(handlers: Vec<ChannelHandler>) -> Self {
    Self { handlers }
  }

  pub fn channels(&self) -> impl Iterator<Item = &Channel> {
    self.handlers.iter().map(|h| &h.channel)
  }

  pub fn is_empty(&self) -> bool {
    self.handlers.is_empty()
  }

  /// Publish to every channel and report each outcome in handler order.
  ///
  /// Never fails: errors and panics inside a handler become a failed result
  /// for that handler alone. Nothing is retried here. Dropping the returned
  /// future aborts every delivery still in flight.
  #[instrument(name = "fan_out", skip(self, message, link), fields(channels = self.handlers.len()))]
  pub async fn publish_all(&self, message: &str, link: Option<&str>) -> Vec<ChannelPublishResult> {
    let message: Arc<str> = Arc::from(message);
    let link: Option<Arc<str>> = link.map(Arc::from);

    let handles: Vec<_> = self
      .handlers
      .iter()
      .map(|handler| {
        let client = handler.client.clone();
        let message = message.clone();
        let link = link.clone();
        tokio::spawn(async move { client.publish(&message, link.as_deref()).await })
      })
      .collect();

    let _guard = AbortOnDrop(handles.iter().map(|h| h.abort_handle()).collect());
    let outcomes = futures::future::join_all(handles).await;

    self
      .handlers
      .iter()
      .zip(outcomes)
      .map(|(handler, outcome)| {
        let channel = handler.channel.clone();
        let outcome = match outcome {
          Ok(result) => result,
          Err(join_error) => Err(ChannelError::Other {
            message: if join_error.is_panic() {
              "channel handler panicked".to_string()
            } else {
              format!("channel handler aborted: {}", join_error)
            },
          }),
        };

        match outcome {
          Ok(id) => {
            info!(channel = %channel, id = %id, "channel_published");
            ChannelPublishResult::delivered(channel, id)
          }
          Err(e) => {
            warn!(channel = %channel, error = %e, "channel_publish_failed");
            ChannelPublishResult::failed(channel, e.to_string())
          }
        }
      })
      .collect()
  }
}

/// Aborts the spawned deliveries when the fan-out is dropped mid-flight.
struct AbortOnDrop(Vec<tokio::task::AbortHandle>);

impl Drop for AbortOnDrop {
  fn drop(&mut self) {
    for handle in &self.0 {
      handle.abort();
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  use async_trait::async_trait;
  use tokio::sync::Barrier;

  use super::*;
  use crate::channel::ChannelClient;

  struct Succeeding(&'static str);

  #[async_trait]
  impl ChannelClient for Succeeding {
    async fn publish(&self, _message: &str, _link: Option<&str>) -> Result<String, ChannelError> {
      Ok(self.0.to_string())
    }
  }

  struct Failing;

  #[async_trait]
  impl ChannelClient for Failing {
    async fn publish(&self, _message: &str, _link: Option<&str>) -> Result<String, ChannelError> {
      Err(ChannelError::Other {
        message: "rate limited".to_string(),
      })
    }
  }

  struct Panicking;

  #[async_trait]
  impl ChannelClient for Panicking {
    async fn publish(&self, _message: &str, _link: Option<&str>) -> Result<String, ChannelError> {
      panic!("boom");
    }
  }

  struct Recording {
    calls: AtomicUsize,
    seen: std::sync::Mutex<Option<(String, Option<String>)>>,
  }

  #[async_trait]
  impl ChannelClient for Recording {
    async fn publish(&self, message: &str, link: Option<&str>) -> Result<String, ChannelError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      *self.seen.lock().unwrap() = Some((message.to_string(), link.map(str::to_string)));
      Ok("recorded".to_string())
    }
  }

  /// Only returns once every sibling has started.
  struct Rendezvous(Arc<Barrier>);

  #[async_trait]
  impl ChannelClient for Rendezvous {
    async fn publish(&self, _message: &str, _link: Option<&str>) -> Result<String, ChannelError> {
      self.0.wait().await;
      Ok("met".to_string())
    }
  }

  /// Counts entries, then counts a delivery after the delay.
  struct Slow {
    started: Arc<AtomicUsize>,
    delivered: Arc<AtomicUsize>,
    delay: Duration,
  }

  #[async_trait]
  impl ChannelClient for Slow {
    async fn publish(&self, _message: &str, _link: Option<&str>) -> Result<String, ChannelError> {
      self.started.fetch_add(1, Ordering::SeqCst);
      tokio::time::sleep(self.delay).await;
      self.delivered.fetch_add(1, Ordering::SeqCst);
      Ok("slow".to_string())
    }
  }

  fn handler(channel: Channel, client: impl ChannelClient + 'static) -> ChannelHandler {
    ChannelHandler::new(channel, Arc::new(client))
  }

  #[tokio::test]
  async fn test_failure_is_isolated_and_order_preserved() {
    let publisher = FanOutPublisher::new(vec![
      handler(Channel::Discord, Succeeding("d-1")),
      handler(Channel::LinkedIn, Failing),
      handler(Channel::Telegram, Succeeding("t-1")),
    ]);

    let results = publisher.publish_all("hello", None).await;

    let flags: Vec<bool> = results.iter().map(|r| r.success).collect();
    assert_eq!(flags, vec![true, false, true]);
    assert_eq!(results[0].channel, Channel::Discord);
    assert_eq!(results[0].id.as_deref(), Some("d-1"));
    assert_eq!(results[1].channel, Channel::LinkedIn);
    assert!(results[1].error.as_deref().unwrap().contains("rate limited"));
    assert_eq!(results[2].id.as_deref(), Some("t-1"));
  }

  #[tokio::test]
  async fn test_panic_becomes_failure() {
    let publisher = FanOutPublisher::new(vec![
      handler(Channel::Twitter, Panicking),
      handler(Channel::Webhook("ops".into()), Succeeding("ok")),
    ]);

    let results = publisher.publish_all("hello", None).await;

    assert!(!results[0].success);
    assert!(results[0].error.as_deref().unwrap().contains("panicked"));
    assert!(results[1].success);
  }

  #[tokio::test]
  async fn test_handlers_run_concurrently() {
    let barrier = Arc::new(Barrier::new(3));
    let publisher = FanOutPublisher::new(vec![
      handler(Channel::Discord, Rendezvous(barrier.clone())),
      handler(Channel::Telegram, Rendezvous(barrier.clone())),
      handler(Channel::Twitter, Rendezvous(barrier)),
    ]);

    let results = tokio::time::timeout(Duration::from_secs(5), publisher.publish_all("hi", None))
      .await
      .expect("handlers were not run concurrently");
    assert!(results.iter().all(|r| r.success));
  }

  #[tokio::test]
  async fn test_message_and_link_are_forwarded() {
    let recording = Arc::new(Recording {
      calls: AtomicUsize::new(0),
      seen: std::sync::Mutex::new(None),
    });
    let publisher =
      FanOutPublisher::new(vec![ChannelHandler::new(Channel::Discord, recording.clone())]);

    publisher
      .publish_all("New post", Some("https://example.com/blog/x"))
      .await;

    assert_eq!(recording.calls.load(Ordering::SeqCst), 1);
    let seen = recording.seen.lock().unwrap().clone().unwrap();
    assert_eq!(seen.0, "New post");
    assert_eq!(seen.1.as_deref(), Some("https://example.com/blog/x"));
  }

  #[tokio::test]
  async fn test_dropped_fan_out_stops_deliveries() {
    let started = Arc::new(AtomicUsize::new(0));
    let delivered = Arc::new(AtomicUsize::new(0));
    let publisher = FanOutPublisher::new(vec![handler(
      Channel::Discord,
      Slow {
        started: started.clone(),
        delivered: delivered.clone(),
        delay: Duration::from_millis(150),
      },
    )]);

    let timed_out =
      tokio::time::timeout(Duration::from_millis(30), publisher.publish_all("hi", None)).await;
    assert!(timed_out.is_err());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(delivered.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_no_handlers() {
    let publisher = FanOutPublisher::default();
    assert!(publisher.is_empty());
    assert!(publisher.publish_all("hello", None).await.is_empty());
  }
}
