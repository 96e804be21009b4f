//! Motorstats Publisher
//!
//! Announces a message to every configured channel at once. Channels are
//! independent: one slow, failing or panicking channel never affects the
//! others, and the caller gets one [`ChannelPublishResult`] per channel in
//! the order the channels were configured.
//!
//! ```ignore
//! let publisher = FanOutPublisher::new(vec![
//!   ChannelHandler::new(Channel::Discord, Arc::new(WebhookClient::new(url, None))),
//!   ChannelHandler::new(Channel::Twitter, Arc::new(LogClient::new("twitter"))),
//! ]);
//! let results = publisher.publish_all("New post", Some("https://...")).await;
//! ```

mod channel;
mod client;
mod publisher;

pub use channel::{Channel, ChannelClient, ChannelError, ChannelHandler};
pub use client::{LogClient, WebhookClient};
pub use publisher::{ChannelPublishResult, FanOutPublisher};
