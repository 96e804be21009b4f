use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::channel::{ChannelClient, ChannelError};

#[derive(Debug, Serialize)]
struct WebhookBody<'a> {
  content: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  link: Option<&'a str>,
}

/// POSTs `{"content", "link"}` as JSON to a fixed URL.
///
/// The returned id is the `id` field of a JSON response body when there is
/// one, otherwise the HTTP status.
#[derive(Debug, Clone)]
pub struct WebhookClient {
  client: Client,
  url: String,
  token: Option<String>,
}

impl WebhookClient {
  pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
    Self::with_client(Client::new(), url, token)
  }

  pub fn with_client(client: Client, url: impl Into<String>, token: Option<String>) -> Self {
    Self {
      client,
      url: url.into(),
      token,
    }
  }
}

#[async_trait]
impl ChannelClient for WebhookClient {
  async fn publish(&self, message: &str, link: Option<&str>) -> Result<String, ChannelError> {
    let mut request = self.client.post(&self.url).json(&WebhookBody {
      content: message,
      link,
    });
    if let Some(token) = &self.token {
      request = request.bearer_auth(token);
    }

    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
      return Err(ChannelError::Rejected {
        status: status.as_u16(),
        body,
      });
    }

    let id = serde_json::from_str::<serde_json::Value>(&body)
      .ok()
      .and_then(|v| match v.get("id") {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
      })
      .unwrap_or_else(|| status.as_u16().to_string());

    Ok(id)
  }
}

/// Writes the announcement to the log and reports success.
#[derive(Debug, Clone, Default)]
pub struct LogClient {
  name: String,
}

impl LogClient {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into() }
  }
}

#[async_trait]
impl ChannelClient for LogClient {
  async fn publish(&self, message: &str, link: Option<&str>) -> Result<String, ChannelError> {
    let id = uuid::Uuid::new_v4().to_string();
    info!(
      channel = %self.name,
      id = %id,
      message = %message,
      link = link.unwrap_or(""),
      "announcement"
    );
    Ok(id)
  }
}
