//! Upstream statistics sources.

use async_trait::async_trait;
use motorstats_workflow::{Entity, Period, StatRow};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

/// Errors a data source can report.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
  /// The source could not be reached or failed on its side.
  #[error("data source unavailable: {message}")]
  Unavailable { message: String },

  /// The source refused the request; asking again will not help.
  #[error("data source rejected the request: {message}")]
  Rejected { message: String },
}

impl SourceError {
  pub fn is_transient(&self) -> bool {
    matches!(self, SourceError::Unavailable { .. })
  }
}

/// Pulls monthly statistics rows from outside the system.
#[async_trait]
pub trait DataSource: Send + Sync {
  /// Rows for `entity`. Without a month the source returns what it
  /// considers current, which may be nothing.
  async fn fetch(&self, entity: Entity, month: Option<&Period>) -> Result<Vec<StatRow>, SourceError>;
}

/// A source with nothing to offer.
///
/// With it, a refresh for an explicit month writes about already persisted
/// rows, and a refresh without a month has no data.
#[derive(Debug, Clone, Default)]
pub struct EmptySource;

#[async_trait]
impl DataSource for EmptySource {
  async fn fetch(&self, _entity: Entity, _month: Option<&Period>) -> Result<Vec<StatRow>, SourceError> {
    Ok(Vec::new())
  }
}

#[derive(Debug, Deserialize)]
struct SourceRow {
  month: Period,
  category: String,
  value: i64,
}

/// Fetches `GET {base_url}/{entity}[?month=YYYY-MM]`, expecting a JSON
/// array of `{month, category, value}`.
///
/// Network errors and 5xx responses are transient, other non-success
/// responses and malformed bodies are not.
#[derive(Debug, Clone)]
pub struct HttpDataSource {
  client: Client,
  base_url: String,
}

impl HttpDataSource {
  pub fn new(base_url: impl Into<String>) -> Self {
    Self::with_client(Client::new(), base_url)
  }

  pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
    let base_url: String = base_url.into();
    Self {
      client,
      base_url: base_url.trim_end_matches('/').to_string(),
    }
  }

  fn url(&self, entity: Entity) -> String {
    format!("{}/{}", self.base_url, entity)
  }
}

#[async_trait]
impl DataSource for HttpDataSource {
  async fn fetch(&self, entity: Entity, month: Option<&Period>) -> Result<Vec<StatRow>, SourceError> {
    let mut request = self.client.get(self.url(entity));
    if let Some(month) = month {
      request = request.query(&[("month", month.to_string())]);
    }

    let response = request.send().await.map_err(|e| SourceError::Unavailable {
      message: e.to_string(),
    })?;

    let status = response.status();
    if !status.is_success() {
      let message = format!("{} returned {}", self.url(entity), status);
      return Err(classify(status, message));
    }

    let rows: Vec<SourceRow> = response.json().await.map_err(|e| SourceError::Rejected {
      message: format!("malformed response body: {}", e),
    })?;

    Ok(
      rows
        .into_iter()
        .map(|row| StatRow {
          entity,
          period: row.month,
          category: row.category,
          value: row.value,
        })
        .collect(),
    )
  }
}

fn classify(status: StatusCode, message: String) -> SourceError {
  if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
    SourceError::Unavailable { message }
  } else {
    SourceError::Rejected { message }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_classification() {
    assert!(classify(StatusCode::BAD_GATEWAY, String::new()).is_transient());
    assert!(classify(StatusCode::TOO_MANY_REQUESTS, String::new()).is_transient());
    assert!(!classify(StatusCode::NOT_FOUND, String::new()).is_transient());
    assert!(!classify(StatusCode::UNAUTHORIZED, String::new()).is_transient());
  }

  #[test]
  fn test_url_trims_trailing_slash() {
    let source = HttpDataSource::new("https://api.example.com/v1/");
    assert_eq!(source.url(Entity::Coe), "https://api.example.com/v1/coe");
  }

  #[tokio::test]
  async fn test_unreachable_source_is_transient() {
    let source = HttpDataSource::new("http://127.0.0.1:9");
    let err = source.fetch(Entity::Cars, None).await.unwrap_err();
    assert!(err.is_transient());
  }

  #[tokio::test]
  async fn test_empty_source() {
    let rows = EmptySource.fetch(Entity::Cars, None).await.unwrap();
    assert!(rows.is_empty());
  }
}
