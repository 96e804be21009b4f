use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::tags::CacheTag;

#[derive(Debug, Error)]
pub enum CacheError {
  #[error("cache backend unavailable: {message}")]
  Unavailable { message: String },
}

/// A cache that can drop every entry carrying one of a set of tags.
///
/// Implementations must tolerate the same tags being invalidated repeatedly.
#[async_trait]
pub trait CacheStore: Send + Sync {
  async fn invalidate(&self, tags: &[CacheTag]) -> Result<(), CacheError>;
}

/// Records every invalidation instead of talking to a cache.
///
/// Used for tests and when no cache backend is configured.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
  invalidated: Mutex<Vec<Vec<CacheTag>>>,
}

impl InMemoryCacheStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Every invalidate call so far, oldest first.
  pub fn calls(&self) -> Vec<Vec<CacheTag>> {
    self.invalidated.lock().clone()
  }

  /// Every tag invalidated so far, flattened.
  pub fn invalidated_tags(&self) -> Vec<CacheTag> {
    self.calls().into_iter().flatten().collect()
  }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
  async fn invalidate(&self, tags: &[CacheTag]) -> Result<(), CacheError> {
    debug!(tags = tags.len(), "cache_invalidated");
    self.invalidated.lock().push(tags.to_vec());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_in_memory_records_invalidations() {
    let store = InMemoryCacheStore::new();
    assert!(store.calls().is_empty());

    let tags = vec![CacheTag::new("cars:months"), CacheTag::new("cars:year:2024")];
    store.invalidate(&tags).await.unwrap();
    store.invalidate(&tags).await.unwrap();

    assert_eq!(store.calls().len(), 2);
    assert_eq!(store.invalidated_tags().len(), 4);
  }
}
