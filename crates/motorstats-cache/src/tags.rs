use std::fmt;

use motorstats_workflow::{Entity, Period};
use serde::{Deserialize, Serialize};

/// An opaque cache tag such as `coe:month:2024-05`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheTag(String);

impl CacheTag {
  pub fn new(tag: impl Into<String>) -> Self {
    Self(tag.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for CacheTag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// The family of read views a write affects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
  /// Statistics of one entity.
  Entity(Entity),
  /// Blog posts.
  Posts,
}

impl TagKind {
  pub fn prefix(&self) -> &'static str {
    match self {
      TagKind::Entity(entity) => entity.as_str(),
      TagKind::Posts => "posts",
    }
  }
}

impl fmt::Display for TagKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.prefix())
  }
}

/// Tags to invalidate after a write of `kind` data for `period`.
///
/// Every kind gets `<k>:month:<YYYY-MM>`, `<k>:months` and `<k>:year:<YYYY>`.
/// COE also drops its latest and previous views, posts their listing.
pub fn tags_for(kind: TagKind, period: &Period) -> Vec<CacheTag> {
  let prefix = kind.prefix();
  let mut tags = vec![
    CacheTag(format!("{}:month:{}", prefix, period)),
    CacheTag(format!("{}:months", prefix)),
    CacheTag(format!("{}:year:{:04}", prefix, period.year())),
  ];

  match kind {
    TagKind::Entity(Entity::Coe) => {
      tags.push(CacheTag::new("coe:latest"));
      tags.push(CacheTag::new("coe:previous"));
    }
    TagKind::Posts => tags.push(CacheTag::new("posts:list")),
    TagKind::Entity(_) => {}
  }

  tags
}

#[cfg(test)]
mod tests {
  use super::*;

  fn period(s: &str) -> Period {
    s.parse().unwrap()
  }

  fn strings(tags: &[CacheTag]) -> Vec<&str> {
    tags.iter().map(CacheTag::as_str).collect()
  }

  #[test]
  fn test_deregistrations_tags() {
    let tags = tags_for(TagKind::Entity(Entity::Deregistrations), &period("2024-05"));
    assert_eq!(
      strings(&tags),
      vec![
        "deregistrations:month:2024-05",
        "deregistrations:months",
        "deregistrations:year:2024",
      ]
    );
  }

  #[test]
  fn test_coe_adds_latest_and_previous() {
    let tags = tags_for(TagKind::Entity(Entity::Coe), &period("2023-12"));
    assert_eq!(
      strings(&tags),
      vec![
        "coe:month:2023-12",
        "coe:months",
        "coe:year:2023",
        "coe:latest",
        "coe:previous",
      ]
    );
  }

  #[test]
  fn test_posts_adds_list() {
    let tags = tags_for(TagKind::Posts, &period("2024-06"));
    assert_eq!(tags.len(), 4);
    assert_eq!(tags.last().map(CacheTag::as_str), Some("posts:list"));
  }

  #[test]
  fn test_tags_are_deterministic() {
    let p = period("2024-05");
    assert_eq!(
      tags_for(TagKind::Entity(Entity::Cars), &p),
      tags_for(TagKind::Entity(Entity::Cars), &p)
    );
  }
}
