use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{Entity, Period};

/// One row of monthly statistics.
///
/// Identified by its natural key `(entity, period, category)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatRow {
  pub entity: Entity,
  pub period: Period,
  pub category: String,
  pub value: i64,
}

/// A generated blog post, unique per `(month, data_type)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
  pub id: Uuid,
  pub title: String,
  pub slug: String,
  pub data_type: Entity,
  pub month: Period,
  pub content: String,
  pub published_at: Option<DateTime<Utc>>,
}

impl Post {
  pub fn new(data_type: Entity, month: Period, title: String, content: String) -> Self {
    let slug = slugify(&title);
    Self {
      id: Uuid::new_v4(),
      title,
      slug,
      data_type,
      month,
      content,
      published_at: Some(Utc::now()),
    }
  }
}

/// Lowercase a title into a URL slug of ascii alphanumerics and dashes.
pub fn slugify(title: &str) -> String {
  let mut slug = String::with_capacity(title.len());
  let mut pending_dash = false;

  for c in title.chars() {
    if c.is_ascii_alphanumeric() {
      if pending_dash && !slug.is_empty() {
        slug.push('-');
      }
      pending_dash = false;
      slug.push(c.to_ascii_lowercase());
    } else {
      pending_dash = true;
    }
  }

  slug
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_slugify() {
    assert_eq!(slugify("COE Results: 2024-06"), "coe-results-2024-06");
    assert_eq!(slugify("  Car   Registrations!! "), "car-registrations");
    assert_eq!(slugify("Ünïcode & more"), "n-code-more");
    assert_eq!(slugify("---"), "");
  }

  #[test]
  fn test_post_new_derives_slug() {
    let month: Period = "2024-06".parse().unwrap();
    let post = Post::new(Entity::Cars, month, "Car Registrations June 2024".into(), "body".into());
    assert_eq!(post.slug, "car-registrations-june-2024");
    assert!(post.published_at.is_some());
  }
}
