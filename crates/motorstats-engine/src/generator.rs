//! Blog content generation.

use async_trait::async_trait;
use minijinja::{Environment, Value};
use motorstats_workflow::{Entity, Period, StatRow};
use serde::{Deserialize, Serialize};

const MONTH_NAMES: [&str; 12] = [
  "January",
  "February",
  "March",
  "April",
  "May",
  "June",
  "July",
  "August",
  "September",
  "October",
  "November",
  "December",
];

const DEFAULT_TITLE: &str = "{{ label }} {{ month_name }} {{ year }}";

const DEFAULT_BODY: &str = r#"# {{ label }}: {{ month_name }} {{ year }}

{% if rows %}A total of {{ total }} across {{ rows | length }} categories was recorded for {{ period }}.

| Category | Value |
| --- | ---: |
{% for row in rows %}| {{ row.category }} | {{ row.value }} |
{% endfor %}{% else %}No figures were recorded for {{ period }}.
{% endif %}"#;

/// What a generator is given to write about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationContext {
  pub entity: Entity,
  pub period: Period,
  pub rows: Vec<StatRow>,
}

/// Title and body of a generated post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedContent {
  pub title: String,
  pub content: String,
}

/// Outcome of asking a generator for content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
  Ready(GeneratedContent),
  /// The content is still being produced; ask again later.
  Pending,
}

#[derive(Debug, thiserror::Error)]
#[error("content generation failed: {message}")]
pub struct GenerateError {
  pub message: String,
}

/// Turns a month of statistics into a blog post.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
  async fn generate(&self, ctx: &GenerationContext) -> Result<Generation, GenerateError>;
}

/// Renders posts from minijinja templates. Always ready.
///
/// Templates see `entity`, `label`, `period`, `year`, `month_name`, `total`
/// and `rows` (each with `category` and `value`).
#[derive(Debug, Clone)]
pub struct TemplateGenerator {
  title_template: String,
  body_template: String,
}

impl Default for TemplateGenerator {
  fn default() -> Self {
    Self {
      title_template: DEFAULT_TITLE.to_string(),
      body_template: DEFAULT_BODY.to_string(),
    }
  }
}

impl TemplateGenerator {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_templates(title: impl Into<String>, body: impl Into<String>) -> Self {
    Self {
      title_template: title.into(),
      body_template: body.into(),
    }
  }

  fn render(&self, ctx: &GenerationContext) -> Result<GeneratedContent, GenerateError> {
    let env = Environment::new();
    let month_index = (ctx.period.month() as usize).saturating_sub(1).min(11);
    let total: i64 = ctx.rows.iter().map(|row| row.value).sum();

    let context = Value::from_serialize(serde_json::json!({
      "entity": ctx.entity.as_str(),
      "label": ctx.entity.label(),
      "period": ctx.period.to_string(),
      "year": ctx.period.year(),
      "month_name": MONTH_NAMES[month_index],
      "total": total,
      "rows": ctx.rows.iter().map(|row| serde_json::json!({
        "category": row.category,
        "value": row.value,
      })).collect::<Vec<_>>(),
    }));

    let render = |name: &str, template: &str| {
      env
        .render_str(template, context.clone())
        .map_err(|e| GenerateError {
          message: format!("failed to render {}: {}", name, e),
        })
    };

    Ok(GeneratedContent {
      title: render("title", &self.title_template)?.trim().to_string(),
      content: render("body", &self.body_template)?,
    })
  }
}

#[async_trait]
impl ContentGenerator for TemplateGenerator {
  async fn generate(&self, ctx: &GenerationContext) -> Result<Generation, GenerateError> {
    self.render(ctx).map(Generation::Ready)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn context(rows: Vec<(&str, i64)>) -> GenerationContext {
    let period: Period = "2024-06".parse().unwrap();
    GenerationContext {
      entity: Entity::Cars,
      period,
      rows: rows
        .into_iter()
        .map(|(category, value)| StatRow {
          entity: Entity::Cars,
          period,
          category: category.to_string(),
          value,
        })
        .collect(),
    }
  }

  #[tokio::test]
  async fn test_default_templates() {
    let generation = TemplateGenerator::new()
      .generate(&context(vec![("electric", 40), ("petrol", 60)]))
      .await
      .unwrap();

    let Generation::Ready(content) = generation else {
      panic!("template generator should always be ready");
    };
    assert_eq!(content.title, "Car Registrations June 2024");
    assert!(content.content.contains("A total of 100 across 2 categories"));
    assert!(content.content.contains("| electric | 40 |"));
  }

  #[tokio::test]
  async fn test_no_rows() {
    let Generation::Ready(content) = TemplateGenerator::new()
      .generate(&context(vec![]))
      .await
      .unwrap()
    else {
      panic!("template generator should always be ready");
    };
    assert!(content.content.contains("No figures were recorded for 2024-06."));
  }

  #[tokio::test]
  async fn test_bad_template_is_error() {
    let generator = TemplateGenerator::with_templates("{{ label", "body");
    assert!(generator.generate(&context(vec![])).await.is_err());
  }
}
