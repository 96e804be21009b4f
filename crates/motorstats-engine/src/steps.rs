//! The step library: one body per [`StepName`].
//!
//! A body reads the run input and the results of earlier steps from the log,
//! performs its side effect through the run context, and returns a JSON
//! result that is checkpointed verbatim. Bodies never look at their own
//! record; replay is handled by the engine before a body is reached.

use chrono::Utc;
use motorstats_cache::{TagKind, tags_for};
use motorstats_config::AnnouncePolicy;
use motorstats_workflow::{
  Entity, Period, Post, RunInput, StatRow, StepName, WorkflowKind, WorkflowRun, slugify,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;
use uuid::Uuid;

use crate::context::RunContext;
use crate::error::StepError;
use crate::generator::{Generation, GenerationContext};
use crate::plan::StepLog;

/// What a step body produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutput {
  /// Done; the value is checkpointed as the step's result.
  Complete(Value),
  /// Not done yet; re-enter the step when the run is resumed.
  Suspend,
}

/// Everything a step body may look at.
pub struct StepContext<'a> {
  pub ctx: &'a RunContext,
  pub run: &'a WorkflowRun,
  pub input: &'a RunInput,
  pub records: &'a StepLog,
}

/// Stored result of `generate_content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Draft {
  title: String,
  slug: String,
  content: String,
}

/// Whether a failed attempt may run again. The announcement gets a single
/// attempt: a channel may have delivered before the failure surfaced.
pub fn is_retryable(step: StepName) -> bool {
  step != StepName::PublishAnnouncement
}

pub async fn run_step(step: StepName, sc: &StepContext<'_>) -> Result<StepOutput, StepError> {
  let output = match step {
    StepName::FetchSourceData => fetch_source_data(sc).await?,
    StepName::PersistData => persist_data(sc).await?,
    StepName::InvalidateDataCache => {
      let entity = sc.entity()?;
      invalidate(sc, TagKind::Entity(entity)).await?
    }
    StepName::CheckExistingArtifact => check_existing_artifact(sc).await?,
    StepName::GenerateContent => return generate_content(sc).await,
    StepName::SavePost => save_post(sc).await?,
    StepName::InvalidatePostCache => invalidate(sc, TagKind::Posts).await?,
    StepName::PublishAnnouncement => publish_announcement(sc).await?,
    StepName::ResolvePeriod => resolve_period(sc).await?,
  };
  Ok(StepOutput::Complete(output))
}

impl StepContext<'_> {
  fn entity(&self) -> Result<Entity, StepError> {
    self
      .input
      .data_type
      .ok_or_else(|| StepError::Permanent("run input has no data_type".to_string()))
  }

  /// Result of an earlier step, which must have succeeded.
  fn result_of(&self, step: StepName) -> Result<&Value, StepError> {
    self
      .records
      .get(&step)
      .filter(|r| r.is_succeeded())
      .and_then(|r| r.result.as_ref())
      .ok_or_else(|| StepError::Permanent(format!("step '{}' has no stored result", step)))
  }

  fn field_of<T: DeserializeOwned>(&self, step: StepName, field: &str) -> Result<T, StepError> {
    let value = self.result_of(step)?.get(field).cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|e| {
      StepError::Permanent(format!("malformed '{}' in result of '{}': {}", field, step, e))
    })
  }

  /// The month this run writes about.
  fn period(&self) -> Result<Period, StepError> {
    let period: Option<Period> = match self.run.kind {
      WorkflowKind::DataRefresh(_) => match self.input.month {
        Some(month) => Some(month),
        None => self.field_of(StepName::FetchSourceData, "period")?,
      },
      WorkflowKind::ContentPublish => self.input.month,
      WorkflowKind::CacheRegenerate => Some(self.field_of(StepName::ResolvePeriod, "period")?),
    };
    period.ok_or_else(|| StepError::Permanent("run has no target period".to_string()))
  }
}

fn to_json(value: impl Serialize) -> Result<Value, StepError> {
  serde_json::to_value(value).map_err(StepError::permanent)
}

async fn fetch_source_data(sc: &StepContext<'_>) -> Result<Value, StepError> {
  let entity = sc.entity()?;
  let month = sc.input.month;

  let rows = sc
    .ctx
    .source
    .fetch(entity, month.as_ref())
    .await
    .map_err(|e| {
      if e.is_transient() {
        StepError::transient(e)
      } else {
        StepError::permanent(e)
      }
    })?;

  let rows: Vec<StatRow> = rows
    .into_iter()
    .filter(|row| row.entity == entity)
    .filter(|row| month.is_none_or(|m| row.period == m))
    .collect();
  let period = month.or_else(|| rows.iter().map(|row| row.period).max());

  debug!(run_id = %sc.run.id, entity = %entity, rows = rows.len(), "source_fetched");
  Ok(json!({ "rows": to_json(&rows)?, "period": period }))
}

async fn persist_data(sc: &StepContext<'_>) -> Result<Value, StepError> {
  let rows: Vec<StatRow> = sc.field_of(StepName::FetchSourceData, "rows")?;
  let period: Option<Period> = sc.field_of(StepName::FetchSourceData, "period")?;

  let upserted = sc.ctx.data.upsert_rows(&rows).await?;
  Ok(json!({ "upserted": upserted, "period": period }))
}

async fn invalidate(sc: &StepContext<'_>, kind: TagKind) -> Result<Value, StepError> {
  let period = sc.period()?;
  let tags = tags_for(kind, &period);
  sc
    .ctx
    .cache
    .invalidate(&tags)
    .await
    .map_err(StepError::transient)?;
  to_json(&tags)
}

async fn check_existing_artifact(sc: &StepContext<'_>) -> Result<Value, StepError> {
  let post = sc.ctx.data.find_post(&sc.period()?, sc.entity()?).await?;
  to_json(&post)
}

async fn generate_content(sc: &StepContext<'_>) -> Result<StepOutput, StepError> {
  let entity = sc.entity()?;
  let period = sc.period()?;
  let rows = sc.ctx.data.rows_for_period(entity, &period).await?;

  let generation = sc
    .ctx
    .generator
    .generate(&GenerationContext {
      entity,
      period,
      rows,
    })
    .await
    .map_err(StepError::transient)?;

  match generation {
    Generation::Ready(content) => {
      let draft = Draft {
        slug: slugify(&content.title),
        title: content.title,
        content: content.content,
      };
      Ok(StepOutput::Complete(to_json(&draft)?))
    }
    Generation::Pending => Ok(StepOutput::Suspend),
  }
}

/// Post id owned by this run, stable across attempts of `save_post`.
fn post_id(run: &WorkflowRun) -> Uuid {
  run
    .idempotency_key(StepName::SavePost)
    .as_str()
    .get(..32)
    .and_then(|hex| Uuid::parse_str(hex).ok())
    .unwrap_or_else(Uuid::new_v4)
}

async fn save_post(sc: &StepContext<'_>) -> Result<Value, StepError> {
  let draft: Draft = serde_json::from_value(sc.result_of(StepName::GenerateContent)?.clone())
    .map_err(|e| StepError::Permanent(format!("malformed draft: {}", e)))?;

  let post = Post {
    id: post_id(sc.run),
    title: draft.title,
    slug: draft.slug,
    data_type: sc.entity()?,
    month: sc.period()?,
    content: draft.content,
    published_at: Some(Utc::now()),
  };

  let inserted = sc.ctx.data.insert_post(&post).await?;
  // A retry after a commit whose checkpoint was lost finds its own post.
  let created = inserted.created() || inserted.post().id == post.id;

  Ok(json!({ "post": to_json(inserted.post())?, "created": created }))
}

async fn publish_announcement(sc: &StepContext<'_>) -> Result<Value, StepError> {
  let post: Post = sc.field_of(StepName::SavePost, "post")?;
  let settings = &sc.ctx.settings;

  let link = format!("{}/blog/{}", settings.site_url, post.slug);
  let message = format!("New post: {}", post.title);
  let results = sc.ctx.publisher.publish_all(&message, Some(&link)).await;

  if settings.announce_policy == AnnouncePolicy::AtLeastOne
    && !results.is_empty()
    && results.iter().all(|r| !r.success)
  {
    let errors: Vec<String> = results
      .iter()
      .map(|r| format!("{}: {}", r.channel, r.error.as_deref().unwrap_or("unknown error")))
      .collect();
    return Err(StepError::Permanent(format!(
      "every channel failed ({})",
      errors.join("; ")
    )));
  }

  to_json(&results)
}

async fn resolve_period(sc: &StepContext<'_>) -> Result<Value, StepError> {
  let entity = sc.entity()?;
  let period = match sc.input.month {
    Some(month) => month,
    None => sc
      .ctx
      .data
      .max_period(entity)
      .await?
      .ok_or_else(|| StepError::Permanent(format!("no data stored for '{}'", entity)))?,
  };
  Ok(json!({ "period": period }))
}
