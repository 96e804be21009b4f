use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use motorstats_workflow::{
  Entity, IdempotencyKey, Period, Post, RunId, RunStatus, StatRow, StepName, StepRecord,
  WorkflowRun,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, SqlitePool};

use crate::{DataStore, Error, PostInsert, RunStore};

/// SQLite-based store implementation of both [`RunStore`] and [`DataStore`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if needed) the database file at `path`.
  pub async fn open(path: &Path) -> Result<Self, Error> {
    let options = SqliteConnectOptions::new()
      .filename(path)
      .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
      .max_connections(4)
      .connect_with(options)
      .await?;
    Ok(Self::new(pool))
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await
  }

  pub fn pool(&self) -> &SqlitePool {
    &self.pool
  }
}

#[derive(FromRow)]
struct RunRow {
  id: String,
  kind: String,
  payload: Json<serde_json::Value>,
  status: String,
  error: Option<String>,
  created_at: DateTime<Utc>,
  completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<RunRow> for WorkflowRun {
  type Error = Error;

  fn try_from(row: RunRow) -> Result<Self, Self::Error> {
    Ok(WorkflowRun {
      id: row.id.parse().map_err(Error::corrupt)?,
      kind: row.kind.parse().map_err(Error::corrupt)?,
      payload: row.payload.0,
      status: row.status.parse().map_err(Error::corrupt)?,
      error: row.error,
      created_at: row.created_at,
      completed_at: row.completed_at,
    })
  }
}

#[derive(FromRow)]
struct StepRow {
  run_id: String,
  step: String,
  idempotency_key: String,
  attempt_count: i64,
  status: String,
  result: Option<Json<serde_json::Value>>,
  error: Option<String>,
  updated_at: DateTime<Utc>,
}

impl TryFrom<StepRow> for StepRecord {
  type Error = Error;

  fn try_from(row: StepRow) -> Result<Self, Self::Error> {
    Ok(StepRecord {
      run_id: row.run_id.parse().map_err(Error::corrupt)?,
      step: row.step.parse().map_err(Error::corrupt)?,
      idempotency_key: IdempotencyKey::from_stored(row.idempotency_key),
      attempt_count: u32::try_from(row.attempt_count).map_err(Error::corrupt)?,
      status: row.status.parse().map_err(Error::corrupt)?,
      result: row.result.map(|json| json.0),
      error: row.error,
      updated_at: row.updated_at,
    })
  }
}

#[derive(FromRow)]
struct StatRowRow {
  entity: String,
  period: String,
  category: String,
  value: i64,
}

impl TryFrom<StatRowRow> for StatRow {
  type Error = Error;

  fn try_from(row: StatRowRow) -> Result<Self, Self::Error> {
    Ok(StatRow {
      entity: row.entity.parse().map_err(Error::corrupt)?,
      period: row.period.parse().map_err(Error::corrupt)?,
      category: row.category,
      value: row.value,
    })
  }
}

#[derive(FromRow)]
struct PostRow {
  id: String,
  title: String,
  slug: String,
  data_type: String,
  month: String,
  content: String,
  published_at: Option<DateTime<Utc>>,
}

impl TryFrom<PostRow> for Post {
  type Error = Error;

  fn try_from(row: PostRow) -> Result<Self, Self::Error> {
    Ok(Post {
      id: row.id.parse().map_err(Error::corrupt)?,
      title: row.title,
      slug: row.slug,
      data_type: row.data_type.parse().map_err(Error::corrupt)?,
      month: row.month.parse().map_err(Error::corrupt)?,
      content: row.content,
      published_at: row.published_at,
    })
  }
}

#[async_trait]
impl RunStore for SqliteStore {
  async fn create_run(&self, run: &WorkflowRun) -> Result<(), Error> {
    sqlx::query(
      r#"
      INSERT INTO workflow_runs (id, kind, payload, status, error, created_at, completed_at)
      VALUES (?, ?, ?, ?, ?, ?, ?)
      "#,
    )
    .bind(run.id.to_string())
    .bind(run.kind.to_string())
    .bind(Json(&run.payload))
    .bind(run.status.as_str())
    .bind(&run.error)
    .bind(run.created_at)
    .bind(run.completed_at)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_run(&self, run_id: &RunId) -> Result<WorkflowRun, Error> {
    let row: Option<RunRow> = sqlx::query_as(
      r#"
      SELECT id, kind, payload, status, error, created_at, completed_at
      FROM workflow_runs
      WHERE id = ?
      "#,
    )
    .bind(run_id.to_string())
    .fetch_optional(&self.pool)
    .await?;

    row
      .ok_or_else(|| Error::NotFound(format!("run {}", run_id)))?
      .try_into()
  }

  async fn transition_run(
    &self,
    run_id: &RunId,
    status: RunStatus,
    error: Option<&str>,
  ) -> Result<bool, Error> {
    let completed_at = status.is_terminal().then(Utc::now);
    let result = sqlx::query(
      r#"
      UPDATE workflow_runs
      SET status = ?, error = ?, completed_at = COALESCE(?, completed_at)
      WHERE id = ? AND status NOT IN ('completed', 'failed')
      "#,
    )
    .bind(status.as_str())
    .bind(error)
    .bind(completed_at)
    .bind(run_id.to_string())
    .execute(&self.pool)
    .await?;

    Ok(result.rows_affected() == 1)
  }

  async fn list_runs(&self, limit: usize) -> Result<Vec<WorkflowRun>, Error> {
    let rows: Vec<RunRow> = sqlx::query_as(
      r#"
      SELECT id, kind, payload, status, error, created_at, completed_at
      FROM workflow_runs
      ORDER BY created_at DESC
      LIMIT ?
      "#,
    )
    .bind(i64::try_from(limit).unwrap_or(i64::MAX))
    .fetch_all(&self.pool)
    .await?;

    rows.into_iter().map(WorkflowRun::try_from).collect()
  }

  async fn get_step(&self, run_id: &RunId, step: StepName) -> Result<Option<StepRecord>, Error> {
    let row: Option<StepRow> = sqlx::query_as(
      r#"
      SELECT run_id, step, idempotency_key, attempt_count, status, result, error, updated_at
      FROM step_records
      WHERE run_id = ? AND step = ?
      "#,
    )
    .bind(run_id.to_string())
    .bind(step.as_str())
    .fetch_optional(&self.pool)
    .await?;

    row.map(StepRecord::try_from).transpose()
  }

  async fn put_step(&self, record: &StepRecord) -> Result<(), Error> {
    sqlx::query(
      r#"
      INSERT INTO step_records (run_id, step, idempotency_key, attempt_count, status, result, error, updated_at)
      VALUES (?, ?, ?, ?, ?, ?, ?, ?)
      ON CONFLICT (run_id, step) DO UPDATE SET
        attempt_count = excluded.attempt_count,
        status = excluded.status,
        result = excluded.result,
        error = excluded.error,
        updated_at = excluded.updated_at
      "#,
    )
    .bind(record.run_id.to_string())
    .bind(record.step.as_str())
    .bind(record.idempotency_key.as_str())
    .bind(i64::from(record.attempt_count))
    .bind(record.status.as_str())
    .bind(record.result.as_ref().map(Json))
    .bind(&record.error)
    .bind(record.updated_at)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn list_steps(&self, run_id: &RunId) -> Result<Vec<StepRecord>, Error> {
    let rows: Vec<StepRow> = sqlx::query_as(
      r#"
      SELECT run_id, step, idempotency_key, attempt_count, status, result, error, updated_at
      FROM step_records
      WHERE run_id = ?
      ORDER BY updated_at ASC
      "#,
    )
    .bind(run_id.to_string())
    .fetch_all(&self.pool)
    .await?;

    rows.into_iter().map(StepRecord::try_from).collect()
  }
}

#[async_trait]
impl DataStore for SqliteStore {
  async fn upsert_rows(&self, rows: &[StatRow]) -> Result<usize, Error> {
    let mut tx = self.pool.begin().await?;
    for row in rows {
      sqlx::query(
        r#"
        INSERT INTO stat_rows (entity, period, category, value)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (entity, period, category) DO UPDATE SET value = excluded.value
        "#,
      )
      .bind(row.entity.as_str())
      .bind(row.period.to_string())
      .bind(&row.category)
      .bind(row.value)
      .execute(&mut *tx)
      .await?;
    }
    tx.commit().await?;

    Ok(rows.len())
  }

  async fn rows_for_period(&self, entity: Entity, period: &Period) -> Result<Vec<StatRow>, Error> {
    let rows: Vec<StatRowRow> = sqlx::query_as(
      r#"
      SELECT entity, period, category, value
      FROM stat_rows
      WHERE entity = ? AND period = ?
      ORDER BY category ASC
      "#,
    )
    .bind(entity.as_str())
    .bind(period.to_string())
    .fetch_all(&self.pool)
    .await?;

    rows.into_iter().map(StatRow::try_from).collect()
  }

  async fn max_period(&self, entity: Entity) -> Result<Option<Period>, Error> {
    // YYYY-MM sorts lexically in chronological order.
    let max: Option<String> =
      sqlx::query_scalar("SELECT MAX(period) FROM stat_rows WHERE entity = ?")
        .bind(entity.as_str())
        .fetch_one(&self.pool)
        .await?;

    max
      .map(|p| p.parse().map_err(Error::corrupt))
      .transpose()
  }

  async fn find_post(&self, month: &Period, data_type: Entity) -> Result<Option<Post>, Error> {
    let row: Option<PostRow> = sqlx::query_as(
      r#"
      SELECT id, title, slug, data_type, month, content, published_at
      FROM posts
      WHERE month = ? AND data_type = ?
      "#,
    )
    .bind(month.to_string())
    .bind(data_type.as_str())
    .fetch_optional(&self.pool)
    .await?;

    row.map(Post::try_from).transpose()
  }

  async fn insert_post(&self, post: &Post) -> Result<PostInsert, Error> {
    let result = sqlx::query(
      r#"
      INSERT INTO posts (id, title, slug, data_type, month, content, published_at)
      VALUES (?, ?, ?, ?, ?, ?, ?)
      ON CONFLICT (month, data_type) DO NOTHING
      "#,
    )
    .bind(post.id.to_string())
    .bind(&post.title)
    .bind(&post.slug)
    .bind(post.data_type.as_str())
    .bind(post.month.to_string())
    .bind(&post.content)
    .bind(post.published_at)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 1 {
      return Ok(PostInsert::Created(post.clone()));
    }

    let existing = self
      .find_post(&post.month, post.data_type)
      .await?
      .ok_or_else(|| {
        Error::corrupt(format!(
          "post insert for {}/{} conflicted but no post is stored",
          post.month, post.data_type
        ))
      })?;
    Ok(PostInsert::Existing(existing))
  }
}
