//! Motorstats Store
//!
//! This crate provides the storage traits and implementations used by the
//! workflow engine. There are two stores:
//!
//! - [`RunStore`] persists workflow runs and their step checkpoints. The
//!   engine reads it back to replay finished steps and to resume runs.
//! - [`DataStore`] persists the statistics rows and the generated posts. It
//!   enforces one post per `(month, data_type)`.
//!
//! Both have an in-memory implementation for tests and dry runs, and a
//! SQLite implementation ([`SqliteStore`]) for everything else.

mod memory;
mod sqlite;

pub use memory::{InMemoryDataStore, InMemoryRunStore};
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use motorstats_workflow::{
  Entity, Period, Post, RunId, RunStatus, StatRow, StepName, StepRecord, WorkflowRun,
};

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// A stored value could not be read back into its domain type.
  #[error("corrupt record: {message}")]
  Corrupt { message: String },
}

impl Error {
  pub(crate) fn corrupt(message: impl std::fmt::Display) -> Self {
    Error::Corrupt {
      message: message.to_string(),
    }
  }
}

/// Result of inserting a post under its natural key.
#[derive(Debug, Clone, PartialEq)]
pub enum PostInsert {
  /// This call stored the post.
  Created(Post),
  /// A post for the same `(month, data_type)` was already stored; it is
  /// returned unchanged.
  Existing(Post),
}

impl PostInsert {
  pub fn post(&self) -> &Post {
    match self {
      PostInsert::Created(post) | PostInsert::Existing(post) => post,
    }
  }

  pub fn created(&self) -> bool {
    matches!(self, PostInsert::Created(_))
  }
}

/// Storage for workflow runs and step checkpoints.
#[async_trait]
pub trait RunStore: Send + Sync {
  /// Create a new run.
  async fn create_run(&self, run: &WorkflowRun) -> Result<(), Error>;

  /// Get a run by ID.
  async fn get_run(&self, run_id: &RunId) -> Result<WorkflowRun, Error>;

  /// Move a run to `status` unless it is already terminal.
  ///
  /// Returns `false` when the run is terminal or does not exist. Moving to a
  /// terminal status stamps `completed_at`.
  async fn transition_run(
    &self,
    run_id: &RunId,
    status: RunStatus,
    error: Option<&str>,
  ) -> Result<bool, Error>;

  /// List the most recent runs, newest first.
  async fn list_runs(&self, limit: usize) -> Result<Vec<WorkflowRun>, Error>;

  /// Get the checkpoint of one step, if it was ever written.
  async fn get_step(&self, run_id: &RunId, step: StepName) -> Result<Option<StepRecord>, Error>;

  /// Insert or replace the checkpoint of one step.
  async fn put_step(&self, record: &StepRecord) -> Result<(), Error>;

  /// Every checkpoint of a run.
  async fn list_steps(&self, run_id: &RunId) -> Result<Vec<StepRecord>, Error>;
}

/// Storage for statistics rows and generated posts.
#[async_trait]
pub trait DataStore: Send + Sync {
  /// Insert or update rows by `(entity, period, category)`. Returns the
  /// number of rows written.
  async fn upsert_rows(&self, rows: &[StatRow]) -> Result<usize, Error>;

  /// Rows of one entity for one month, ordered by category.
  async fn rows_for_period(&self, entity: Entity, period: &Period) -> Result<Vec<StatRow>, Error>;

  /// The newest month with rows for `entity`.
  async fn max_period(&self, entity: Entity) -> Result<Option<Period>, Error>;

  async fn find_post(&self, month: &Period, data_type: Entity) -> Result<Option<Post>, Error>;

  /// Store a post unless one already exists for its `(month, data_type)`.
  async fn insert_post(&self, post: &Post) -> Result<PostInsert, Error>;
}
