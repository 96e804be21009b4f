use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WorkflowError;
use crate::key::IdempotencyKey;
use crate::kind::WorkflowKind;
use crate::step::StepName;

/// Unique identifier of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
  pub fn new() -> Self {
    Self(Uuid::new_v4())
  }

  pub fn as_uuid(&self) -> &Uuid {
    &self.0
  }
}

impl Default for RunId {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Display for RunId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl FromStr for RunId {
  type Err = uuid::Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Uuid::parse_str(s).map(Self)
  }
}

/// Status of a workflow run.
///
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
  Pending,
  Running,
  Completed,
  Failed,
}

impl RunStatus {
  pub fn is_terminal(&self) -> bool {
    matches!(self, RunStatus::Completed | RunStatus::Failed)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      RunStatus::Pending => "pending",
      RunStatus::Running => "running",
      RunStatus::Completed => "completed",
      RunStatus::Failed => "failed",
    }
  }
}

impl fmt::Display for RunStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for RunStatus {
  type Err = WorkflowError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "pending" => Ok(RunStatus::Pending),
      "running" => Ok(RunStatus::Running),
      "completed" => Ok(RunStatus::Completed),
      "failed" => Ok(RunStatus::Failed),
      other => Err(WorkflowError::UnknownStatus(other.to_string())),
    }
  }
}

/// A workflow run as persisted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
  pub id: RunId,
  pub kind: WorkflowKind,
  pub payload: serde_json::Value,
  pub status: RunStatus,
  pub error: Option<String>,
  pub created_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
  /// Create a new run in `Pending`.
  pub fn new(kind: WorkflowKind, payload: serde_json::Value) -> Self {
    Self {
      id: RunId::new(),
      kind,
      payload,
      status: RunStatus::Pending,
      error: None,
      created_at: Utc::now(),
      completed_at: None,
    }
  }

  pub fn idempotency_key(&self, step: StepName) -> IdempotencyKey {
    IdempotencyKey::derive(&self.id, step, &self.payload)
  }
}

/// Status of a single checkpointed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
  NotStarted,
  /// The body was entered and has not reported back yet.
  InProgress,
  /// The body asked to be re-entered later.
  Suspended,
  Succeeded,
  Failed,
}

impl StepStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      StepStatus::NotStarted => "not_started",
      StepStatus::InProgress => "in_progress",
      StepStatus::Suspended => "suspended",
      StepStatus::Succeeded => "succeeded",
      StepStatus::Failed => "failed",
    }
  }
}

impl fmt::Display for StepStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for StepStatus {
  type Err = WorkflowError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "not_started" => Ok(StepStatus::NotStarted),
      "in_progress" => Ok(StepStatus::InProgress),
      "suspended" => Ok(StepStatus::Suspended),
      "succeeded" => Ok(StepStatus::Succeeded),
      "failed" => Ok(StepStatus::Failed),
      other => Err(WorkflowError::UnknownStatus(other.to_string())),
    }
  }
}

/// The checkpoint of one step of one run.
///
/// `attempt_count` counts finished attempts, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
  pub run_id: RunId,
  pub step: StepName,
  pub idempotency_key: IdempotencyKey,
  pub attempt_count: u32,
  pub status: StepStatus,
  pub result: Option<serde_json::Value>,
  pub error: Option<String>,
  pub updated_at: DateTime<Utc>,
}

impl StepRecord {
  pub fn new(run: &WorkflowRun, step: StepName) -> Self {
    Self {
      run_id: run.id,
      step,
      idempotency_key: run.idempotency_key(step),
      attempt_count: 0,
      status: StepStatus::NotStarted,
      result: None,
      error: None,
      updated_at: Utc::now(),
    }
  }

  pub fn is_succeeded(&self) -> bool {
    self.status == StepStatus::Succeeded
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::Entity;

  #[test]
  fn test_new_run_is_pending() {
    let run = WorkflowRun::new(WorkflowKind::DataRefresh(Entity::Cars), serde_json::json!({}));
    assert_eq!(run.status, RunStatus::Pending);
    assert!(run.completed_at.is_none());
    assert!(!run.status.is_terminal());
  }

  #[test]
  fn test_step_record_key_matches_run() {
    let run = WorkflowRun::new(WorkflowKind::ContentPublish, serde_json::json!({ "month": "2024-06" }));
    let record = StepRecord::new(&run, StepName::SavePost);
    assert_eq!(record.idempotency_key, run.idempotency_key(StepName::SavePost));
    assert_eq!(record.status, StepStatus::NotStarted);
    assert_eq!(record.attempt_count, 0);
  }

  #[test]
  fn test_run_id_parse() {
    let id = RunId::new();
    assert_eq!(id.to_string().parse::<RunId>().unwrap(), id);
    assert!("not-a-uuid".parse::<RunId>().is_err());
  }
}
