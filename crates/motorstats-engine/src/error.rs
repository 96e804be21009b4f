//! Engine errors.

use motorstats_workflow::{RunId, StepName, WorkflowError, WorkflowKind};

/// Errors that can occur while starting, driving or controlling a run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  /// The payload does not match the workflow kind. No run was created.
  #[error("invalid payload: {0}")]
  InvalidPayload(#[from] WorkflowError),

  /// A step failed permanently or exhausted its retries.
  #[error("step '{step}' failed after {attempts} attempt(s): {error}")]
  StepFailed {
    step: StepName,
    attempts: u32,
    error: String,
  },

  /// Execution was cancelled.
  #[error("execution cancelled")]
  Cancelled,

  #[error("run not found: {run_id}")]
  RunNotFound { run_id: RunId },

  /// The run already completed or failed.
  #[error("run {run_id} is already terminal")]
  RunTerminal { run_id: RunId },

  #[error("step '{step}' is not part of {kind}")]
  StepNotInKind { kind: WorkflowKind, step: StepName },

  /// The run is being driven by this engine right now.
  #[error("run {run_id} is already executing")]
  RunActive { run_id: RunId },

  #[error("store error: {0}")]
  Store(#[from] motorstats_store::Error),
}

/// Failure of one attempt of one step body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
  /// Worth retrying: network errors, timeouts, unavailable backends.
  #[error("{0}")]
  Transient(String),

  /// Retrying cannot help.
  #[error("{0}")]
  Permanent(String),
}

impl StepError {
  pub fn is_transient(&self) -> bool {
    matches!(self, StepError::Transient(_))
  }

  pub(crate) fn transient(e: impl std::fmt::Display) -> Self {
    StepError::Transient(e.to_string())
  }

  pub(crate) fn permanent(e: impl std::fmt::Display) -> Self {
    StepError::Permanent(e.to_string())
  }
}

impl From<motorstats_store::Error> for StepError {
  fn from(e: motorstats_store::Error) -> Self {
    match e {
      motorstats_store::Error::Database(_) => StepError::Transient(e.to_string()),
      motorstats_store::Error::NotFound(_) | motorstats_store::Error::Corrupt { .. } => {
        StepError::Permanent(e.to_string())
      }
    }
  }
}
