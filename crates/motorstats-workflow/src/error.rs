use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
  #[error("invalid period '{0}': expected YYYY-MM")]
  InvalidPeriod(String),

  #[error("unknown entity: {0}")]
  UnknownEntity(String),

  #[error("unknown workflow kind: {0}")]
  UnknownKind(String),

  #[error("unknown step: {0}")]
  UnknownStep(String),

  #[error("unknown status: {0}")]
  UnknownStatus(String),

  #[error("invalid payload for {kind}: {message}")]
  InvalidPayload { kind: String, message: String },
}
