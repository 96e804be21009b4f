use motorstats_engine::EngineError;

/// Error type for trigger operations.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
  /// The credential did not match any configured secret or token.
  #[error("unauthorized")]
  Unauthorized,

  /// The payload does not match the workflow kind. No run was created.
  #[error("invalid payload: {message}")]
  InvalidPayload { message: String },

  #[error("engine error: {0}")]
  Engine(EngineError),

  /// The trigger runner is no longer accepting requests.
  #[error("trigger runner channel closed")]
  Closed,
}

impl From<EngineError> for TriggerError {
  fn from(e: EngineError) -> Self {
    match e {
      EngineError::InvalidPayload(inner) => TriggerError::InvalidPayload {
        message: inner.to_string(),
      },
      other => TriggerError::Engine(other),
    }
  }
}
