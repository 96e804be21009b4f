//! The authenticated entry points that start workflow runs.

use motorstats_config::TriggerConfig;
use motorstats_engine::{RunStatusView, WorkflowEngine};
use motorstats_workflow::{Entity, Period, RunId, WorkflowKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{info, instrument, warn};

use crate::auth::{Authenticator, Credential};
use crate::error::TriggerError;

/// A request to start one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRequest {
  pub kind: WorkflowKind,
  #[serde(default)]
  pub payload: Value,
}

impl TriggerRequest {
  pub fn new(kind: WorkflowKind, payload: Value) -> Self {
    Self { kind, payload }
  }

  /// Refresh `entity`, optionally for a fixed month.
  pub fn data_refresh(entity: Entity, month: Option<Period>) -> Self {
    let mut payload = Map::new();
    if let Some(month) = month {
      payload.insert("month".to_string(), json!(month));
    }
    Self::new(WorkflowKind::DataRefresh(entity), Value::Object(payload))
  }

  pub fn content_publish(month: Period, data_type: Entity) -> Self {
    Self::new(
      WorkflowKind::ContentPublish,
      json!({ "month": month, "data_type": data_type }),
    )
  }

  /// Invalidate `data_type`'s views for `month`, or for its newest stored
  /// month when none is given.
  pub fn cache_regenerate(data_type: Entity, month: Option<Period>) -> Self {
    let mut payload = Map::new();
    payload.insert("data_type".to_string(), json!(data_type));
    if let Some(month) = month {
      payload.insert("month".to_string(), json!(month));
    }
    Self::new(WorkflowKind::CacheRegenerate, Value::Object(payload))
  }
}

/// Returned as soon as the run exists; the run continues in the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerResponse {
  pub run_id: RunId,
}

/// Authenticates callers and starts runs on the engine.
#[derive(Clone)]
pub struct TriggerBoundary {
  engine: WorkflowEngine,
  auth: Authenticator,
}

impl TriggerBoundary {
  pub fn new(engine: WorkflowEngine, config: &TriggerConfig) -> Self {
    Self {
      engine,
      auth: Authenticator::new(config),
    }
  }

  pub fn engine(&self) -> &WorkflowEngine {
    &self.engine
  }

  pub async fn data_refresh(
    &self,
    credential: &Credential,
    entity: Entity,
    month: Option<Period>,
  ) -> Result<TriggerResponse, TriggerError> {
    self
      .trigger(credential, TriggerRequest::data_refresh(entity, month))
      .await
  }

  pub async fn content_publish(
    &self,
    credential: &Credential,
    month: Period,
    data_type: Entity,
  ) -> Result<TriggerResponse, TriggerError> {
    self
      .trigger(credential, TriggerRequest::content_publish(month, data_type))
      .await
  }

  pub async fn cache_regenerate(
    &self,
    credential: &Credential,
    data_type: Entity,
    month: Option<Period>,
  ) -> Result<TriggerResponse, TriggerError> {
    self
      .trigger(credential, TriggerRequest::cache_regenerate(data_type, month))
      .await
  }

  /// Start a run of any kind.
  #[instrument(name = "trigger", skip(self, credential, request), fields(kind = %request.kind))]
  pub async fn trigger(
    &self,
    credential: &Credential,
    request: TriggerRequest,
  ) -> Result<TriggerResponse, TriggerError> {
    self.authenticate(credential)?;

    let run_id = self.engine.start(request.kind, request.payload).await?;
    info!(run_id = %run_id, "run_triggered");
    Ok(TriggerResponse { run_id })
  }

  /// A run and its step log.
  pub async fn status(
    &self,
    credential: &Credential,
    run_id: &RunId,
  ) -> Result<RunStatusView, TriggerError> {
    self.authenticate(credential)?;
    Ok(self.engine.status(run_id).await?)
  }

  fn authenticate(&self, credential: &Credential) -> Result<(), TriggerError> {
    self.auth.check(credential).inspect_err(|_| {
      warn!(credential = ?credential, "trigger_unauthorized");
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_request_payloads() {
    let month: Period = "2024-06".parse().unwrap();

    assert_eq!(
      TriggerRequest::data_refresh(Entity::Coe, None).payload,
      json!({})
    );
    assert_eq!(
      TriggerRequest::data_refresh(Entity::Coe, Some(month)).payload,
      json!({ "month": "2024-06" })
    );
    assert_eq!(
      TriggerRequest::content_publish(month, Entity::Cars).payload,
      json!({ "month": "2024-06", "data_type": "cars" })
    );
    assert_eq!(
      TriggerRequest::cache_regenerate(Entity::Deregistrations, None).payload,
      json!({ "data_type": "deregistrations" })
    );
  }

  #[test]
  fn test_request_deserializes_without_payload() {
    let request: TriggerRequest =
      serde_json::from_value(json!({ "kind": "data_refresh:cars" })).unwrap();

    assert_eq!(request.kind, WorkflowKind::DataRefresh(Entity::Cars));
    assert!(request.payload.is_null());
  }
}
