use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, Period};
use crate::error::WorkflowError;
use crate::step::StepName;

const DATA_REFRESH_STEPS: &[StepName] = &[
  StepName::FetchSourceData,
  StepName::PersistData,
  StepName::InvalidateDataCache,
  StepName::CheckExistingArtifact,
  StepName::GenerateContent,
  StepName::SavePost,
  StepName::InvalidatePostCache,
  StepName::PublishAnnouncement,
];

const CONTENT_PUBLISH_STEPS: &[StepName] = &[
  StepName::CheckExistingArtifact,
  StepName::GenerateContent,
  StepName::SavePost,
  StepName::InvalidatePostCache,
  StepName::PublishAnnouncement,
];

const CACHE_REGENERATE_STEPS: &[StepName] =
  &[StepName::ResolvePeriod, StepName::InvalidateDataCache];

/// The kind of a workflow run. Determines its fixed step sequence.
///
/// Serialized as `data_refresh:<entity>`, `content_publish` or
/// `cache_regenerate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum WorkflowKind {
  /// Pull a month of data for one entity, then write and announce about it.
  DataRefresh(Entity),
  /// Write and announce a post for already persisted data.
  ContentPublish,
  /// Invalidate the cached read views of one entity.
  CacheRegenerate,
}

/// Typed view of a run payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunInput {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub month: Option<Period>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data_type: Option<Entity>,
}

impl WorkflowKind {
  /// The steps of this kind, in execution order.
  pub fn steps(&self) -> &'static [StepName] {
    match self {
      WorkflowKind::DataRefresh(_) => DATA_REFRESH_STEPS,
      WorkflowKind::ContentPublish => CONTENT_PUBLISH_STEPS,
      WorkflowKind::CacheRegenerate => CACHE_REGENERATE_STEPS,
    }
  }

  /// Check a payload against this kind's schema and return its typed form.
  ///
  /// A `null` payload is treated as an empty object. For `DataRefresh` the
  /// returned input always carries the kind's entity as `data_type`.
  pub fn validate(&self, payload: &serde_json::Value) -> Result<RunInput, WorkflowError> {
    let invalid = |message: String| WorkflowError::InvalidPayload {
      kind: self.to_string(),
      message,
    };

    let mut input: RunInput = if payload.is_null() {
      RunInput::default()
    } else {
      serde_json::from_value(payload.clone()).map_err(|e| invalid(e.to_string()))?
    };

    match self {
      WorkflowKind::DataRefresh(entity) => {
        match input.data_type {
          Some(data_type) if data_type != *entity => {
            return Err(invalid(format!(
              "data_type '{}' does not match refreshed entity '{}'",
              data_type, entity
            )));
          }
          _ => {}
        }
        input.data_type = Some(*entity);
      }
      WorkflowKind::ContentPublish => {
        if input.month.is_none() {
          return Err(invalid("missing field `month`".to_string()));
        }
        if input.data_type.is_none() {
          return Err(invalid("missing field `data_type`".to_string()));
        }
      }
      WorkflowKind::CacheRegenerate => {
        if input.data_type.is_none() {
          return Err(invalid("missing field `data_type`".to_string()));
        }
      }
    }

    Ok(input)
  }
}

impl fmt::Display for WorkflowKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      WorkflowKind::DataRefresh(entity) => write!(f, "data_refresh:{}", entity),
      WorkflowKind::ContentPublish => f.write_str("content_publish"),
      WorkflowKind::CacheRegenerate => f.write_str("cache_regenerate"),
    }
  }
}

impl FromStr for WorkflowKind {
  type Err = WorkflowError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "content_publish" => Ok(WorkflowKind::ContentPublish),
      "cache_regenerate" => Ok(WorkflowKind::CacheRegenerate),
      other => match other.strip_prefix("data_refresh:") {
        Some(entity) => Ok(WorkflowKind::DataRefresh(entity.parse()?)),
        None => Err(WorkflowError::UnknownKind(other.to_string())),
      },
    }
  }
}

impl TryFrom<String> for WorkflowKind {
  type Error = WorkflowError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<WorkflowKind> for String {
  fn from(kind: WorkflowKind) -> Self {
    kind.to_string()
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn test_kind_wire_form() {
    let kinds = [
      WorkflowKind::DataRefresh(Entity::Coe),
      WorkflowKind::ContentPublish,
      WorkflowKind::CacheRegenerate,
    ];
    for kind in kinds {
      assert_eq!(kind.to_string().parse::<WorkflowKind>().unwrap(), kind);
    }
    assert_eq!(
      WorkflowKind::DataRefresh(Entity::Cars).to_string(),
      "data_refresh:cars"
    );
    assert!("data_refresh:boats".parse::<WorkflowKind>().is_err());
    assert!("publish".parse::<WorkflowKind>().is_err());
  }

  #[test]
  fn test_data_refresh_accepts_empty_payload() {
    let kind = WorkflowKind::DataRefresh(Entity::Cars);

    let input = kind.validate(&serde_json::Value::Null).unwrap();
    assert_eq!(input.month, None);
    assert_eq!(input.data_type, Some(Entity::Cars));

    let input = kind.validate(&json!({ "month": "2024-06" })).unwrap();
    assert_eq!(input.month.unwrap().to_string(), "2024-06");
  }

  #[test]
  fn test_data_refresh_rejects_mismatched_entity() {
    let kind = WorkflowKind::DataRefresh(Entity::Cars);
    let err = kind.validate(&json!({ "data_type": "coe" })).unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidPayload { .. }));
  }

  #[test]
  fn test_content_publish_requires_key() {
    let kind = WorkflowKind::ContentPublish;
    assert!(kind.validate(&json!({ "month": "2024-06" })).is_err());
    assert!(kind.validate(&json!({ "data_type": "cars" })).is_err());

    let input = kind
      .validate(&json!({ "month": "2024-06", "data_type": "cars" }))
      .unwrap();
    assert_eq!(input.data_type, Some(Entity::Cars));
  }

  #[test]
  fn test_payload_rejects_garbage() {
    let kind = WorkflowKind::CacheRegenerate;
    assert!(kind.validate(&json!({ "data_type": "coe", "extra": 1 })).is_err());
    assert!(kind.validate(&json!({ "data_type": "coe", "month": "May" })).is_err());
    assert!(kind.validate(&json!([1, 2])).is_err());
    assert!(kind.validate(&json!({ "data_type": "coe" })).is_ok());
  }

  #[test]
  fn test_step_sequences_are_fixed() {
    let refresh = WorkflowKind::DataRefresh(Entity::Cars).steps();
    assert_eq!(refresh.first(), Some(&StepName::FetchSourceData));
    assert_eq!(refresh.last(), Some(&StepName::PublishAnnouncement));

    let publish = WorkflowKind::ContentPublish.steps();
    assert_eq!(publish.first(), Some(&StepName::CheckExistingArtifact));

    assert_eq!(
      WorkflowKind::CacheRegenerate.steps(),
      &[StepName::ResolvePeriod, StepName::InvalidateDataCache]
    );
  }
}
