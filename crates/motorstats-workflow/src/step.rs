use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

/// Name of one step in a workflow's fixed sequence.
///
/// The name is part of the idempotency key, so renaming a variant's wire form
/// orphans every stored record for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
  FetchSourceData,
  PersistData,
  InvalidateDataCache,
  CheckExistingArtifact,
  GenerateContent,
  SavePost,
  InvalidatePostCache,
  PublishAnnouncement,
  ResolvePeriod,
}

impl StepName {
  pub fn as_str(&self) -> &'static str {
    match self {
      StepName::FetchSourceData => "fetch_source_data",
      StepName::PersistData => "persist_data",
      StepName::InvalidateDataCache => "invalidate_data_cache",
      StepName::CheckExistingArtifact => "check_existing_artifact",
      StepName::GenerateContent => "generate_content",
      StepName::SavePost => "save_post",
      StepName::InvalidatePostCache => "invalidate_post_cache",
      StepName::PublishAnnouncement => "publish_announcement",
      StepName::ResolvePeriod => "resolve_period",
    }
  }

  /// Steps that only run when no Post exists yet for the target key.
  pub fn requires_new_artifact(&self) -> bool {
    matches!(
      self,
      StepName::GenerateContent
        | StepName::SavePost
        | StepName::InvalidatePostCache
        | StepName::PublishAnnouncement
    )
  }
}

impl fmt::Display for StepName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for StepName {
  type Err = WorkflowError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "fetch_source_data" => Ok(StepName::FetchSourceData),
      "persist_data" => Ok(StepName::PersistData),
      "invalidate_data_cache" => Ok(StepName::InvalidateDataCache),
      "check_existing_artifact" => Ok(StepName::CheckExistingArtifact),
      "generate_content" => Ok(StepName::GenerateContent),
      "save_post" => Ok(StepName::SavePost),
      "invalidate_post_cache" => Ok(StepName::InvalidatePostCache),
      "publish_announcement" => Ok(StepName::PublishAnnouncement),
      "resolve_period" => Ok(StepName::ResolvePeriod),
      other => Err(WorkflowError::UnknownStep(other.to_string())),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_step_name_round_trip() {
    let all = [
      StepName::FetchSourceData,
      StepName::PersistData,
      StepName::InvalidateDataCache,
      StepName::CheckExistingArtifact,
      StepName::GenerateContent,
      StepName::SavePost,
      StepName::InvalidatePostCache,
      StepName::PublishAnnouncement,
      StepName::ResolvePeriod,
    ];
    for step in all {
      assert_eq!(step.as_str().parse::<StepName>().unwrap(), step);
      assert_eq!(
        serde_json::to_value(step).unwrap(),
        serde_json::json!(step.as_str())
      );
    }
  }

  #[test]
  fn test_artifact_gated_steps() {
    assert!(StepName::GenerateContent.requires_new_artifact());
    assert!(StepName::PublishAnnouncement.requires_new_artifact());
    assert!(!StepName::CheckExistingArtifact.requires_new_artifact());
    assert!(!StepName::InvalidateDataCache.requires_new_artifact());
  }
}
