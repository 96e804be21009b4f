//! Deciding what a run does next.
//!
//! Planning is a pure function of the run, its typed input and its step log.
//! Nothing about skipped steps is persisted: the same log always yields the
//! same plan, which is what makes a resumed run pick up where it stopped.

use std::collections::HashMap;

use motorstats_workflow::{RunInput, StepName, StepRecord, StepStatus, WorkflowKind, WorkflowRun};
use serde::{Deserialize, Serialize};

/// Why a step has nothing to do in this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
  /// A post for the target `(month, data_type)` already exists, either found
  /// up front or discovered when saving.
  ArtifactExists,
  /// The refresh found no rows and no month was asked for.
  NoData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
  /// Run (or replay) this step.
  Execute(StepName),
  /// Every step either succeeded or is skipped.
  Complete,
}

/// Step log of one run, keyed by step.
pub type StepLog = HashMap<StepName, StepRecord>;

pub fn step_log(records: impl IntoIterator<Item = StepRecord>) -> StepLog {
  records.into_iter().map(|r| (r.step, r)).collect()
}

/// The first step of the run's sequence that has neither succeeded nor been
/// skipped.
pub fn next_action(run: &WorkflowRun, input: &RunInput, records: &StepLog) -> NextAction {
  for step in run.kind.steps() {
    if succeeded(records, *step).is_some() {
      continue;
    }
    if skip_reason(run.kind, *step, input, records).is_some() {
      continue;
    }
    return NextAction::Execute(*step);
  }
  NextAction::Complete
}

/// Steps skipped so far, in sequence order.
pub fn skipped(run: &WorkflowRun, input: &RunInput, records: &StepLog) -> Vec<(StepName, SkipReason)> {
  run
    .kind
    .steps()
    .iter()
    .filter(|step| succeeded(records, **step).is_none())
    .filter_map(|step| skip_reason(run.kind, *step, input, records).map(|reason| (*step, reason)))
    .collect()
}

/// Why `step` should not run, given what the log says so far.
pub fn skip_reason(
  kind: WorkflowKind,
  step: StepName,
  input: &RunInput,
  records: &StepLog,
) -> Option<SkipReason> {
  if matches!(kind, WorkflowKind::DataRefresh(_)) && after_persist(kind, step) && no_data(input, records) {
    return Some(SkipReason::NoData);
  }

  if step.requires_new_artifact() && artifact_exists(step, records) {
    return Some(SkipReason::ArtifactExists);
  }

  None
}

fn succeeded(records: &StepLog, step: StepName) -> Option<&serde_json::Value> {
  records
    .get(&step)
    .filter(|r| r.status == StepStatus::Succeeded)
    .and_then(|r| r.result.as_ref())
}

fn after_persist(kind: WorkflowKind, step: StepName) -> bool {
  let steps = kind.steps();
  let persist = steps.iter().position(|s| *s == StepName::PersistData);
  let index = steps.iter().position(|s| *s == step);
  matches!((persist, index), (Some(p), Some(i)) if i > p)
}

fn no_data(input: &RunInput, records: &StepLog) -> bool {
  if input.month.is_some() {
    return false;
  }
  match succeeded(records, StepName::FetchSourceData) {
    Some(result) => result
      .get("rows")
      .and_then(|rows| rows.as_array())
      .is_some_and(|rows| rows.is_empty()),
    None => false,
  }
}

fn artifact_exists(step: StepName, records: &StepLog) -> bool {
  let found_up_front = succeeded(records, StepName::CheckExistingArtifact)
    .is_some_and(|post| !post.is_null());

  // A lost race at save time only gates the steps after saving.
  let lost_race = step != StepName::SavePost
    && succeeded(records, StepName::SavePost)
      .and_then(|r| r.get("created"))
      .and_then(|c| c.as_bool())
      == Some(false);

  found_up_front || lost_race
}
