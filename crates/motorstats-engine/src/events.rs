//! Execution events and notifiers for observability.
//!
//! Events are emitted while a run is driven so consumers can observe
//! progress, stream it to a terminal, or wait for a run to settle.

use motorstats_workflow::{RunId, StepName, WorkflowKind};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::plan::SkipReason;

/// Events emitted during workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionEvent {
  /// The run was created and is about to be driven.
  RunStarted { run_id: RunId, kind: WorkflowKind },

  /// A non-terminal run is being driven again.
  RunResumed { run_id: RunId },

  /// A step body is about to be invoked.
  StepStarted {
    run_id: RunId,
    step: StepName,
    attempt: u32,
  },

  /// A step body returned a result.
  StepSucceeded {
    run_id: RunId,
    step: StepName,
    result: serde_json::Value,
  },

  /// A stored result was returned without invoking the body.
  StepReplayed { run_id: RunId, step: StepName },

  /// The planner decided a step has nothing to do in this run.
  StepSkipped {
    run_id: RunId,
    step: StepName,
    reason: SkipReason,
  },

  /// An attempt failed transiently and will be retried.
  StepRetrying {
    run_id: RunId,
    step: StepName,
    attempt: u32,
    error: String,
  },

  /// A step failed for good.
  StepFailed {
    run_id: RunId,
    step: StepName,
    error: String,
  },

  /// A step asked to be re-entered later; the run is parked.
  RunSuspended { run_id: RunId, step: StepName },

  RunCompleted { run_id: RunId },

  RunFailed { run_id: RunId, error: String },
}

impl ExecutionEvent {
  pub fn run_id(&self) -> &RunId {
    match self {
      ExecutionEvent::RunStarted { run_id, .. }
      | ExecutionEvent::RunResumed { run_id }
      | ExecutionEvent::StepStarted { run_id, .. }
      | ExecutionEvent::StepSucceeded { run_id, .. }
      | ExecutionEvent::StepReplayed { run_id, .. }
      | ExecutionEvent::StepSkipped { run_id, .. }
      | ExecutionEvent::StepRetrying { run_id, .. }
      | ExecutionEvent::StepFailed { run_id, .. }
      | ExecutionEvent::RunSuspended { run_id, .. }
      | ExecutionEvent::RunCompleted { run_id }
      | ExecutionEvent::RunFailed { run_id, .. } => run_id,
    }
  }

  /// Whether this event ends a drive of the run.
  pub fn is_settled(&self) -> bool {
    matches!(
      self,
      ExecutionEvent::RunSuspended { .. }
        | ExecutionEvent::RunCompleted { .. }
        | ExecutionEvent::RunFailed { .. }
    )
  }
}

/// Trait for receiving execution events.
///
/// The engine calls `notify` for each event; implementations decide what to
/// do with them.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// A no-op notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// A notifier that sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls a run; volume is a handful of
  // events per step.
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Receiver may have been dropped.
    let _ = self.sender.send(event);
  }
}
