//! Durable run execution.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use motorstats_workflow::{
  RunId, RunInput, RunStatus, StepName, StepRecord, StepStatus, WorkflowKind, WorkflowRun,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::context::RunContext;
use crate::error::{EngineError, StepError};
use crate::events::ExecutionEvent;
use crate::plan::{self, NextAction, SkipReason, StepLog};
use crate::steps::{self, StepContext, StepOutput};

/// Error recorded on a run aborted by an operator.
pub const CANCELLED: &str = "cancelled";

/// Outcome of executing one step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepExecution {
  /// The body ran and produced this result.
  Executed(Value),
  /// The step had already succeeded; its stored result is returned and the
  /// body was not invoked.
  Replayed(Value),
  /// The body asked to be re-entered later.
  Suspended,
}

/// How a drive of a run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
  Completed,
  /// Parked at `step`; the run stays `Running` until resumed.
  Suspended { step: StepName },
  Failed { step: StepName, error: String },
  /// Aborted by an operator while being driven.
  Cancelled,
}

/// A run with its step log, as returned by `execute` and `resume`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
  pub run: WorkflowRun,
  pub outcome: RunOutcome,
  pub steps: Vec<StepRecord>,
  pub skipped: Vec<(StepName, SkipReason)>,
}

/// A run with its step log, as returned by `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatusView {
  pub run: WorkflowRun,
  /// Checkpoints in sequence order.
  pub steps: Vec<StepRecord>,
  pub skipped: Vec<(StepName, SkipReason)>,
}

type ActiveRuns = Arc<Mutex<HashMap<RunId, CancellationToken>>>;

/// Removes a run from the active set when its drive ends, however it ends.
struct ActiveGuard {
  active: ActiveRuns,
  run_id: RunId,
}

impl Drop for ActiveGuard {
  fn drop(&mut self) {
    self.active.lock().remove(&self.run_id);
  }
}

/// The workflow engine.
///
/// Drives runs through their kind's fixed step sequence, checkpointing every
/// step in the run store so that finished steps are replayed rather than
/// repeated. Cheap to clone; clones share the same set of active runs.
#[derive(Clone)]
pub struct WorkflowEngine {
  ctx: Arc<RunContext>,
  active: ActiveRuns,
}

impl WorkflowEngine {
  pub fn new(ctx: RunContext) -> Self {
    Self {
      ctx: Arc::new(ctx),
      active: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  pub fn context(&self) -> &RunContext {
    &self.ctx
  }

  /// Validate, persist and spawn a run. Returns as soon as the run exists.
  #[instrument(name = "run_start", skip(self, payload), fields(kind = %kind))]
  pub async fn start(&self, kind: WorkflowKind, payload: Value) -> Result<RunId, EngineError> {
    let (run, input) = self.create(kind, payload).await?;
    let run_id = run.id;
    let (cancel, guard) = self.register(run_id)?;

    let engine = self.clone();
    tokio::spawn(async move {
      let _guard = guard;
      if let Err(e) = engine.drive(run, input, cancel).await {
        error!(run_id = %run_id, error = %e, "run_drive_failed");
        engine.notify(ExecutionEvent::RunFailed {
          run_id,
          error: e.to_string(),
        });
      }
    });

    Ok(run_id)
  }

  /// Validate, persist and drive a run to its end before returning.
  #[instrument(name = "run_execute", skip(self, payload), fields(kind = %kind))]
  pub async fn execute(&self, kind: WorkflowKind, payload: Value) -> Result<RunReport, EngineError> {
    let (run, input) = self.create(kind, payload).await?;
    let (cancel, _guard) = self.register(run.id)?;
    self.drive(run, input, cancel).await
  }

  /// Drive a non-terminal run again, continuing at its first unfinished step.
  #[instrument(name = "run_resume", skip(self), fields(run_id = %run_id))]
  pub async fn resume(&self, run_id: &RunId) -> Result<RunReport, EngineError> {
    let mut run = self.load(run_id).await?;
    if run.status.is_terminal() {
      return Err(EngineError::RunTerminal { run_id: *run_id });
    }
    let (cancel, _guard) = self.register(run.id)?;

    if run.status == RunStatus::Pending {
      self
        .ctx
        .runs
        .transition_run(&run.id, RunStatus::Running, None)
        .await?;
      run.status = RunStatus::Running;
    }

    let input = run.kind.validate(&run.payload)?;
    info!(run_id = %run.id, kind = %run.kind, "run_resumed");
    self.notify(ExecutionEvent::RunResumed { run_id: run.id });

    self.drive(run, input, cancel).await
  }

  /// Abort a run: mark it failed and stop its in-flight step, if any.
  ///
  /// Succeeded checkpoints are kept.
  #[instrument(name = "run_cancel", skip(self), fields(run_id = %run_id))]
  pub async fn cancel(&self, run_id: &RunId) -> Result<(), EngineError> {
    let transitioned = self
      .ctx
      .runs
      .transition_run(run_id, RunStatus::Failed, Some(CANCELLED))
      .await?;
    if !transitioned {
      // Distinguish a missing run from a finished one.
      self.load(run_id).await?;
      return Err(EngineError::RunTerminal { run_id: *run_id });
    }

    if let Some(token) = self.active.lock().get(run_id) {
      token.cancel();
    }

    warn!(run_id = %run_id, "run_cancelled");
    self.notify(ExecutionEvent::RunFailed {
      run_id: *run_id,
      error: CANCELLED.to_string(),
    });
    Ok(())
  }

  /// Execute a single step of an existing run.
  ///
  /// A step that already succeeded is replayed from its checkpoint without
  /// invoking the body.
  #[instrument(name = "step_execute", skip(self), fields(run_id = %run_id, step = %step))]
  pub async fn execute_step(
    &self,
    run_id: &RunId,
    step: StepName,
  ) -> Result<StepExecution, EngineError> {
    let run = self.load(run_id).await?;
    if !run.kind.steps().contains(&step) {
      return Err(EngineError::StepNotInKind {
        kind: run.kind,
        step,
      });
    }

    let log = plan::step_log(self.ctx.runs.list_steps(&run.id).await?);
    let replayable = log.get(&step).is_some_and(StepRecord::is_succeeded);
    if run.status.is_terminal() && !replayable {
      return Err(EngineError::RunTerminal { run_id: run.id });
    }

    let input = run.kind.validate(&run.payload)?;
    let (cancel, _guard) = self.register(run.id)?;
    let (execution, _) = self.run_step(&run, &input, &log, step, &cancel).await?;
    Ok(execution)
  }

  /// A run and its checkpoints.
  pub async fn status(&self, run_id: &RunId) -> Result<RunStatusView, EngineError> {
    let run = self.load(run_id).await?;
    let records = self.ctx.runs.list_steps(&run.id).await?;

    let skipped = match run.kind.validate(&run.payload) {
      Ok(input) => plan::skipped(&run, &input, &plan::step_log(records.clone())),
      Err(_) => Vec::new(),
    };

    Ok(RunStatusView {
      steps: in_sequence(run.kind, records),
      skipped,
      run,
    })
  }

  pub async fn list_runs(&self, limit: usize) -> Result<Vec<WorkflowRun>, EngineError> {
    Ok(self.ctx.runs.list_runs(limit).await?)
  }

  /// Whether this engine is driving `run_id` right now.
  pub fn is_active(&self, run_id: &RunId) -> bool {
    self.active.lock().contains_key(run_id)
  }

  async fn create(
    &self,
    kind: WorkflowKind,
    payload: Value,
  ) -> Result<(WorkflowRun, RunInput), EngineError> {
    let input = kind.validate(&payload)?;

    let mut run = WorkflowRun::new(kind, payload);
    self.ctx.runs.create_run(&run).await?;
    self
      .ctx
      .runs
      .transition_run(&run.id, RunStatus::Running, None)
      .await?;
    run.status = RunStatus::Running;

    info!(run_id = %run.id, kind = %kind, payload = %run.payload, "run_started");
    self.notify(ExecutionEvent::RunStarted { run_id: run.id, kind });

    Ok((run, input))
  }

  fn register(&self, run_id: RunId) -> Result<(CancellationToken, ActiveGuard), EngineError> {
    let mut active = self.active.lock();
    if active.contains_key(&run_id) {
      return Err(EngineError::RunActive { run_id });
    }
    let token = CancellationToken::new();
    active.insert(run_id, token.clone());

    Ok((
      token,
      ActiveGuard {
        active: self.active.clone(),
        run_id,
      },
    ))
  }

  async fn load(&self, run_id: &RunId) -> Result<WorkflowRun, EngineError> {
    match self.ctx.runs.get_run(run_id).await {
      Ok(run) => Ok(run),
      Err(motorstats_store::Error::NotFound(_)) => Err(EngineError::RunNotFound { run_id: *run_id }),
      Err(e) => Err(e.into()),
    }
  }

  fn notify(&self, event: ExecutionEvent) {
    self.ctx.notifier.notify(event);
  }

  /// Run steps until the plan completes, a step suspends or fails, or the
  /// run is cancelled.
  async fn drive(
    &self,
    run: WorkflowRun,
    input: RunInput,
    cancel: CancellationToken,
  ) -> Result<RunReport, EngineError> {
    let mut log = plan::step_log(self.ctx.runs.list_steps(&run.id).await?);
    let mut reported = HashSet::new();

    loop {
      self.report_skips(&run, &input, &log, &mut reported);

      if cancel.is_cancelled() {
        return self.report(&run.id, &input, RunOutcome::Cancelled).await;
      }
      // The token only covers this process; a run cancelled elsewhere is
      // noticed through its stored status.
      let stored = self.load(&run.id).await?;
      if stored.status.is_terminal() {
        warn!(run_id = %run.id, "run_cancelled_elsewhere");
        self.notify(ExecutionEvent::RunFailed {
          run_id: run.id,
          error: stored.error.unwrap_or_else(|| CANCELLED.to_string()),
        });
        return self.report(&run.id, &input, RunOutcome::Cancelled).await;
      }

      let step = match plan::next_action(&run, &input, &log) {
        NextAction::Execute(step) => step,
        NextAction::Complete => break,
      };

      match self.run_step(&run, &input, &log, step, &cancel).await {
        Ok((StepExecution::Suspended, record)) => {
          log.insert(step, record);
          info!(run_id = %run.id, step = %step, "run_suspended");
          self.notify(ExecutionEvent::RunSuspended { run_id: run.id, step });
          return self.report(&run.id, &input, RunOutcome::Suspended { step }).await;
        }
        Ok((_, record)) => {
          log.insert(step, record);
        }
        Err(EngineError::Cancelled) => {
          return self.report(&run.id, &input, RunOutcome::Cancelled).await;
        }
        Err(e @ EngineError::StepFailed { .. }) => {
          let message = e.to_string();
          self
            .ctx
            .runs
            .transition_run(&run.id, RunStatus::Failed, Some(&message))
            .await?;
          error!(run_id = %run.id, error = %message, "run_failed");
          self.notify(ExecutionEvent::RunFailed {
            run_id: run.id,
            error: message.clone(),
          });
          return self
            .report(&run.id, &input, RunOutcome::Failed { step, error: message })
            .await;
        }
        Err(e) => return Err(e),
      }
    }

    let completed = self
      .ctx
      .runs
      .transition_run(&run.id, RunStatus::Completed, None)
      .await?;
    if !completed {
      // Cancelled between the last step and here.
      return self.report(&run.id, &input, RunOutcome::Cancelled).await;
    }

    info!(run_id = %run.id, "run_completed");
    self.notify(ExecutionEvent::RunCompleted { run_id: run.id });
    self.report(&run.id, &input, RunOutcome::Completed).await
  }

  fn report_skips(
    &self,
    run: &WorkflowRun,
    input: &RunInput,
    log: &StepLog,
    reported: &mut HashSet<StepName>,
  ) {
    for (step, reason) in plan::skipped(run, input, log) {
      if reported.insert(step) {
        info!(run_id = %run.id, step = %step, reason = ?reason, "step_skipped");
        self.notify(ExecutionEvent::StepSkipped {
          run_id: run.id,
          step,
          reason,
        });
      }
    }
  }

  async fn report(
    &self,
    run_id: &RunId,
    input: &RunInput,
    outcome: RunOutcome,
  ) -> Result<RunReport, EngineError> {
    let run = self.load(run_id).await?;
    let records = self.ctx.runs.list_steps(run_id).await?;
    let skipped = plan::skipped(&run, input, &plan::step_log(records.clone()));

    Ok(RunReport {
      steps: in_sequence(run.kind, records),
      skipped,
      outcome,
      run,
    })
  }

  /// Replay or execute one step, retrying transient failures.
  ///
  /// Returns the step's final checkpoint along with the outcome.
  async fn run_step(
    &self,
    run: &WorkflowRun,
    input: &RunInput,
    log: &StepLog,
    step: StepName,
    cancel: &CancellationToken,
  ) -> Result<(StepExecution, StepRecord), EngineError> {
    let mut record = log
      .get(&step)
      .cloned()
      .unwrap_or_else(|| StepRecord::new(run, step));

    if record.is_succeeded() {
      let result = record.result.clone().unwrap_or(Value::Null);
      info!(run_id = %run.id, step = %step, "step_replayed");
      self.notify(ExecutionEvent::StepReplayed { run_id: run.id, step });
      return Ok((StepExecution::Replayed(result), record));
    }

    let settings = &self.ctx.settings;
    let policy = &settings.retry;
    let retryable = steps::is_retryable(step);
    if record.status == StepStatus::Failed
      && (!retryable || !policy.should_retry(record.attempt_count))
    {
      return Err(EngineError::StepFailed {
        step,
        attempts: record.attempt_count,
        error: record.error.clone().unwrap_or_default(),
      });
    }

    let sc = StepContext {
      ctx: &self.ctx,
      run,
      input,
      records: log,
    };

    loop {
      let attempt = record.attempt_count + 1;
      record.status = StepStatus::InProgress;
      record.updated_at = Utc::now();
      self.ctx.runs.put_step(&record).await?;

      info!(run_id = %run.id, step = %step, attempt, "step_started");
      self.notify(ExecutionEvent::StepStarted {
        run_id: run.id,
        step,
        attempt,
      });

      let outcome = tokio::select! {
        _ = cancel.cancelled() => {
          warn!(run_id = %run.id, step = %step, "step_cancelled");
          return Err(EngineError::Cancelled);
        }
        outcome = tokio::time::timeout(settings.step_timeout, steps::run_step(step, &sc)) => outcome,
      };
      let outcome = outcome.unwrap_or_else(|_| {
        Err(StepError::Transient(format!(
          "timed out after {}ms",
          settings.step_timeout.as_millis()
        )))
      });

      match outcome {
        Ok(StepOutput::Complete(value)) => {
          record.attempt_count = attempt;
          record.status = StepStatus::Succeeded;
          record.result = Some(value.clone());
          record.error = None;
          record.updated_at = Utc::now();
          self.ctx.runs.put_step(&record).await?;

          info!(run_id = %run.id, step = %step, attempt, "step_succeeded");
          self.notify(ExecutionEvent::StepSucceeded {
            run_id: run.id,
            step,
            result: value.clone(),
          });
          return Ok((StepExecution::Executed(value), record));
        }
        Ok(StepOutput::Suspend) => {
          record.status = StepStatus::Suspended;
          record.updated_at = Utc::now();
          self.ctx.runs.put_step(&record).await?;

          info!(run_id = %run.id, step = %step, "step_suspended");
          return Ok((StepExecution::Suspended, record));
        }
        Err(e) => {
          record.attempt_count = attempt;
          record.status = StepStatus::Failed;
          record.error = Some(e.to_string());
          record.updated_at = Utc::now();
          self.ctx.runs.put_step(&record).await?;

          if e.is_transient() && retryable && policy.should_retry(attempt) {
            let delay = policy.backoff(attempt);
            warn!(
              run_id = %run.id,
              step = %step,
              attempt,
              backoff_ms = delay.as_millis() as u64,
              error = %e,
              "step_retrying"
            );
            self.notify(ExecutionEvent::StepRetrying {
              run_id: run.id,
              step,
              attempt,
              error: e.to_string(),
            });

            tokio::select! {
              _ = cancel.cancelled() => return Err(EngineError::Cancelled),
              _ = tokio::time::sleep(delay) => {}
            }
            continue;
          }

          error!(run_id = %run.id, step = %step, attempt, error = %e, "step_failed");
          self.notify(ExecutionEvent::StepFailed {
            run_id: run.id,
            step,
            error: e.to_string(),
          });
          return Err(EngineError::StepFailed {
            step,
            attempts: attempt,
            error: e.to_string(),
          });
        }
      }
    }
  }
}

fn in_sequence(kind: WorkflowKind, mut records: Vec<StepRecord>) -> Vec<StepRecord> {
  let steps = kind.steps();
  records.sort_by_key(|r| steps.iter().position(|s| *s == r.step).unwrap_or(usize::MAX));
  records
}
