//! Trigger runner with channel-based triggering.
//!
//! The `TriggerRunner` owns an mpsc channel of trigger requests and starts a
//! run on the engine for each one. Requests arriving here come from trusted
//! in-process sources such as the [`Schedule`](crate::Schedule); external
//! callers go through the [`TriggerBoundary`](crate::TriggerBoundary).

use motorstats_engine::WorkflowEngine;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::boundary::TriggerRequest;
use crate::error::TriggerError;

/// Starts runs for queued trigger requests.
///
/// # Usage
///
/// ```ignore
/// let runner = TriggerRunner::new(engine);
///
/// // Hand out senders to schedules, webhooks, etc.
/// let sender = runner.sender();
///
/// let cancel = CancellationToken::new();
/// runner.start(cancel).await;
/// ```
pub struct TriggerRunner {
  sender: mpsc::Sender<TriggerRequest>,
  receiver: mpsc::Receiver<TriggerRequest>,
  engine: WorkflowEngine,
}

impl TriggerRunner {
  pub fn new(engine: WorkflowEngine) -> Self {
    Self::with_buffer_size(engine, 100)
  }

  pub fn with_buffer_size(engine: WorkflowEngine, buffer_size: usize) -> Self {
    let (sender, receiver) = mpsc::channel(buffer_size);
    Self {
      sender,
      receiver,
      engine,
    }
  }

  /// A sender handle for queueing trigger requests.
  pub fn sender(&self) -> mpsc::Sender<TriggerRequest> {
    self.sender.clone()
  }

  /// Queue a request through the runner's own channel.
  pub async fn enqueue(&self, request: TriggerRequest) -> Result<(), TriggerError> {
    self
      .sender
      .send(request)
      .await
      .map_err(|_| TriggerError::Closed)
  }

  /// Start the loop.
  ///
  /// Runs until the cancellation token is triggered or every sender is
  /// dropped. Runs that were started keep executing on their own tasks.
  pub async fn start(self, cancel: CancellationToken) {
    let TriggerRunner {
      sender,
      mut receiver,
      engine,
    } = self;
    // Only outside senders keep the loop alive.
    drop(sender);

    info!("trigger_runner_started");

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!("trigger_runner_cancelled");
          break;
        }
        request = receiver.recv() => {
          match request {
            Some(request) => {
              let kind = request.kind;
              match engine.start(kind, request.payload).await {
                Ok(run_id) => info!(run_id = %run_id, kind = %kind, "run_triggered"),
                Err(e) => error!(kind = %kind, error = %e, "trigger_run_failed"),
              }
            }
            None => {
              info!("trigger_runner_channel_closed");
              break;
            }
          }
        }
      }
    }
  }
}
