//! Motorstats Workflow Engine
//!
//! Drives the data refresh, content publish and cache regenerate workflows.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkflowEngine                         │
//! │  - start / execute / resume / cancel / status               │
//! │  - one tokio task per started run                           │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  plan::next_action                          │
//! │  - pure: (run, input, step log) → next step or complete     │
//! │  - skips content steps when a post exists or no data came   │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     step library                            │
//! │  - one body per step, collaborators via RunContext          │
//! │  - checkpointed by idempotency key, retried with backoff    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let ctx = RunContext::new(runs, data, cache, source, generator, publisher);
//! let engine = WorkflowEngine::new(ctx);
//!
//! let report = engine
//!   .execute(WorkflowKind::DataRefresh(Entity::Coe), json!({ "month": "2024-05" }))
//!   .await?;
//! ```

mod context;
mod engine;
mod error;
mod events;
mod generator;
pub mod plan;
mod retry;
mod source;
mod steps;

pub use context::{EngineSettings, RunContext};
pub use engine::{CANCELLED, RunOutcome, RunReport, RunStatusView, StepExecution, WorkflowEngine};
pub use error::{EngineError, StepError};
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use generator::{
  ContentGenerator, GenerateError, GeneratedContent, Generation, GenerationContext,
  TemplateGenerator,
};
pub use plan::{NextAction, SkipReason};
pub use retry::RetryPolicy;
pub use source::{DataSource, EmptySource, HttpDataSource, SourceError};
pub use steps::StepOutput;
