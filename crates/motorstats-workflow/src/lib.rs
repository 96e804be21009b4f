//! Motorstats Workflow
//!
//! This crate provides the domain vocabulary shared by every other motorstats
//! crate: the statistics entities and their monthly periods, the workflow
//! kinds with their fixed step sequences, and the persisted shapes of a run
//! (`WorkflowRun`) and of each checkpointed step (`StepRecord`).
//!
//! Nothing in here performs I/O. The engine drives these types; the store
//! persists them.

mod entity;
mod error;
mod key;
mod kind;
mod post;
mod run;
mod step;

pub use entity::{Entity, Period};
pub use error::WorkflowError;
pub use key::{IdempotencyKey, to_canonical_json};
pub use kind::{RunInput, WorkflowKind};
pub use post::{Post, StatRow, slugify};
pub use run::{RunId, RunStatus, StepRecord, StepStatus, WorkflowRun};
pub use step::StepName;
