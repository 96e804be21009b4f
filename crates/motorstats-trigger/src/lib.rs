//! Trigger boundary for motorstats workflows.
//!
//! External callers present a [`Credential`] to the [`TriggerBoundary`],
//! which starts runs on the engine and answers status queries. In-process
//! sources queue [`TriggerRequest`]s on a [`TriggerRunner`]; the
//! [`Schedule`] is one of them.

mod auth;
mod boundary;
mod error;
mod runner;
mod schedule;

pub use auth::{Authenticator, Credential};
pub use boundary::{TriggerBoundary, TriggerRequest, TriggerResponse};
pub use error::TriggerError;
pub use runner::TriggerRunner;
pub use schedule::Schedule;
