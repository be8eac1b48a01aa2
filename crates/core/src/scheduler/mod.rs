//! The update loop.
//!
//! One background task polls every enabled provider in turn and passes what
//! they return to the dispatcher. Providers, history writes and client calls
//! all run sequentially on that task.

mod runner;
mod types;

pub use runner::Scheduler;
pub use types::{SchedulerStatus, TickSummary};
