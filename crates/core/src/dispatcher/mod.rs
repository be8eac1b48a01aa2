//! Hands accepted releases to the download client and records them.
//!
//! A release counts as dispatched once the client accepts it. The history
//! write that follows may fail; such releases are kept in memory, reported
//! through `unrecorded()` and retried on the next scheduler tick.

mod dispatch;
mod types;

pub use dispatch::Dispatcher;
pub use types::{DispatchOutcome, UnrecordedRelease};
