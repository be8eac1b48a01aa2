//! Types for the update loop.

use serde::Serialize;

/// Counts from one polling round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    /// Providers that were asked for candidates.
    pub polled: usize,
    /// Providers whose poll failed.
    pub failed: usize,
    /// Releases returned by providers.
    pub candidates: usize,
    /// Releases the download client accepted.
    pub dispatched: usize,
    /// Previously unrecorded releases now in history.
    pub recovered: usize,
}

/// Current state of the scheduler.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub providers: usize,
    pub ticks: u64,
    pub unrecorded: usize,
}
