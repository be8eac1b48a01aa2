//! Types for the dispatcher.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// What happened to one dispatched release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Client accepted it and the history record was written.
    Recorded,
    /// Client accepted it; history already knew the key (a re-fetched proper).
    AlreadyRecorded,
    /// Client accepted it but the history write failed.
    Unrecorded,
    /// Client refused it, or it could not be sent. Nothing was recorded.
    Rejected,
}

impl DispatchOutcome {
    /// Whether the download client has the release.
    pub fn accepted(&self) -> bool {
        !matches!(self, DispatchOutcome::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Recorded => "recorded",
            DispatchOutcome::AlreadyRecorded => "already_recorded",
            DispatchOutcome::Unrecorded => "unrecorded",
            DispatchOutcome::Rejected => "rejected",
        }
    }
}

/// A release the client accepted but history has not recorded yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnrecordedRelease {
    pub release_key: String,
    pub release_name: String,
    pub section: String,
    pub source: String,
    /// Last persistence error.
    pub error: String,
    pub accepted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_rejected_is_not_accepted() {
        assert!(DispatchOutcome::Recorded.accepted());
        assert!(DispatchOutcome::AlreadyRecorded.accepted());
        assert!(DispatchOutcome::Unrecorded.accepted());
        assert!(!DispatchOutcome::Rejected.accepted());
        assert_eq!(DispatchOutcome::AlreadyRecorded.as_str(), "already_recorded");
    }
}
