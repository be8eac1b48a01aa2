use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Release key already recorded: {0}")]
    DuplicateKey(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// One accepted release. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupRecord {
    pub release_key: String,
    pub release_name: String,
    pub section_id: String,
    pub source_id: String,
    pub created_at: DateTime<Utc>,
}

/// Derive the dedup key for a raw release name.
///
/// Lowercase hex SHA-256 of the exact bytes; no normalization is applied.
/// Returns `None` for an empty name.
pub fn generate_release_key(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    Some(format!("{:x}", Sha256::digest(raw.as_bytes())))
}

/// Trait for download history storage
pub trait HistoryStore: Send + Sync {
    /// Whether a key has been recorded.
    fn exists(&self, key: &str) -> Result<bool, HistoryError>;

    /// Record a key. Fails with `DuplicateKey` rather than overwriting.
    fn record(
        &self,
        key: &str,
        release_name: &str,
        section: &str,
        source: &str,
    ) -> Result<DedupRecord, HistoryError>;

    /// Fetch a single record.
    fn get(&self, key: &str) -> Result<Option<DedupRecord>, HistoryError>;

    /// Most recent records, newest first.
    fn recent(&self, limit: i64) -> Result<Vec<DedupRecord>, HistoryError>;

    /// Total number of records.
    fn count(&self) -> Result<i64, HistoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_deterministic() {
        let a = generate_release_key("Show.Name.S01E02.HDTV-GROUP").unwrap();
        let b = generate_release_key("Show.Name.S01E02.HDTV-GROUP").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_key_is_stable_across_runs() {
        // Known SHA-256 test vector
        assert_eq!(
            generate_release_key("abc").unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_key_is_case_sensitive() {
        assert_ne!(
            generate_release_key("Show.S01E01-GRP"),
            generate_release_key("show.s01e01-grp")
        );
    }

    #[test]
    fn test_empty_name_has_no_key() {
        assert_eq!(generate_release_key(""), None);
    }
}
