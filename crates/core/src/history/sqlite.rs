use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use super::{DedupRecord, HistoryError, HistoryStore};

const SCHEMA: &str = r#"
    PRAGMA synchronous = FULL;

    CREATE TABLE IF NOT EXISTS downloads (
        release_key TEXT PRIMARY KEY NOT NULL,
        release_name TEXT NOT NULL,
        section_id TEXT NOT NULL,
        source_id TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_downloads_created_at ON downloads(created_at);
"#;

/// (release_key, release_name, section_id, source_id, created_at)
type RawRow = (String, String, String, String, String);

/// SQLite-backed history store
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
    /// Open (or create) the history database at `path`
    pub fn new(path: &Path) -> Result<Self, HistoryError> {
        let conn = Connection::open(path).map_err(|e| HistoryError::Database(e.to_string()))?;
        Self::init(conn)
    }

    /// Create an in-memory history store (useful for testing)
    pub fn in_memory() -> Result<Self, HistoryError> {
        let conn =
            Connection::open_in_memory().map_err(|e| HistoryError::Database(e.to_string()))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, HistoryError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| HistoryError::Database(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
    }

    fn into_record(
        (release_key, release_name, section_id, source_id, created_at): RawRow,
    ) -> Result<DedupRecord, HistoryError> {
        let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| HistoryError::Database(format!("Invalid timestamp: {}", e)))?
            .into();
        Ok(DedupRecord {
            release_key,
            release_name,
            section_id,
            source_id,
            created_at,
        })
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn exists(&self, key: &str) -> Result<bool, HistoryError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.query_row(
            "SELECT 1 FROM downloads WHERE release_key = ?",
            params![key],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
        .map_err(|e| HistoryError::Database(e.to_string()))
    }

    fn record(
        &self,
        key: &str,
        release_name: &str,
        section: &str,
        source: &str,
    ) -> Result<DedupRecord, HistoryError> {
        let record = DedupRecord {
            release_key: key.to_string(),
            release_name: release_name.to_string(),
            section_id: section.to_string(),
            source_id: source.to_string(),
            created_at: Utc::now(),
        };

        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT INTO downloads (release_key, release_name, section_id, source_id, created_at) VALUES (?, ?, ?, ?, ?)",
            params![
                record.release_key,
                record.release_name,
                record.section_id,
                record.source_id,
                record.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(ref err, _)
                if err.code == ErrorCode::ConstraintViolation =>
            {
                HistoryError::DuplicateKey(key.to_string())
            }
            other => HistoryError::Database(other.to_string()),
        })?;

        Ok(record)
    }

    fn get(&self, key: &str) -> Result<Option<DedupRecord>, HistoryError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let row = conn
            .query_row(
                "SELECT release_key, release_name, section_id, source_id, created_at FROM downloads WHERE release_key = ?",
                params![key],
                Self::read_row,
            )
            .optional()
            .map_err(|e| HistoryError::Database(e.to_string()))?;

        row.map(Self::into_record).transpose()
    }

    fn recent(&self, limit: i64) -> Result<Vec<DedupRecord>, HistoryError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn
            .prepare(
                "SELECT release_key, release_name, section_id, source_id, created_at FROM downloads ORDER BY created_at DESC LIMIT ?",
            )
            .map_err(|e| HistoryError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![limit], Self::read_row)
            .map_err(|e| HistoryError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row in rows {
            let row = row.map_err(|e| HistoryError::Database(e.to_string()))?;
            records.push(Self::into_record(row)?);
        }
        Ok(records)
    }

    fn count(&self) -> Result<i64, HistoryError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.query_row("SELECT COUNT(*) FROM downloads", [], |row| row.get(0))
            .map_err(|e| HistoryError::Database(e.to_string()))
    }
}
