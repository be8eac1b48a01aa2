//! Download history used to avoid fetching the same release twice.

mod sqlite;
mod store;

pub use sqlite::SqliteHistoryStore;
pub use store::{generate_release_key, DedupRecord, HistoryError, HistoryStore};
