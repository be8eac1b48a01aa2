//! Dispatcher implementation.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::ConfigHandle;
use crate::history::{generate_release_key, HistoryError, HistoryStore};
use crate::metrics::{DISPATCH_TOTAL, UNRECORDED_RELEASES};
use crate::provider::TorrentData;
use crate::release::{directory_name, parse};
use crate::torrent_client::{AddTorrentRequest, TorrentClient};

use super::types::{DispatchOutcome, UnrecordedRelease};

pub struct Dispatcher {
    config: ConfigHandle,
    client: Arc<dyn TorrentClient>,
    history: Arc<dyn HistoryStore>,
    unrecorded: Mutex<Vec<UnrecordedRelease>>,
}

impl Dispatcher {
    pub fn new(
        config: ConfigHandle,
        client: Arc<dyn TorrentClient>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            config,
            client,
            history,
            unrecorded: Mutex::new(Vec::new()),
        }
    }

    /// Send a release to the client. `true` when the client accepted it.
    pub async fn add(&self, torrent: &TorrentData, source: &str) -> bool {
        self.dispatch(torrent, source).await.accepted()
    }

    /// Send a release to the client and record it in history.
    pub async fn dispatch(&self, torrent: &TorrentData, source: &str) -> DispatchOutcome {
        let outcome = self.dispatch_inner(torrent, source).await;
        DISPATCH_TOTAL.with_label_values(&[outcome.as_str()]).inc();
        outcome
    }

    async fn dispatch_inner(&self, torrent: &TorrentData, source: &str) -> DispatchOutcome {
        let release = torrent.release_name.as_str();
        let Some(release_key) = generate_release_key(release) else {
            warn!(provider = source, "Refusing to dispatch release without a name");
            return DispatchOutcome::Rejected;
        };
        let Some(download_dir) = self.download_dir(torrent) else {
            warn!(
                release = release,
                section = %torrent.section,
                "Section no longer configured, dropping release"
            );
            return DispatchOutcome::Rejected;
        };

        // The client may run on another host, so a local failure is not fatal
        match tokio::fs::create_dir_all(&download_dir).await {
            Ok(()) => debug!(path = ?download_dir, "Download directory ready"),
            Err(e) => warn!(path = ?download_dir, "Could not create download directory: {}", e),
        }

        let request = AddTorrentRequest::torrent_file(torrent.payload.clone())
            .with_filename(format!("{}.torrent", release))
            .with_download_path(download_dir.to_string_lossy());

        match self.client.add_torrent(request).await {
            Ok(result) => {
                if result.duplicate {
                    debug!(release = release, client = self.client.name(), "Client already had release");
                }
                info!(
                    release = release,
                    provider = source,
                    section = %torrent.section,
                    path = ?download_dir,
                    "Dispatched release"
                );
            }
            Err(e) => {
                warn!(
                    release = release,
                    client = self.client.name(),
                    "Download client rejected release: {}",
                    e
                );
                return DispatchOutcome::Rejected;
            }
        }

        match self
            .history
            .record(&release_key, release, &torrent.section, source)
        {
            Ok(_) => DispatchOutcome::Recorded,
            Err(HistoryError::DuplicateKey(_)) => {
                debug!(release = release, "Release already in history");
                DispatchOutcome::AlreadyRecorded
            }
            Err(e) => {
                error!(
                    release = release,
                    key = %release_key,
                    "Release sent to client but not recorded in history: {}",
                    e
                );
                self.flag_unrecorded(UnrecordedRelease {
                    release_key,
                    release_name: torrent.release_name.clone(),
                    section: torrent.section.clone(),
                    source: source.to_string(),
                    error: e.to_string(),
                    accepted_at: Utc::now(),
                });
                DispatchOutcome::Unrecorded
            }
        }
    }

    /// `<section dl_path>/<directory name>` for a release.
    fn download_dir(&self, torrent: &TorrentData) -> Option<PathBuf> {
        let config = self.config.snapshot();
        let section = config.section(&torrent.section)?;
        let dir = directory_name(&parse(&torrent.release_name));
        Some(section.dl_path.join(dir))
    }

    fn flag_unrecorded(&self, release: UnrecordedRelease) {
        let mut pending = self.unrecorded.lock().unwrap_or_else(PoisonError::into_inner);
        match pending
            .iter_mut()
            .find(|p| p.release_key == release.release_key)
        {
            Some(existing) => existing.error = release.error,
            None => pending.push(release),
        }
        UNRECORDED_RELEASES.set(pending.len() as i64);
    }

    /// Releases the client has but history does not.
    pub fn unrecorded(&self) -> Vec<UnrecordedRelease> {
        self.unrecorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Try to record every flagged release again. Returns how many were
    /// resolved; the rest stay flagged.
    pub fn retry_unrecorded(&self) -> usize {
        let mut pending = self.unrecorded.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.is_empty() {
            return 0;
        }

        let before = pending.len();
        pending.retain_mut(|item| {
            match self.history.record(
                &item.release_key,
                &item.release_name,
                &item.section,
                &item.source,
            ) {
                Ok(_) | Err(HistoryError::DuplicateKey(_)) => {
                    info!(release = %item.release_name, "Recorded previously unrecorded release");
                    false
                }
                Err(e) => {
                    item.error = e.to_string();
                    true
                }
            }
        });
        UNRECORDED_RELEASES.set(pending.len() as i64);

        let resolved = before - pending.len();
        if !pending.is_empty() {
            warn!(remaining = pending.len(), "Releases still missing from history");
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, SectionConfig};
    use crate::history::{DedupRecord, SqliteHistoryStore};
    use crate::testing::{fixtures, MockTorrentClient};
    use crate::torrent_client::TorrentClientError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> (ConfigHandle, Arc<MockTorrentClient>, Arc<SqliteHistoryStore>) {
        let config = Config {
            sections: vec![SectionConfig::new("tv", dir.path().join("tv"))],
            ..Default::default()
        };
        (
            ConfigHandle::new(config),
            Arc::new(MockTorrentClient::new()),
            Arc::new(SqliteHistoryStore::in_memory().unwrap()),
        )
    }

    fn torrent(name: &str) -> TorrentData {
        TorrentData {
            release_name: name.to_string(),
            payload: fixtures::torrent_payload(name),
            section: "tv".to_string(),
        }
    }

    #[tokio::test]
    async fn test_add_records_and_creates_directory() {
        let dir = TempDir::new().unwrap();
        let (config, client, history) = setup(&dir);
        let dispatcher = Dispatcher::new(config, client.clone(), history.clone());

        let name = "Show.Name.S01E02.720p.HDTV-GRP";
        assert!(dispatcher.add(&torrent(name), "rss").await);

        let key = generate_release_key(name).unwrap();
        let record = history.get(&key).unwrap().unwrap();
        assert_eq!(record.section_id, "tv");
        assert_eq!(record.source_id, "rss");

        let expected_dir = dir.path().join("tv").join("Show Name");
        assert!(expected_dir.is_dir());

        let added = client.added_torrents().await;
        assert_eq!(added.len(), 1);
        assert_eq!(
            added[0].request.download_path.as_deref(),
            Some(expected_dir.to_string_lossy().as_ref())
        );
        assert_eq!(
            added[0].request.filename.as_deref(),
            Some("Show.Name.S01E02.720p.HDTV-GRP.torrent")
        );
    }

    #[tokio::test]
    async fn test_existing_directory_is_reused() {
        let dir = TempDir::new().unwrap();
        let (config, client, history) = setup(&dir);
        std::fs::create_dir_all(dir.path().join("tv").join("Show Name")).unwrap();
        let dispatcher = Dispatcher::new(config, client, history);

        assert_eq!(
            dispatcher
                .dispatch(&torrent("Show.Name.S01E03.720p.HDTV-GRP"), "rss")
                .await,
            DispatchOutcome::Recorded
        );
    }

    #[tokio::test]
    async fn test_client_failure_records_nothing() {
        let dir = TempDir::new().unwrap();
        let (config, client, history) = setup(&dir);
        client
            .set_next_error(TorrentClientError::ConnectionFailed("down".to_string()))
            .await;
        let dispatcher = Dispatcher::new(config, client, history.clone());

        assert!(!dispatcher.add(&torrent("Show.S01E01-GRP"), "rss").await);
        assert_eq!(history.count().unwrap(), 0);
        assert!(dispatcher.unrecorded().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_record_is_success() {
        let dir = TempDir::new().unwrap();
        let (config, client, history) = setup(&dir);
        let dispatcher = Dispatcher::new(config, client, history.clone());
        let name = "Show.Name.S01E02.PROPER.720p.HDTV-GRP";

        assert_eq!(
            dispatcher.dispatch(&torrent(name), "rss").await,
            DispatchOutcome::Recorded
        );
        assert_eq!(
            dispatcher.dispatch(&torrent(name), "rss").await,
            DispatchOutcome::AlreadyRecorded
        );
        assert_eq!(history.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_section_rejected() {
        let dir = TempDir::new().unwrap();
        let (config, client, history) = setup(&dir);
        let dispatcher = Dispatcher::new(config, client.clone(), history);
        let mut data = torrent("Show.S01E01-GRP");
        data.section = "gone".to_string();

        assert_eq!(dispatcher.dispatch(&data, "rss").await, DispatchOutcome::Rejected);
        assert!(client.added_torrents().await.is_empty());
    }

    /// Store whose writes fail until `healthy` is set.
    struct FlakyStore {
        inner: SqliteHistoryStore,
        healthy: AtomicBool,
    }

    impl HistoryStore for FlakyStore {
        fn exists(&self, key: &str) -> Result<bool, HistoryError> {
            self.inner.exists(key)
        }
        fn record(
            &self,
            key: &str,
            release_name: &str,
            section: &str,
            source: &str,
        ) -> Result<DedupRecord, HistoryError> {
            if !self.healthy.load(Ordering::SeqCst) {
                return Err(HistoryError::Database("database is locked".to_string()));
            }
            self.inner.record(key, release_name, section, source)
        }
        fn get(&self, key: &str) -> Result<Option<DedupRecord>, HistoryError> {
            self.inner.get(key)
        }
        fn recent(&self, limit: i64) -> Result<Vec<DedupRecord>, HistoryError> {
            self.inner.recent(limit)
        }
        fn count(&self) -> Result<i64, HistoryError> {
            self.inner.count()
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_is_flagged_and_retried() {
        let dir = TempDir::new().unwrap();
        let (config, client, _) = setup(&dir);
        let store = Arc::new(FlakyStore {
            inner: SqliteHistoryStore::in_memory().unwrap(),
            healthy: AtomicBool::new(false),
        });
        let dispatcher = Dispatcher::new(config, client.clone(), store.clone());
        let name = "Show.Name.S01E02.720p.HDTV-GRP";

        // Client accepted, so the release still counts as added
        assert!(dispatcher.add(&torrent(name), "rss").await);
        assert_eq!(client.torrent_count().await, 1);

        let flagged = dispatcher.unrecorded();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].release_name, name);
        assert!(flagged[0].error.contains("locked"));

        assert_eq!(dispatcher.retry_unrecorded(), 0);
        assert_eq!(dispatcher.unrecorded().len(), 1);

        store.healthy.store(true, Ordering::SeqCst);
        assert_eq!(dispatcher.retry_unrecorded(), 1);
        assert!(dispatcher.unrecorded().is_empty());
        assert!(store.exists(&generate_release_key(name).unwrap()).unwrap());
    }
}
