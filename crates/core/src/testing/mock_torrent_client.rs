//! Mock download client for testing.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::torrent_client::{
    AddTorrentRequest, AddTorrentResult, TorrentClient, TorrentClientError,
    TorrentInfo, TorrentState,
};

/// A recorded torrent addition for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedAddTorrent {
    pub request: AddTorrentRequest,
    pub timestamp: chrono::DateTime<Utc>,
}

/// Mock implementation of the TorrentClient trait.
///
/// Records every add, keeps added torrents listable, and can be told to fail
/// the next call. Re-adding identical payload bytes reports a duplicate, the
/// way qBittorrent does.
///
/// ```rust,ignore
/// let client = MockTorrentClient::new();
/// client.add_torrent(AddTorrentRequest::torrent_file(bytes)).await?;
/// assert_eq!(client.added_torrents().await.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockTorrentClient {
    added: Arc<RwLock<Vec<RecordedAddTorrent>>>,
    /// Torrents by hash.
    torrents: Arc<RwLock<HashMap<String, TorrentInfo>>>,
    /// Hash per payload, for duplicate detection.
    payloads: Arc<RwLock<HashMap<Vec<u8>, String>>>,
    /// If set, the next operation fails with this error.
    next_error: Arc<RwLock<Option<TorrentClientError>>>,
    hash_counter: AtomicU32,
}

impl MockTorrentClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// All add_torrent calls that reached the client, duplicates included.
    pub async fn added_torrents(&self) -> Vec<RecordedAddTorrent> {
        self.added.read().await.clone()
    }

    pub async fn clear_recorded(&self) {
        self.added.write().await.clear();
    }

    /// Fail the next operation with `error`.
    pub async fn set_next_error(&self, error: TorrentClientError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn clear_next_error(&self) {
        *self.next_error.write().await = None;
    }

    pub async fn has_torrent(&self, hash: &str) -> bool {
        self.torrents.read().await.contains_key(hash)
    }

    pub async fn torrent_count(&self) -> usize {
        self.torrents.read().await.len()
    }

    pub async fn set_state(&self, hash: &str, state: TorrentState) {
        if let Some(info) = self.torrents.write().await.get_mut(hash) {
            info.state = state;
        }
    }

    async fn take_error(&self) -> Option<TorrentClientError> {
        self.next_error.write().await.take()
    }

    fn next_hash(&self) -> String {
        let n = self.hash_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("mockhash{:08x}", n)
    }
}

#[async_trait]
impl TorrentClient for MockTorrentClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn add_torrent(
        &self,
        request: AddTorrentRequest,
    ) -> Result<AddTorrentResult, TorrentClientError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }

        self.added.write().await.push(RecordedAddTorrent {
            request: request.clone(),
            timestamp: Utc::now(),
        });

        let mut payloads = self.payloads.write().await;
        if let Some(hash) = payloads.get(&request.data) {
            return Ok(AddTorrentResult {
                hash: Some(hash.clone()),
                duplicate: true,
            });
        }

        let hash = self.next_hash();
        payloads.insert(request.data.clone(), hash.clone());

        let info = TorrentInfo {
            hash: hash.clone(),
            name: request
                .filename
                .clone()
                .unwrap_or_else(|| format!("Mock Torrent {}", hash)),
            state: TorrentState::Downloading,
            progress: 0.0,
            size_bytes: request.data.len() as u64,
            save_path: request.download_path.clone(),
            added_at: Some(Utc::now()),
        };
        self.torrents.write().await.insert(hash.clone(), info);

        Ok(AddTorrentResult {
            hash: Some(hash),
            duplicate: false,
        })
    }

    async fn list_torrents(&self) -> Result<Vec<TorrentInfo>, TorrentClientError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }

        let torrents = self.torrents.read().await;
        let mut result: Vec<TorrentInfo> = torrents.values().cloned().collect();
        result.sort_by(|a, b| a.hash.cmp(&b.hash));
        Ok(result)
    }

    async fn get_torrent(&self, hash: &str) -> Result<TorrentInfo, TorrentClientError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }

        self.torrents
            .read()
            .await
            .get(hash)
            .cloned()
            .ok_or_else(|| TorrentClientError::TorrentNotFound(hash.to_string()))
    }

    async fn remove_torrent(
        &self,
        hash: &str,
        _delete_files: bool,
    ) -> Result<(), TorrentClientError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }

        if self.torrents.write().await.remove(hash).is_some() {
            self.payloads.write().await.retain(|_, h| h != hash);
            Ok(())
        } else {
            Err(TorrentClientError::TorrentNotFound(hash.to_string()))
        }
    }
}
