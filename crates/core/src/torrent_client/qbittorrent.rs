//! qBittorrent Web API backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{multipart, Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::QBittorrentConfig;

use super::{
    AddTorrentRequest, AddTorrentResult, TorrentClient, TorrentClientError,
    TorrentInfo, TorrentState,
};

pub struct QBittorrentClient {
    client: Client,
    config: QBittorrentConfig,
    /// Set once logged in; the SID cookie itself lives in the cookie jar.
    authenticated: Arc<RwLock<bool>>,
}

impl QBittorrentClient {
    pub fn new(config: QBittorrentConfig) -> Result<Self, TorrentClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .cookie_store(true)
            .build()
            .map_err(|e| TorrentClientError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            config,
            authenticated: Arc::new(RwLock::new(false)),
        })
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    async fn login(&self) -> Result<(), TorrentClientError> {
        let url = format!("{}/api/v2/auth/login", self.base_url());
        let params = [
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() && body.trim() == "Ok." {
            debug!("qBittorrent login successful");
            *self.authenticated.write().await = true;
            Ok(())
        } else if body.contains("Fails.") || status == StatusCode::FORBIDDEN {
            Err(TorrentClientError::AuthenticationFailed(
                "Invalid credentials".to_string(),
            ))
        } else {
            Err(TorrentClientError::AuthenticationFailed(format!(
                "Unexpected response: {}",
                body.chars().take(100).collect::<String>()
            )))
        }
    }

    async fn ensure_authenticated(&self) -> Result<(), TorrentClientError> {
        if *self.authenticated.read().await {
            return Ok(());
        }
        self.login().await
    }

    /// Send an authenticated request, logging in again once on 403.
    ///
    /// `build` is called per attempt since multipart bodies cannot be cloned.
    async fn send<F>(&self, endpoint: &str, build: F) -> Result<String, TorrentClientError>
    where
        F: Fn(&Client, &str) -> Result<RequestBuilder, TorrentClientError>,
    {
        self.ensure_authenticated().await?;

        let url = format!("{}{}", self.base_url(), endpoint);
        let mut response = build(&self.client, &url)?
            .send()
            .await
            .map_err(map_transport_error)?;

        if response.status() == StatusCode::FORBIDDEN {
            warn!("qBittorrent session expired, re-authenticating");
            *self.authenticated.write().await = false;
            self.login().await?;
            response = build(&self.client, &url)?
                .send()
                .await
                .map_err(map_transport_error)?;
        }

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(TorrentClientError::TorrentNotFound(endpoint.to_string()));
        }
        if status == StatusCode::UNSUPPORTED_MEDIA_TYPE {
            return Err(TorrentClientError::Rejected(
                "torrent file is not valid".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(TorrentClientError::ApiError(format!("HTTP {}", status)));
        }

        response
            .text()
            .await
            .map_err(|e| TorrentClientError::ApiError(e.to_string()))
    }

    async fn fetch_info(
        &self,
        query: Vec<(&'static str, String)>,
    ) -> Result<Vec<TorrentInfo>, TorrentClientError> {
        let body = self
            .send("/api/v2/torrents/info", |client, url| {
                Ok(client.get(url).query(&query))
            })
            .await?;

        let torrents: Vec<QBTorrentInfo> = serde_json::from_str(&body).map_err(|e| {
            TorrentClientError::ApiError(format!("Failed to parse response: {}", e))
        })?;
        Ok(torrents.into_iter().map(QBTorrentInfo::into_torrent_info).collect())
    }
}

fn map_transport_error(e: reqwest::Error) -> TorrentClientError {
    if e.is_timeout() {
        TorrentClientError::Timeout
    } else if e.is_connect() {
        TorrentClientError::ConnectionFailed(e.to_string())
    } else {
        TorrentClientError::ApiError(e.to_string())
    }
}

/// Subset of `/api/v2/torrents/info` entries we read.
#[derive(Debug, Deserialize)]
struct QBTorrentInfo {
    hash: String,
    name: String,
    state: String,
    #[serde(default)]
    progress: f64,
    #[serde(default)]
    size: i64,
    #[serde(default)]
    save_path: String,
    #[serde(default)]
    added_on: i64,
}

impl QBTorrentInfo {
    fn into_torrent_info(self) -> TorrentInfo {
        TorrentInfo {
            hash: self.hash.to_lowercase(),
            name: self.name,
            state: parse_qb_state(&self.state),
            progress: self.progress,
            size_bytes: self.size.max(0) as u64,
            save_path: (!self.save_path.is_empty()).then_some(self.save_path),
            added_at: timestamp_to_datetime(self.added_on),
        }
    }
}

fn parse_qb_state(state: &str) -> TorrentState {
    match state {
        "downloading" | "forcedDL" | "metaDL" | "allocating" => TorrentState::Downloading,
        "uploading" | "forcedUP" => TorrentState::Seeding,
        "pausedDL" | "pausedUP" | "stoppedDL" | "stoppedUP" => TorrentState::Paused,
        "checkingDL" | "checkingUP" | "checkingResumeData" | "moving" => TorrentState::Checking,
        "queuedDL" | "queuedUP" => TorrentState::Queued,
        "stalledDL" | "stalledUP" => TorrentState::Stalled,
        "error" | "missingFiles" => TorrentState::Error,
        _ => TorrentState::Unknown,
    }
}

fn timestamp_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    if ts > 0 {
        Utc.timestamp_opt(ts, 0).single()
    } else {
        None
    }
}

#[async_trait]
impl TorrentClient for QBittorrentClient {
    fn name(&self) -> &str {
        "qbittorrent"
    }

    async fn add_torrent(
        &self,
        request: AddTorrentRequest,
    ) -> Result<AddTorrentResult, TorrentClientError> {
        if request.data.is_empty() {
            return Err(TorrentClientError::InvalidTorrent("empty payload".to_string()));
        }
        let filename = request
            .filename
            .clone()
            .unwrap_or_else(|| "release.torrent".to_string());
        let save_path = request
            .download_path
            .clone()
            .or_else(|| self.config.download_path.clone());

        let body = self
            .send("/api/v2/torrents/add", |client, url| {
                let part = multipart::Part::bytes(request.data.clone())
                    .file_name(filename.clone())
                    .mime_str("application/x-bittorrent")
                    .map_err(|e| TorrentClientError::InvalidTorrent(e.to_string()))?;
                let mut form = multipart::Form::new().part("torrents", part);
                if let Some(path) = &save_path {
                    form = form.text("savepath", path.clone());
                }
                Ok(client.post(url).multipart(form))
            })
            .await?;

        // qBittorrent answers "Fails." when it already has the torrent
        match body.trim() {
            "Fails." => {
                debug!(torrent = %filename, "qBittorrent already has torrent");
                Ok(AddTorrentResult {
                    hash: None,
                    duplicate: true,
                })
            }
            // Newer Web API versions answer with a JSON summary
            "Ok." | "" => Ok(AddTorrentResult::default()),
            json if json.starts_with('{') => Ok(AddTorrentResult::default()),
            other => Err(TorrentClientError::Rejected(
                other.chars().take(100).collect(),
            )),
        }
    }

    async fn list_torrents(&self) -> Result<Vec<TorrentInfo>, TorrentClientError> {
        self.fetch_info(Vec::new()).await
    }

    async fn get_torrent(&self, hash: &str) -> Result<TorrentInfo, TorrentClientError> {
        self.fetch_info(vec![("hashes", hash.to_lowercase())])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TorrentClientError::TorrentNotFound(hash.to_string()))
    }

    async fn remove_torrent(&self, hash: &str, delete_files: bool) -> Result<(), TorrentClientError> {
        let hash = hash.to_lowercase();
        let delete = if delete_files { "true" } else { "false" };
        self.send("/api/v2/torrents/delete", |client, url| {
            Ok(client
                .post(url)
                .form(&[("hashes", hash.as_str()), ("deleteFiles", delete)]))
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> QBittorrentClient {
        QBittorrentClient::new(QBittorrentConfig {
            url: server.uri(),
            username: "admin".to_string(),
            password: "secret".to_string(),
            download_path: None,
            timeout_secs: 5,
        })
        .unwrap()
    }

    async fn mount_login(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/api/v2/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Ok."))
            .mount(server)
            .await;
    }

    #[test]
    fn test_parse_qb_state() {
        assert_eq!(parse_qb_state("forcedDL"), TorrentState::Downloading);
        assert_eq!(parse_qb_state("uploading"), TorrentState::Seeding);
        assert_eq!(parse_qb_state("stoppedUP"), TorrentState::Paused);
        assert_eq!(parse_qb_state("checkingResumeData"), TorrentState::Checking);
        assert_eq!(parse_qb_state("queuedDL"), TorrentState::Queued);
        assert_eq!(parse_qb_state("stalledUP"), TorrentState::Stalled);
        assert_eq!(parse_qb_state("missingFiles"), TorrentState::Error);
        assert_eq!(parse_qb_state("something_else"), TorrentState::Unknown);
    }

    #[test]
    fn test_timestamp_to_datetime() {
        assert_eq!(timestamp_to_datetime(1703980800).unwrap().year(), 2023);
        assert!(timestamp_to_datetime(0).is_none());
        assert!(timestamp_to_datetime(-1).is_none());
    }

    #[tokio::test]
    async fn test_add_torrent_ok() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/v2/torrents/add"))
            .and(body_string_contains("/data/tv/Show Name"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Ok."))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let result = client
            .add_torrent(
                AddTorrentRequest::torrent_file(b"d4:infod4:name4:testee".to_vec())
                    .with_download_path("/data/tv/Show Name"),
            )
            .await
            .unwrap();
        assert!(!result.duplicate);
    }

    #[tokio::test]
    async fn test_add_duplicate_is_accepted() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/v2/torrents/add"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Fails."))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let result = client
            .add_torrent(AddTorrentRequest::torrent_file(vec![1, 2, 3]))
            .await
            .unwrap();
        assert!(result.duplicate);
    }

    #[tokio::test]
    async fn test_add_unexpected_answer_is_rejected() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/v2/torrents/add"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Disk full"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .add_torrent(AddTorrentRequest::torrent_file(vec![1, 2, 3]))
            .await
            .unwrap_err();
        assert!(matches!(err, TorrentClientError::Rejected(ref msg) if msg == "Disk full"));
    }

    #[tokio::test]
    async fn test_add_invalid_file_is_rejected() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/v2/torrents/add"))
            .respond_with(ResponseTemplate::new(415).set_body_string("Torrent file is not valid"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .add_torrent(AddTorrentRequest::torrent_file(vec![1, 2, 3]))
            .await
            .unwrap_err();
        assert!(matches!(err, TorrentClientError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_add_empty_payload_rejected() {
        let server = MockServer::start().await;
        let client = client_for(&server);
        let err = client
            .add_torrent(AddTorrentRequest::torrent_file(Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, TorrentClientError::InvalidTorrent(_)));
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Fails."))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .add_torrent(AddTorrentRequest::torrent_file(vec![1]))
            .await
            .unwrap_err();
        assert!(matches!(err, TorrentClientError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_api_error() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/v2/torrents/add"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .add_torrent(AddTorrentRequest::torrent_file(vec![1]))
            .await
            .unwrap_err();
        assert!(matches!(err, TorrentClientError::ApiError(_)));
    }

    #[tokio::test]
    async fn test_list_and_get_torrents() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        let body = serde_json::json!([
            {"hash": "ABC123", "name": "Show.Name.S01E02-GRP", "state": "downloading",
             "progress": 0.5, "size": 1000, "save_path": "/data/tv", "added_on": 1703980800},
            {"hash": "def456", "name": "Other.Movie.2020-GRP", "state": "uploading",
             "progress": 1.0, "size": 2000, "save_path": "", "added_on": 0}
        ]);
        Mock::given(method("GET"))
            .and(path("/api/v2/torrents/info"))
            .and(query_param("hashes", "abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!([body[0].clone()]),
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/torrents/info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let all = client.list_torrents().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].hash, "abc123");
        assert_eq!(all[1].save_path, None);

        let one = client.get_torrent("ABC123").await.unwrap();
        assert_eq!(one.state, TorrentState::Downloading);
        assert_eq!(one.save_path.as_deref(), Some("/data/tv"));
    }

    #[tokio::test]
    async fn test_remove_torrent() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/v2/torrents/delete"))
            .and(body_string_contains("deleteFiles=true"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.remove_torrent("ABC", true).await.unwrap();
    }
}
