//! BroadcastTheNet JSON-RPC provider.
//!
//! Every call carries the API token as its first positional parameter. A
//! "call limit exceeded" answer puts the provider into a five minute cooldown
//! during which polls return nothing and make no request.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::ServiceConfig;
use crate::metrics::{COOLDOWNS_TOTAL, PROVIDER_ERRORS_TOTAL};

use super::fetch::HttpFetcher;
use super::pipeline::CandidatePipeline;
use super::types::{Provider, ProviderContext, ProviderError, ProviderKind, TorrentData};

pub const INVALID_API_KEY: i64 = -32001;
pub const CALL_LIMIT_EXCEEDED: i64 = -32002;

/// How long to stay quiet after hitting the call limit.
pub const COOLDOWN: Duration = Duration::from_secs(300);

/// Known API error codes.
pub fn error_message(code: i64) -> Option<&'static str> {
    match code {
        INVALID_API_KEY => Some("Invalid API Key"),
        CALL_LIMIT_EXCEEDED => Some("Call limit exceeded"),
        _ => None,
    }
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("JSON-RPC protocol error {code}: {message}")]
    Protocol { code: i64, message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Unknown API error: {0}")]
    Unknown(String),
}

impl RpcError {
    pub fn kind(&self) -> &'static str {
        match self {
            RpcError::Protocol {
                code: CALL_LIMIT_EXCEEDED,
                ..
            } => "rate_limited",
            RpcError::Protocol { .. } => "protocol",
            RpcError::Timeout => "timeout",
            RpcError::Connection(_) => "connection",
            RpcError::Unknown(_) => "unknown",
        }
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RpcError::Timeout
        } else if e.is_connect() {
            RpcError::Connection(e.to_string())
        } else {
            RpcError::Unknown(e.to_string())
        }
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Vec<Value>,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    #[serde(default)]
    message: String,
}

/// BTN reports ids as strings or numbers depending on the call.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TorrentId {
    Number(u64),
    Text(String),
}

impl TorrentId {
    fn sort_key(&self) -> (u64, String) {
        match self {
            TorrentId::Number(n) => (*n, String::new()),
            TorrentId::Text(s) => (s.parse().unwrap_or(u64::MAX), s.clone()),
        }
    }
}

impl std::fmt::Display for TorrentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TorrentId::Number(n) => write!(f, "{}", n),
            TorrentId::Text(s) => f.write_str(s),
        }
    }
}

/// One entry of a `getTorrentsBrowse` answer.
#[derive(Debug, Clone, Deserialize)]
pub struct BrowseEntry {
    #[serde(rename = "ReleaseName")]
    pub release_name: String,
    #[serde(rename = "Origin", default)]
    pub origin: String,
    #[serde(rename = "TorrentID")]
    pub torrent_id: TorrentId,
    #[serde(rename = "DownloadURL", default)]
    pub download_url: Option<String>,
}

impl BrowseEntry {
    pub fn is_scene(&self) -> bool {
        self.origin == "Scene"
    }
}

/// Pull entries out of a browse result, oldest torrent id first.
///
/// `torrents` is an object keyed by id, or an empty list when nothing matched.
fn browse_entries(result: &Value) -> Result<Vec<BrowseEntry>, RpcError> {
    let raw: Vec<&Value> = match result.get("torrents") {
        Some(Value::Object(map)) => map.values().collect(),
        Some(Value::Array(list)) => list.iter().collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            return Err(RpcError::Unknown(format!(
                "unexpected torrents payload: {}",
                other
            )))
        }
    };

    let mut entries: Vec<BrowseEntry> = raw
        .into_iter()
        .filter_map(|v| match BrowseEntry::deserialize(v) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Ignoring malformed browse entry: {}", e);
                None
            }
        })
        .collect();
    entries.sort_by_key(|e| e.torrent_id.sort_key());
    Ok(entries)
}

pub struct BtnProvider {
    config: ServiceConfig,
    fetcher: HttpFetcher,
    next_id: u64,
    cooldown_until: Option<Instant>,
}

impl BtnProvider {
    pub fn new(config: ServiceConfig) -> Result<Self, ProviderError> {
        Self::with_proxy(config, None)
    }

    /// API calls and payload downloads both use `proxy` when given.
    pub fn with_proxy(config: ServiceConfig, proxy: Option<&str>) -> Result<Self, ProviderError> {
        let fetcher = HttpFetcher::with_proxy(config.timeout_secs, proxy)?;
        info!(
            provider = %config.name,
            "Initialized BTN provider ({})",
            if config.enabled { "enabled" } else { "disabled" }
        );
        Ok(Self {
            config,
            fetcher,
            next_id: 0,
            cooldown_until: None,
        })
    }

    pub fn in_cooldown(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    pub fn cooldown_until(&self) -> Option<Instant> {
        self.cooldown_until
    }

    /// Invoke `method` with the API token prepended to `args`.
    pub async fn call(&mut self, method: &str, args: Vec<Value>) -> Result<Value, RpcError> {
        self.next_id += 1;
        let mut params = Vec::with_capacity(args.len() + 1);
        params.push(Value::String(self.config.api_token.clone()));
        params.extend(args);

        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id,
        };

        let response = self
            .fetcher
            .client()
            .post(&self.config.url)
            .json(&request)
            .send()
            .await
            .map_err(RpcError::from_reqwest)?;

        let status = response.status();
        let body: RpcResponse = match response.json().await {
            Ok(body) => body,
            Err(e) if e.is_timeout() => return Err(RpcError::Timeout),
            Err(e) if !status.is_success() => {
                return Err(RpcError::Unknown(format!("HTTP {}: {}", status, e)))
            }
            Err(e) => return Err(RpcError::Unknown(format!("invalid response: {}", e))),
        };

        if let Some(err) = body.error {
            return Err(RpcError::Protocol {
                code: err.code,
                message: err.message,
            });
        }
        if !status.is_success() {
            return Err(RpcError::Unknown(format!("HTTP {}", status)));
        }
        body.result
            .ok_or_else(|| RpcError::Unknown("response carries neither result nor error".to_string()))
    }

    /// Log a failed call and enter the cooldown when the call limit was hit.
    fn handle_error(&mut self, method: &str, err: &RpcError) {
        PROVIDER_ERRORS_TOTAL
            .with_label_values(&[self.config.name.as_str(), err.kind()])
            .inc();
        match err {
            RpcError::Protocol { code, message } => {
                let known = error_message(*code).unwrap_or("");
                error!(
                    provider = %self.config.name,
                    method = method,
                    code = code,
                    "JSON-RPC protocol error calling BTN API: {} {}",
                    known,
                    message
                );
                if *code == CALL_LIMIT_EXCEEDED {
                    self.cooldown_until = Some(Instant::now() + COOLDOWN);
                    COOLDOWNS_TOTAL.inc();
                    info!(provider = %self.config.name, "Pausing for API cool down");
                }
            }
            RpcError::Timeout => {
                warn!(provider = %self.config.name, method = method, "Timeout accessing BTN API");
            }
            RpcError::Connection(e) => {
                error!(provider = %self.config.name, method = method, "Connection error calling BTN API: {}", e);
            }
            RpcError::Unknown(e) => {
                error!(provider = %self.config.name, method = method, "Unknown BTN API call error: {}", e);
            }
        }
    }

    /// Call and classify; `None` on any failure.
    async fn checked_call(&mut self, method: &str, args: Vec<Value>) -> Option<Value> {
        match self.call(method, args).await {
            Ok(value) => Some(value),
            Err(e) => {
                self.handle_error(method, &e);
                None
            }
        }
    }

    /// Account details for the configured token. Used as a credential check.
    pub async fn user_info(&mut self) -> Result<Value, RpcError> {
        let result = self.call("userInfo", Vec::new()).await;
        if let Err(e) = &result {
            self.handle_error("userInfo", e);
        }
        result
    }

    /// Most recent uploads.
    pub async fn torrents_browse(&mut self, results: u32) -> Option<Vec<BrowseEntry>> {
        let result = self
            .checked_call("getTorrentsBrowse", vec![json!(results)])
            .await?;
        match browse_entries(&result) {
            Ok(entries) => Some(entries),
            Err(e) => {
                self.handle_error("getTorrentsBrowse", &e);
                None
            }
        }
    }

    /// Download URL for a torrent id.
    pub async fn torrent_url(&mut self, id: &TorrentId) -> Option<String> {
        let value = self
            .checked_call("getTorrentsUrl", vec![json!(id.to_string())])
            .await?;
        match value {
            Value::String(url) if !url.is_empty() => Some(url),
            other => {
                warn!(provider = %self.config.name, torrent_id = %id, "Unexpected getTorrentsUrl answer: {}", other);
                None
            }
        }
    }
}

#[async_trait]
impl Provider for BtnProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Api
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn fetch_candidates(
        &mut self,
        ctx: ProviderContext<'_>,
    ) -> Result<Vec<TorrentData>, ProviderError> {
        if self.in_cooldown(Instant::now()) {
            debug!(provider = %self.config.name, "In API cooldown, skipping poll");
            return Ok(Vec::new());
        }

        let Some(mut entries) = self.torrents_browse(self.config.results).await else {
            debug!(provider = %self.config.name, "Failed to fetch releases");
            return Ok(Vec::new());
        };
        if self.config.scene_only {
            entries.retain(BrowseEntry::is_scene);
        }

        let name = self.config.name.clone();
        let pipeline = CandidatePipeline::new(ctx, &name);
        let mut found = Vec::new();
        for entry in entries {
            // A rate limit hit mid-poll ends the poll
            if self.in_cooldown(Instant::now()) {
                debug!(provider = %self.config.name, "Entered API cooldown, stopping poll");
                break;
            }
            let Some(candidate) = pipeline.screen(&entry.release_name) else {
                continue;
            };
            let url = match entry.download_url.as_deref().filter(|u| !u.is_empty()) {
                Some(url) => Some(url.to_string()),
                None => self.torrent_url(&entry.torrent_id).await,
            };
            let payload = match url {
                Some(url) => self.fetcher.fetch(&url).await,
                None => Err(ProviderError::Parse(format!(
                    "no download URL for torrent {}",
                    entry.torrent_id
                ))),
            };
            if let Some(data) = pipeline.emit(candidate, payload) {
                found.push(data);
            }
        }
        Ok(found)
    }
}
