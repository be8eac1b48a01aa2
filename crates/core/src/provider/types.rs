//! Types shared by release providers.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::Config;
use crate::history::HistoryStore;

use super::btn::RpcError;

/// A release that passed the pipeline, with its .torrent payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentData {
    pub release_name: String,
    /// Raw .torrent file bytes.
    pub payload: Vec<u8>,
    /// Name of the section the release was matched to.
    pub section: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// RSS/Atom feed.
    Feed,
    /// Tracker API.
    Api,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Feed => "feed",
            ProviderKind::Api => "api",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from a provider poll or a payload download.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("HTTP error: status {0}")]
    HttpStatus(u16),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Response too large")]
    ResponseTooLarge,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
}

impl ProviderError {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Timeout => "timeout",
            ProviderError::Connection(_) => "connection",
            ProviderError::HttpStatus(_) | ProviderError::Http(_) => "http",
            ProviderError::ResponseTooLarge => "too_large",
            ProviderError::Parse(_) => "parse",
            ProviderError::Rpc(e) => e.kind(),
        }
    }

    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_connect() {
            ProviderError::Connection(e.to_string())
        } else if let Some(status) = e.status() {
            ProviderError::HttpStatus(status.as_u16())
        } else {
            ProviderError::Http(e.to_string())
        }
    }
}

/// What a provider can see during one poll.
///
/// Built by the scheduler from the configuration snapshot of the current tick.
#[derive(Clone, Copy)]
pub struct ProviderContext<'a> {
    pub config: &'a Config,
    pub history: &'a dyn HistoryStore,
}

impl<'a> ProviderContext<'a> {
    pub fn new(config: &'a Config, history: &'a dyn HistoryStore) -> Self {
        Self { config, history }
    }
}

/// A source of release candidates.
///
/// Each call produces a fresh, finite list. Poll intervals and cooldowns are
/// the provider's own state; a provider that is not due returns an empty list
/// without touching the network.
#[async_trait]
pub trait Provider: Send {
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    fn is_enabled(&self) -> bool;

    async fn fetch_candidates(
        &mut self,
        ctx: ProviderContext<'_>,
    ) -> Result<Vec<TorrentData>, ProviderError>;
}
