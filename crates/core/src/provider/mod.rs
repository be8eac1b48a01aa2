//! Release providers: where candidate releases come from.
//!
//! Two kinds exist: RSS/Atom feeds and the BTN JSON-RPC API. Both run their
//! entries through the same [`CandidatePipeline`] and hand back
//! [`TorrentData`] ready for the dispatcher.

mod btn;
mod feed;
mod fetch;
mod pipeline;
mod types;

pub use btn::{
    error_message, BrowseEntry, BtnProvider, RpcError, TorrentId, CALL_LIMIT_EXCEEDED, COOLDOWN,
    INVALID_API_KEY,
};
pub use feed::{parse_entries, FeedEntry, FeedProvider};
pub use fetch::HttpFetcher;
pub use pipeline::{Candidate, CandidatePipeline};
pub use types::{Provider, ProviderContext, ProviderError, ProviderKind, TorrentData};

use crate::config::{Config, ServiceBackend};

/// Build every provider the configuration declares: feeds first, then API
/// services, each in declaration order.
pub fn build_providers(config: &Config) -> Result<Vec<Box<dyn Provider>>, ProviderError> {
    let proxy = config.proxy_url();
    let mut providers: Vec<Box<dyn Provider>> = Vec::new();
    for feed in &config.feeds {
        providers.push(Box::new(FeedProvider::with_proxy(feed.clone(), proxy)?));
    }
    for service in &config.services {
        match service.backend {
            ServiceBackend::Btn => {
                providers.push(Box::new(BtnProvider::with_proxy(service.clone(), proxy)?))
            }
        }
    }
    Ok(providers)
}

/// Call `userInfo` once for every enabled API service.
///
/// Returns `(service name, outcome)` pairs in declaration order. Failures are
/// already logged by the provider.
pub async fn verify_credentials(
    config: &Config,
) -> Result<Vec<(String, Result<(), RpcError>)>, ProviderError> {
    let mut outcomes = Vec::new();
    for service in config.enabled_services() {
        match service.backend {
            ServiceBackend::Btn => {
                let mut provider = BtnProvider::with_proxy(service.clone(), config.proxy_url())?;
                let outcome = provider.user_info().await.map(|_| ());
                outcomes.push((service.name.clone(), outcome));
            }
        }
    }
    Ok(outcomes)
}
