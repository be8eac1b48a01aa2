use std::collections::HashSet;

use super::{types::Config, ConfigError, TorrentClientBackend};

/// Validate configuration
/// Currently validates:
/// - Scheduler tick interval is not 0
/// - Section names are unique, each has a download path and compilable patterns
/// - Feeds and services carry a URL (services also an API token)
/// - An enabled proxy names a server
/// - The selected torrent client backend has its settings block
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.scheduler.tick_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.tick_interval_ms cannot be 0".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for section in &config.sections {
        if !names.insert(section.name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate section name: {}",
                section.name
            )));
        }
        if section.dl_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "sections.{}.dl_path cannot be empty",
                section.name
            )));
        }
        for pattern in &section.patterns {
            regex_lite::Regex::new(pattern).map_err(|e| {
                ConfigError::ValidationError(format!(
                    "sections.{}: invalid pattern {:?}: {}",
                    section.name, pattern, e
                ))
            })?;
        }
    }

    for feed in &config.feeds {
        if feed.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "feeds.{}.url cannot be empty",
                feed.name
            )));
        }
    }

    for service in &config.services {
        if service.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "services.{}.url cannot be empty",
                service.name
            )));
        }
        if service.enabled && service.api_token.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "services.{}.api_token cannot be empty",
                service.name
            )));
        }
    }

    if let Some(proxy) = &config.proxy {
        if proxy.enabled && proxy.server.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "proxy.server cannot be empty when the proxy is enabled".to_string(),
            ));
        }
    }

    if let Some(tc) = &config.torrent_client {
        match tc.backend {
            TorrentClientBackend::QBittorrent if tc.qbittorrent.is_none() => {
                return Err(ConfigError::ValidationError(
                    "torrent_client.backend is qbittorrent but [torrent_client.qbittorrent] is missing"
                        .to_string(),
                ));
            }
            TorrentClientBackend::QBittorrent => {}
        }
    }

    Ok(())
}
