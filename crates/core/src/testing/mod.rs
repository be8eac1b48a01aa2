//! Testing utilities: a mock download client and fixture builders.
//!
//! ```rust,ignore
//! use releasewatch_core::testing::{fixtures, MockTorrentClient};
//!
//! let client = MockTorrentClient::new();
//! let rss = fixtures::rss_feed(&[("Show.S01E01.720p.HDTV-GRP", "http://host/1.torrent")]);
//! ```

mod mock_torrent_client;

pub use mock_torrent_client::{MockTorrentClient, RecordedAddTorrent};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;

    use crate::config::{Config, FeedConfig, MediaFilter, SectionConfig};

    /// A section accepting every release, downloading below `dl_path`.
    pub fn section(name: &str, dl_path: impl AsRef<Path>) -> SectionConfig {
        SectionConfig::new(name, dl_path.as_ref())
    }

    /// A TV-only section.
    pub fn tv_section(name: &str, dl_path: impl AsRef<Path>) -> SectionConfig {
        let mut s = section(name, dl_path);
        s.media = MediaFilter::Tv;
        s
    }

    pub fn feed(name: &str, url: &str) -> FeedConfig {
        FeedConfig {
            name: name.to_string(),
            url: url.to_string(),
            enabled: true,
            interval_secs: 300,
            timeout_secs: 5,
        }
    }

    /// Config with the given sections and defaults for everything else.
    pub fn config_with_sections(sections: Vec<SectionConfig>) -> Config {
        Config {
            sections,
            ..Default::default()
        }
    }

    /// Minimal RSS 2.0 document with one item per `(title, link)`.
    pub fn rss_feed(items: &[(&str, &str)]) -> String {
        let items: String = items
            .iter()
            .map(|(title, link)| {
                format!(
                    "<item><title>{}</title><link>{}</link><guid>{}</guid></item>",
                    title, link, link
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>test feed</title><link>http://example.invalid/</link><description>releases</description>{}</channel></rss>"#,
            items
        )
    }

    /// Bytes standing in for a .torrent file, unique per release name.
    pub fn torrent_payload(release_name: &str) -> Vec<u8> {
        format!("d4:infod4:name{}:{}ee", release_name.len(), release_name).into_bytes()
    }
}
