//! RSS/Atom feed provider.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use feed_rs::parser;
use tracing::debug;

use crate::config::FeedConfig;

use super::fetch::HttpFetcher;
use super::pipeline::CandidatePipeline;
use super::types::{Provider, ProviderContext, ProviderError, ProviderKind, TorrentData};

/// One entry of a feed: the announced name and where its .torrent lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub url: String,
}

/// Parse an RSS or Atom document into entries.
///
/// Entries without a title or without any link are dropped.
pub fn parse_entries(bytes: &[u8]) -> Result<Vec<FeedEntry>, ProviderError> {
    let feed = parser::parse(bytes).map_err(|e| ProviderError::Parse(e.to_string()))?;

    let entries = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let title = entry.title.map(|t| t.content.trim().to_string())?;
            let url = entry.links.first().map(|l| l.href.clone()).or_else(|| {
                entry
                    .media
                    .iter()
                    .flat_map(|m| m.content.iter())
                    .find_map(|c| c.url.as_ref().map(|u| u.to_string()))
            })?;
            Some(FeedEntry { title, url })
        })
        .collect();

    Ok(entries)
}

pub struct FeedProvider {
    config: FeedConfig,
    fetcher: HttpFetcher,
    last_poll: Option<Instant>,
}

impl FeedProvider {
    pub fn new(config: FeedConfig) -> Result<Self, ProviderError> {
        Self::with_proxy(config, None)
    }

    pub fn with_proxy(config: FeedConfig, proxy: Option<&str>) -> Result<Self, ProviderError> {
        let fetcher = HttpFetcher::with_proxy(config.timeout_secs, proxy)?;
        Ok(Self {
            config,
            fetcher,
            last_poll: None,
        })
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(self.config.interval_secs)
    }

    /// Whether the poll interval has elapsed since the last attempt.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_poll {
            None => true,
            Some(last) => now.duration_since(last) >= self.interval(),
        }
    }
}

#[async_trait]
impl Provider for FeedProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Feed
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn fetch_candidates(
        &mut self,
        ctx: ProviderContext<'_>,
    ) -> Result<Vec<TorrentData>, ProviderError> {
        let now = Instant::now();
        if !self.is_due(now) {
            return Ok(Vec::new());
        }

        // A failed fetch is retried on the next tick
        let body = self.fetcher.fetch(&self.config.url).await?;
        let entries = parse_entries(&body)?;
        self.last_poll = Some(now);
        debug!(provider = %self.config.name, entries = entries.len(), "Fetched feed");

        let pipeline = CandidatePipeline::new(ctx, &self.config.name);
        let mut found = Vec::new();
        for entry in entries {
            let Some(candidate) = pipeline.screen(&entry.title) else {
                continue;
            };
            let payload = self.fetcher.fetch(&entry.url).await;
            if let Some(data) = pipeline.emit(candidate, payload) {
                found.push(data);
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::history::{generate_release_key, HistoryStore, SqliteHistoryStore};
    use crate::testing::fixtures;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>atom</title>
  <id>urn:test</id>
  <updated>2024-01-01T00:00:00Z</updated>
  <entry>
    <title>Show.Name.S01E01.720p.HDTV-GRP</title>
    <id>urn:1</id>
    <updated>2024-01-01T00:00:00Z</updated>
    <link href="http://host/1.torrent"/>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_rss_entries() {
        let xml = fixtures::rss_feed(&[
            ("Show.Name.S01E01.720p.HDTV-GRP", "http://host/1.torrent"),
            ("  Other.Show.S02E03.HDTV-LOL ", "http://host/2.torrent"),
        ]);
        let entries = parse_entries(xml.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "Show.Name.S01E01.720p.HDTV-GRP");
        assert_eq!(entries[0].url, "http://host/1.torrent");
        assert_eq!(entries[1].title, "Other.Show.S02E03.HDTV-LOL");
    }

    #[test]
    fn test_parse_rss_enclosure() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>t</title><link>http://host/</link><description>d</description>
<item><title>Show.S01E01-GRP</title><enclosure url="http://host/e.torrent" length="10" type="application/x-bittorrent"/></item>
</channel></rss>"#;
        let entries = parse_entries(xml.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, "http://host/e.torrent");
    }

    #[test]
    fn test_parse_atom_entries() {
        let entries = parse_entries(ATOM.as_bytes()).unwrap();
        assert_eq!(entries[0].url, "http://host/1.torrent");
    }

    #[test]
    fn test_parse_garbage() {
        let err = parse_entries(b"not a feed").unwrap_err();
        assert!(matches!(err, ProviderError::Parse(_)));
    }

    async fn feed_server(items: &[(&str, &str)]) -> MockServer {
        let server = MockServer::start().await;
        let links: Vec<(String, String)> = items
            .iter()
            .map(|(title, file)| (title.to_string(), format!("{}/{}", server.uri(), file)))
            .collect();
        let refs: Vec<(&str, &str)> = links.iter().map(|(t, u)| (t.as_str(), u.as_str())).collect();
        Mock::given(method("GET"))
            .and(path("/rss"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixtures::rss_feed(&refs)))
            .mount(&server)
            .await;
        for (title, file) in items {
            Mock::given(method("GET"))
                .and(path(format!("/{}", file)))
                .respond_with(
                    ResponseTemplate::new(200).set_body_bytes(fixtures::torrent_payload(title)),
                )
                .mount(&server)
                .await;
        }
        server
    }

    #[tokio::test]
    async fn test_fetch_candidates_screens_entries() {
        let server = feed_server(&[
            ("Show.Name.S01E01.720p.HDTV-GRP", "1.torrent"),
            ("Show.Name.S01E02.720p.HDTV-GRP", "2.torrent"),
            ("Some.Movie.2010.1080p.BluRay-GRP", "3.torrent"),
        ])
        .await;

        let config = fixtures::config_with_sections(vec![fixtures::tv_section("tv", "/data/tv")]);
        let store = SqliteHistoryStore::in_memory().unwrap();
        let known = "Show.Name.S01E02.720p.HDTV-GRP";
        store
            .record(&generate_release_key(known).unwrap(), known, "tv", "rss")
            .unwrap();

        let mut provider =
            FeedProvider::new(fixtures::feed("rss", &format!("{}/rss", server.uri()))).unwrap();
        let found = provider
            .fetch_candidates(ProviderContext::new(&config, &store))
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].release_name, "Show.Name.S01E01.720p.HDTV-GRP");
        assert_eq!(found[0].section, "tv");
        assert_eq!(
            found[0].payload,
            fixtures::torrent_payload("Show.Name.S01E01.720p.HDTV-GRP")
        );
    }

    #[tokio::test]
    async fn test_interval_prevents_refetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rss"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixtures::rss_feed(&[])))
            .expect(1)
            .mount(&server)
            .await;

        let config = Config::default();
        let store = SqliteHistoryStore::in_memory().unwrap();
        let mut provider =
            FeedProvider::new(fixtures::feed("rss", &format!("{}/rss", server.uri()))).unwrap();

        provider
            .fetch_candidates(ProviderContext::new(&config, &store))
            .await
            .unwrap();
        let second = provider
            .fetch_candidates(ProviderContext::new(&config, &store))
            .await
            .unwrap();
        assert!(second.is_empty());
        assert!(!provider.is_due(Instant::now()));
    }

    #[tokio::test]
    async fn test_missing_payload_skips_entry() {
        let server = MockServer::start().await;
        let url = format!("{}/gone.torrent", server.uri());
        Mock::given(method("GET"))
            .and(path("/rss"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixtures::rss_feed(&[(
                "Show.Name.S01E01.720p.HDTV-GRP",
                url.as_str(),
            )])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone.torrent"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let config = fixtures::config_with_sections(vec![fixtures::section("all", "/data")]);
        let store = SqliteHistoryStore::in_memory().unwrap();
        let mut provider =
            FeedProvider::new(fixtures::feed("rss", &format!("{}/rss", server.uri()))).unwrap();
        let found = provider
            .fetch_candidates(ProviderContext::new(&config, &store))
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_feed_http_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let config = Config::default();
        let store = SqliteHistoryStore::in_memory().unwrap();
        let mut provider = FeedProvider::new(fixtures::feed("rss", &server.uri())).unwrap();
        let err = provider
            .fetch_candidates(ProviderContext::new(&config, &store))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::HttpStatus(503)));
    }

    #[tokio::test]
    async fn test_failed_poll_is_retried_next_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rss"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let config = Config::default();
        let store = SqliteHistoryStore::in_memory().unwrap();
        let mut provider =
            FeedProvider::new(fixtures::feed("rss", &format!("{}/rss", server.uri()))).unwrap();

        for _ in 0..2 {
            let result = provider
                .fetch_candidates(ProviderContext::new(&config, &store))
                .await;
            assert!(matches!(result, Err(ProviderError::HttpStatus(503))));
        }
        assert!(provider.is_due(Instant::now()));
        server.verify().await;
    }
}
