//! Screening shared by every provider.
//!
//! A raw release name goes through, in order: release key, section match,
//! scene check, history check (with the proper override), quality filter.
//! Survivors are returned as [`Candidate`]s; the provider then downloads the
//! payload and hands it back to [`CandidatePipeline::emit`].

use tracing::{debug, error, info, warn};

use crate::config::SectionConfig;
use crate::filter::{quality_allowed, scene_allowed};
use crate::history::{generate_release_key, HistoryStore};
use crate::metrics::CANDIDATES_TOTAL;
use crate::release::{parse, ParsedRelease, SectionMatcher};

use super::types::{ProviderContext, ProviderError, TorrentData};

/// A release that passed screening and still needs its payload.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub release_key: String,
    pub parsed: ParsedRelease,
    pub section: &'a SectionConfig,
}

pub struct CandidatePipeline<'a> {
    matcher: SectionMatcher<'a>,
    history: &'a dyn HistoryStore,
    fetch_proper: bool,
    source: String,
}

impl<'a> CandidatePipeline<'a> {
    pub fn new(ctx: ProviderContext<'a>, source: &str) -> Self {
        Self {
            matcher: SectionMatcher::new(&ctx.config.sections),
            history: ctx.history,
            fetch_proper: ctx.config.general.fetch_proper,
            source: source.to_string(),
        }
    }

    /// Decide whether `raw_name` should be fetched.
    pub fn screen(&self, raw_name: &str) -> Option<Candidate<'a>> {
        let Some(release_key) = generate_release_key(raw_name) else {
            debug!(provider = %self.source, "Skipped release without a usable name");
            CANDIDATES_TOTAL.with_label_values(&["no_key"]).inc();
            return None;
        };

        let parsed = parse(raw_name);
        let Some(section) = self.matcher.find(&parsed) else {
            debug!(provider = %self.source, release = raw_name, "No section matches release");
            CANDIDATES_TOTAL.with_label_values(&["no_section"]).inc();
            return None;
        };

        if !scene_allowed(&parsed, section) {
            debug!(
                provider = %self.source,
                release = raw_name,
                section = %section.name,
                "Skipped non-scene release"
            );
            CANDIDATES_TOTAL.with_label_values(&["filtered"]).inc();
            return None;
        }

        match self.history.exists(&release_key) {
            Ok(true) if parsed.is_proper && self.fetch_proper => {
                debug!(release = raw_name, "Re-fetching proper of a known release");
            }
            Ok(true) => {
                debug!(
                    provider = %self.source,
                    release = raw_name,
                    key = %release_key,
                    "Skipped previously downloaded release"
                );
                CANDIDATES_TOTAL.with_label_values(&["duplicate"]).inc();
                return None;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(release = raw_name, "History lookup failed, skipping for now: {}", e);
                CANDIDATES_TOTAL.with_label_values(&["history_error"]).inc();
                return None;
            }
        }

        if !quality_allowed(&parsed, section) {
            debug!(
                provider = %self.source,
                release = raw_name,
                section = %section.name,
                quality = %parsed.quality,
                "Release not in section filters"
            );
            CANDIDATES_TOTAL.with_label_values(&["filtered"]).inc();
            return None;
        }

        Some(Candidate {
            release_key,
            parsed,
            section,
        })
    }

    /// Attach a downloaded payload to a screened candidate.
    pub fn emit(
        &self,
        candidate: Candidate<'a>,
        payload: Result<Vec<u8>, ProviderError>,
    ) -> Option<TorrentData> {
        let release_name = candidate.parsed.raw_name;
        match payload {
            Ok(bytes) if !bytes.is_empty() => {
                info!(
                    provider = %self.source,
                    release = %release_name,
                    section = %candidate.section.name,
                    "Accepted release"
                );
                CANDIDATES_TOTAL.with_label_values(&["accepted"]).inc();
                Some(TorrentData {
                    release_name,
                    payload: bytes,
                    section: candidate.section.name.clone(),
                })
            }
            Ok(_) => {
                error!(provider = %self.source, release = %release_name, "Empty torrent payload");
                CANDIDATES_TOTAL.with_label_values(&["fetch_failed"]).inc();
                None
            }
            Err(e) => {
                error!(
                    provider = %self.source,
                    release = %release_name,
                    "Failed to download torrent data: {}",
                    e
                );
                CANDIDATES_TOTAL.with_label_values(&["fetch_failed"]).inc();
                None
            }
        }
    }
}
