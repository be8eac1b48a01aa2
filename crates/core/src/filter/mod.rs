//! Per-section quality filters.
//!
//! Each section may carry one allow-list of titles per quality. A quality with
//! no list configured lets every title through; a configured but empty list
//! lets nothing through.

use std::collections::BTreeSet;

use tracing::info;

use crate::config::{ConfigError, ConfigHandle, SectionConfig};
use crate::release::{normalize, ParsedRelease, Quality};

/// Reads and edits section filters through the shared configuration.
#[derive(Debug, Clone)]
pub struct FilterEngine {
    config: ConfigHandle,
}

impl FilterEngine {
    pub fn new(config: ConfigHandle) -> Self {
        Self { config }
    }

    /// Normalized allow-list for a section/quality; empty when unset.
    pub fn get_filters(&self, section: &str, quality: Quality) -> BTreeSet<String> {
        self.config
            .snapshot()
            .section(section)
            .map(|s| section_filters(s, quality))
            .unwrap_or_default()
    }

    /// Whether an allow-list is configured at all for a section/quality.
    pub fn has_filter(&self, section: &str, quality: Quality) -> bool {
        self.config
            .snapshot()
            .section(section)
            .map(|s| s.quality_filter(quality).is_some())
            .unwrap_or(false)
    }

    /// Replace a section's allow-list and persist the configuration.
    pub fn set_filters<I, S>(&self, section: &str, quality: Quality, titles: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let titles: BTreeSet<String> = titles
            .into_iter()
            .map(|t| normalize(t.as_ref()))
            .filter(|t| !t.is_empty())
            .collect();
        let value = titles.iter().cloned().collect::<Vec<_>>().join(", ");

        self.config.update(|config| {
            let target = config
                .section_mut(section)
                .ok_or_else(|| ConfigError::SectionNotFound(section.to_string()))?;
            target.set_quality_filter(quality, value);
            Ok(())
        })?;
        info!(section = section, quality = %quality, count = titles.len(), "Updated section filters");

        self.config.save()
    }
}

/// Parse a section's comma separated allow-list for one quality.
pub fn section_filters(section: &SectionConfig, quality: Quality) -> BTreeSet<String> {
    section
        .quality_filter(quality)
        .map(|list| {
            list.split(',')
                .map(normalize)
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Whether a parsed release is wanted by a section.
///
/// Scene-only sections require a release group. Then, if the section has an
/// allow-list for the release's quality, the normalized title must be on it.
pub fn accepts(parsed: &ParsedRelease, section: &SectionConfig) -> bool {
    scene_allowed(parsed, section) && quality_allowed(parsed, section)
}

/// Scene-only sections reject releases without a group.
pub fn scene_allowed(parsed: &ParsedRelease, section: &SectionConfig) -> bool {
    !section.scene_only || parsed.is_scene()
}

/// Title allow-list check for the release's quality.
pub fn quality_allowed(parsed: &ParsedRelease, section: &SectionConfig) -> bool {
    if section.quality_filter(parsed.quality).is_none() {
        return true;
    }
    section_filters(section, parsed.quality).contains(&normalize(&parsed.title))
}
