//! Types for parsed releases.

use serde::{Deserialize, Serialize};

/// Video quality class of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Sd,
    Hd,
    Unknown,
}

impl Quality {
    /// Returns the string representation used in config keys and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Sd => "sd",
            Quality::Hd => "hd",
            Quality::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a release is an episode (or season pack) or a standalone title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Episode,
    Movie,
}

/// Structured view of a raw release name. Built once by [`super::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedRelease {
    /// Normalized show or movie title (may be empty for garbage input).
    pub title: String,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    /// Release year, only looked for when there is no episode marker.
    pub year: Option<u16>,
    pub quality: Quality,
    /// PROPER or REPACK re-release.
    pub is_proper: bool,
    /// Release group (text after the final dash).
    pub group: Option<String>,
    /// The name exactly as announced.
    pub raw_name: String,
}

impl ParsedRelease {
    pub fn media_kind(&self) -> MediaKind {
        if self.season.is_some() {
            MediaKind::Episode
        } else {
            MediaKind::Movie
        }
    }

    /// A release attributed to a group is considered a scene release.
    pub fn is_scene(&self) -> bool {
        self.group.is_some()
    }
}
