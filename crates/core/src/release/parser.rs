//! Heuristic release-name parser.
//!
//! Never fails: anything it cannot recognize ends up as `None` or
//! `Quality::Unknown` on the returned [`ParsedRelease`].

use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::normalize::normalize;
use super::types::{MediaKind, ParsedRelease, Quality};

/// `S01E02`, `S01E02E03`, `S01` (season pack).
static SEASON_EPISODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^s(\d{1,2})(?:e(\d{1,3}))?(?:-?e\d{1,3})*$").unwrap()
});

/// `1x02`, `10x103`.
static CROSS_EPISODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\d{1,2})x(\d{2,3})$").unwrap());

const HD_TAGS: &[&str] = &["720p", "1080p", "1080i", "2160p"];
const SD_TAGS: &[&str] = &["480p", "576p", "sdtv", "xvid", "divx", "dvdrip"];
const PROPER_TAGS: &[&str] = &["proper", "repack"];

/// Tokens that end the title part of a release name.
const TITLE_STOP_TAGS: &[&str] = &[
    "hdtv", "pdtv", "webrip", "web-dl", "webdl", "bluray", "bdrip", "brrip", "dvdr", "x264",
    "x265", "h264", "h265", "hevc", "internal", "limited", "complete", "dubbed", "subbed",
    "readnfo", "multi",
];

/// Parse a raw release name into its structured parts.
pub fn parse(raw: &str) -> ParsedRelease {
    let (body, group) = split_group(raw.trim());
    let tokens: Vec<&str> = body
        .split(|c: char| c == '.' || c == '_' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect();

    let mut season = None;
    let mut episode = None;
    let mut year = None;
    let mut title_end = tokens.len();

    for (idx, token) in tokens.iter().enumerate() {
        if let Some((s, e)) = season_episode(token) {
            season = Some(s);
            episode = e;
            title_end = title_end.min(idx);
            break;
        }
        if idx > 0 && year.is_none() {
            if let Some(y) = release_year(token) {
                year = Some(y);
                title_end = title_end.min(idx);
                continue;
            }
        }
        if idx > 0 && is_tag(token) {
            title_end = title_end.min(idx);
        }
    }

    // A year is only meaningful for movies
    if season.is_some() {
        year = None;
    }

    let lowered: Vec<String> = tokens.iter().map(|t| t.to_ascii_lowercase()).collect();
    let quality = if lowered.iter().any(|t| HD_TAGS.contains(&t.as_str())) {
        Quality::Hd
    } else if lowered.iter().any(|t| SD_TAGS.contains(&t.as_str())) {
        Quality::Sd
    } else {
        Quality::Unknown
    };
    let is_proper = lowered.iter().any(|t| PROPER_TAGS.contains(&t.as_str()));

    ParsedRelease {
        title: normalize(&tokens[..title_end].join(" ")),
        season,
        episode,
        year,
        quality,
        is_proper,
        group: group.map(str::to_string),
        raw_name: raw.to_string(),
    }
}

/// Filesystem-safe directory name for a release.
///
/// Episodes of the same show share a directory; movies get `Title (Year)`.
/// Distinct releases may map to the same name.
pub fn directory_name(parsed: &ParsedRelease) -> String {
    let base = if parsed.title.is_empty() {
        normalize(&parsed.raw_name)
    } else {
        parsed.title.clone()
    };
    let base = match (parsed.media_kind(), parsed.year) {
        (MediaKind::Movie, Some(year)) => format!("{} ({})", base, year),
        _ => base,
    };

    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').trim();

    if cleaned.is_empty() {
        "Unknown".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Split `Name.Stuff-GROUP` into (`Name.Stuff`, `GROUP`).
fn split_group(raw: &str) -> (&str, Option<&str>) {
    match raw.rsplit_once('-') {
        Some((body, group))
            if !body.is_empty()
                && !group.is_empty()
                && group.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            (body, Some(group))
        }
        _ => (raw, None),
    }
}

fn season_episode(token: &str) -> Option<(u32, Option<u32>)> {
    if let Some(caps) = SEASON_EPISODE.captures(token) {
        let season = caps.get(1)?.as_str().parse().ok()?;
        let episode = caps.get(2).and_then(|m| m.as_str().parse().ok());
        return Some((season, episode));
    }
    let caps = CROSS_EPISODE.captures(token)?;
    let season = caps.get(1)?.as_str().parse().ok()?;
    let episode = caps.get(2)?.as_str().parse().ok()?;
    Some((season, Some(episode)))
}

fn release_year(token: &str) -> Option<u16> {
    let token = token.trim_matches(|c| c == '(' || c == ')' || c == '[' || c == ']');
    if token.len() != 4 || !token.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let year: u16 = token.parse().ok()?;
    (1900..=2099).contains(&year).then_some(year)
}

fn is_tag(token: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    let lower = lower.as_str();
    HD_TAGS.contains(&lower)
        || SD_TAGS.contains(&lower)
        || PROPER_TAGS.contains(&lower)
        || TITLE_STOP_TAGS.contains(&lower)
}
