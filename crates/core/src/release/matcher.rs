//! Section matching: which configured section does a release belong to?

use regex_lite::Regex;
use tracing::warn;

use crate::config::{MediaFilter, SectionConfig};

use super::parser::parse;
use super::types::{MediaKind, ParsedRelease};

/// Compiled section rules, in declaration (= priority) order.
///
/// Built once per configuration snapshot so patterns are not recompiled for
/// every candidate.
pub struct SectionMatcher<'a> {
    rules: Vec<SectionRule<'a>>,
}

struct SectionRule<'a> {
    section: &'a SectionConfig,
    patterns: Vec<Regex>,
    /// A pattern failed to compile; the section never matches.
    broken: bool,
}

impl<'a> SectionMatcher<'a> {
    pub fn new(sections: &'a [SectionConfig]) -> Self {
        let rules = sections
            .iter()
            .map(|section| {
                let mut broken = false;
                let patterns = section
                    .patterns
                    .iter()
                    .filter_map(|p| match Regex::new(&format!("(?i){}", p)) {
                        Ok(re) => Some(re),
                        Err(e) => {
                            warn!(section = %section.name, pattern = %p, "Invalid section pattern: {}", e);
                            broken = true;
                            None
                        }
                    })
                    .collect();
                SectionRule {
                    section,
                    patterns,
                    broken,
                }
            })
            .collect();
        Self { rules }
    }

    /// First section whose media kind and patterns accept the release.
    pub fn find(&self, parsed: &ParsedRelease) -> Option<&'a SectionConfig> {
        self.rules
            .iter()
            .find(|rule| rule.matches(parsed))
            .map(|rule| rule.section)
    }
}

impl SectionRule<'_> {
    fn matches(&self, parsed: &ParsedRelease) -> bool {
        if self.broken {
            return false;
        }
        let kind_ok = match self.section.media {
            MediaFilter::Any => true,
            MediaFilter::Tv => parsed.media_kind() == MediaKind::Episode,
            MediaFilter::Movie => parsed.media_kind() == MediaKind::Movie,
        };
        kind_ok
            && (self.patterns.is_empty()
                || self.patterns.iter().any(|re| re.is_match(&parsed.raw_name)))
    }
}

/// Find the section a raw release name belongs to.
///
/// Sections are tested in the order they are declared; the first match wins.
pub fn match_release<'a>(raw: &str, sections: &'a [SectionConfig]) -> Option<&'a SectionConfig> {
    SectionMatcher::new(sections).find(&parse(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(name: &str, media: MediaFilter, patterns: &[&str]) -> SectionConfig {
        let mut s = SectionConfig::new(name, format!("/data/{}", name));
        s.media = media;
        s.patterns = patterns.iter().map(|p| p.to_string()).collect();
        s
    }

    #[test]
    fn test_first_declared_section_wins() {
        let sections = vec![
            section("first", MediaFilter::Any, &[]),
            section("second", MediaFilter::Any, &[]),
        ];
        let found = match_release("Show.Name.S01E02.HDTV-GROUP", &sections).unwrap();
        assert_eq!(found.name, "first");
    }

    #[test]
    fn test_media_kind_routes_releases() {
        let sections = vec![
            section("tv", MediaFilter::Tv, &[]),
            section("movies", MediaFilter::Movie, &[]),
        ];
        assert_eq!(
            match_release("Show.Name.S01E02.HDTV-GROUP", &sections).unwrap().name,
            "tv"
        );
        assert_eq!(
            match_release("The.Matrix.1999.1080p.BluRay-GROUP", &sections).unwrap().name,
            "movies"
        );
    }

    #[test]
    fn test_patterns_are_case_insensitive() {
        let sections = vec![
            section("docs", MediaFilter::Any, &[r"\bnature\b"]),
            section("fallback", MediaFilter::Tv, &[]),
        ];
        assert_eq!(
            match_release("NATURE.S01E01.720p.HDTV-GRP", &sections).unwrap().name,
            "docs"
        );
        assert_eq!(
            match_release("Other.S01E01.720p.HDTV-GRP", &sections).unwrap().name,
            "fallback"
        );
    }

    #[test]
    fn test_no_match() {
        let sections = vec![section("tv", MediaFilter::Tv, &[])];
        assert!(match_release("The.Matrix.1999.1080p-GROUP", &sections).is_none());
        assert!(match_release("anything", &[]).is_none());
    }

    #[test]
    fn test_broken_pattern_never_matches() {
        let sections = vec![
            section("broken", MediaFilter::Any, &["(unclosed"]),
            section("ok", MediaFilter::Any, &[]),
        ];
        assert_eq!(
            match_release("Show.S01E01-GRP", &sections).unwrap().name,
            "ok"
        );
    }
}
