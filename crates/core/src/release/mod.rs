//! Release name handling.
//!
//! Turns free-text release announcements (`Show.Name.S01E02.720p.HDTV-GROUP`)
//! into structured [`ParsedRelease`] values and decides which configured
//! section, if any, a release belongs to.

mod matcher;
mod normalize;
mod parser;
mod types;

pub use matcher::{match_release, SectionMatcher};
pub use normalize::normalize;
pub use parser::{directory_name, parse};
pub use types::{MediaKind, ParsedRelease, Quality};
