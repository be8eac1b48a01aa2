//! Download client abstraction.
//!
//! The dispatcher only talks to the `TorrentClient` trait; qBittorrent is the
//! one shipped backend.

mod qbittorrent;
mod types;

pub use qbittorrent::QBittorrentClient;
pub use types::*;
