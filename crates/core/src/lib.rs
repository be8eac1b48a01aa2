pub mod config;
pub mod dispatcher;
pub mod filter;
pub mod history;
pub mod metrics;
pub mod provider;
pub mod release;
pub mod scheduler;
pub mod testing;
pub mod torrent_client;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, ConfigHandle,
    SanitizedConfig,
};
pub use dispatcher::{DispatchOutcome, Dispatcher, UnrecordedRelease};
pub use filter::FilterEngine;
pub use history::{HistoryError, HistoryStore, SqliteHistoryStore};
pub use provider::{
    build_providers, verify_credentials, Provider, ProviderError, ProviderKind, TorrentData,
};
pub use release::{parse, ParsedRelease, Quality};
pub use scheduler::{Scheduler, SchedulerStatus, TickSummary};
pub use torrent_client::{QBittorrentClient, TorrentClient, TorrentClientError};
