pub mod config;
pub mod error;
pub mod lyric;
pub mod paths;
pub mod playback;
pub mod prefetch;
pub mod provider;
pub mod providers;
pub mod store;
pub mod worker;

pub use config::{build_config_template, Config, PrefetchConfig, ProviderConfig, StorageConfig};
pub use error::{CoreError, Result};
pub use lyric::{
    annotate_chorus, detect_chorus_lines, parse, ChorusEffect, LyricDocument, LyricFormat,
    LyricLine, WordToken,
};
pub use paths::{config_dir, config_path, store_db_path, CONFIG_DIR_NAME, CONFIG_FILE_NAME,
    STORE_DB_FILE_NAME,
};
pub use playback::{AudioQuality, TrackInfo, TrackSource};
pub use prefetch::{PrefetchEntry, PrefetchScheduler, PrefetchTable};
pub use provider::{MediaProvider, RawLyricText, ResolvedLocator};
pub use providers::ncm::NcmProvider;
pub use store::{CacheStore, Category, Payload, StoreUsage, SCHEMA_VERSION};
pub use worker::ParseBroker;
