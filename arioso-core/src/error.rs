use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // Configuration errors
    #[error("Config file not found at {path}. A template has been created - please edit it with your gateway URL and restart.")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid config: {message}")]
    ConfigInvalid { message: String },

    #[error("Failed to parse config file: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    // Provider errors
    #[error("Provider {provider} failed: {reason}")]
    ProviderFailed { provider: String, reason: String },

    #[error("No audio locator available for track {track_id}")]
    LocatorUnavailable { track_id: String },

    #[error("Lyrics not found for track {track_id}")]
    LyricsNotFound { track_id: String },

    // Store errors
    #[error("Store database error: {0}")]
    StoreError(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    #[error("Payload serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    // Worker errors
    #[error("Lyric parse worker is no longer running")]
    WorkerClosed,

    // Network errors
    #[error("Network request failed: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("HTTP middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),

    // IO errors
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
