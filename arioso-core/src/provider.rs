use crate::error::CoreError;
use crate::lyric::LyricFormat;
use crate::playback::{AudioQuality, TrackInfo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A freshly resolved, short-lived audio stream address.
///
/// Gateways expire these implicitly; holders must check age against the
/// configured TTL before use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocator {
    pub url: String,
    /// Quality tier the gateway actually served (may differ from the
    /// request when the tier is unavailable for a track)
    pub level: AudioQuality,
}

/// Raw lyric text bundle as served by the catalog, prior to parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLyricText {
    /// Line-timestamped primary text (LRC)
    pub primary: Option<String>,
    /// Word-timestamped text (YRC) when the catalog has it
    pub word_synced: Option<String>,
    /// Line-timestamped translation (LRC)
    pub translation: Option<String>,
    /// The track has no vocals; render a placeholder instead of lyrics
    pub instrumental: bool,
}

impl RawLyricText {
    /// Pick the richest encoding present for parsing: word-synced text
    /// wins over line-synced.
    #[must_use]
    pub fn preferred_encoding(&self) -> Option<(LyricFormat, &str)> {
        if let Some(yrc) = self.word_synced.as_deref() {
            return Some((LyricFormat::Yrc, yrc));
        }
        self.primary.as_deref().map(|lrc| (LyricFormat::Lrc, lrc))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.word_synced.is_none()
    }
}

/// Trait for the remote catalog/search/streaming-URL service.
///
/// Every response is treated as untrusted; HTTPS normalization is the
/// caller's concern.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &'static str;

    /// Resolve a short-lived stream URL for a track at a quality tier.
    async fn resolve_audio_locator(
        &self,
        track_id: &str,
        quality: AudioQuality,
    ) -> Result<ResolvedLocator, CoreError>;

    /// Fetch the raw lyric text bundle for a track.
    async fn fetch_lyric_text(&self, track_id: &str) -> Result<RawLyricText, CoreError>;

    /// Search the catalog by free-text query.
    async fn search_catalog(&self, query: &str) -> Result<Vec<TrackInfo>, CoreError>;
}
