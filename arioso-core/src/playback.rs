use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where a queued track's audio comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackSource {
    /// Streamed from the remote catalog; eligible for prefetch
    Remote,
    /// Supplied from local files; never touches the network
    Local,
}

/// Streaming quality tier requested from the catalog gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioQuality {
    Standard,
    Higher,
    Exhigh,
    Lossless,
}

impl AudioQuality {
    /// Get the string identifier sent on the wire and stamped on held
    /// locators.
    ///
    /// These identifiers are stable: they are part of the gateway request
    /// format and should not change once established.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Higher => "higher",
            Self::Exhigh => "exhigh",
            Self::Lossless => "lossless",
        }
    }

    /// Parse a gateway level string back into a quality tier.
    #[must_use]
    pub fn from_level(level: &str) -> Option<Self> {
        match level {
            "standard" => Some(Self::Standard),
            "higher" => Some(Self::Higher),
            "exhigh" => Some(Self::Exhigh),
            "lossless" => Some(Self::Lossless),
            _ => None,
        }
    }
}

impl std::fmt::Display for AudioQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Information about one track in the playback queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    /// Catalog track ID
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration: Duration,
    /// Cover locator taken straight from track metadata
    pub cover_url: Option<String>,
    pub source: TrackSource,
}

impl TrackInfo {
    /// Create a new remote track info
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
        album: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            album: album.into(),
            duration,
            cover_url: None,
            source: TrackSource::Remote,
        }
    }

    /// Set the cover locator
    #[must_use]
    pub fn with_cover_url(mut self, cover_url: impl Into<String>) -> Self {
        self.cover_url = Some(cover_url.into());
        self
    }

    /// Mark this track as locally supplied
    #[must_use]
    pub const fn with_source(mut self, source: TrackSource) -> Self {
        self.source = source;
        self
    }

    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.source == TrackSource::Remote
    }
}
