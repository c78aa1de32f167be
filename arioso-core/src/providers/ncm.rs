//! Catalog provider speaking the `NetEase`-compatible gateway protocol.
//!
//! Works against a self-hosted API gateway exposing `/song/url/v1`,
//! `/lyric` and `/cloudsearch`.

use crate::config::ProviderConfig;
use crate::error::CoreError;
use crate::playback::{AudioQuality, TrackInfo, TrackSource};
use crate::provider::{MediaProvider, RawLyricText, ResolvedLocator};
use async_trait::async_trait;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "arioso::provider::ncm";

/// Default timeout for HTTP requests (10 seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Default number of retry attempts
const DEFAULT_MAX_RETRIES: u32 = 3;
/// Result page size for catalog search
const SEARCH_LIMIT: u32 = 30;

/// HTTP client for a `NetEase`-compatible catalog gateway
pub struct NcmProvider {
    client: ClientWithMiddleware,
    base_url: String,
}

impl NcmProvider {
    /// Create a provider with default timeout and retry policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: impl Into<String>) -> Result<Self, CoreError> {
        Self::with_options(base_url, DEFAULT_TIMEOUT_SECS, DEFAULT_MAX_RETRIES)
    }

    /// Create a provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, CoreError> {
        Self::with_options(&config.base_url, config.timeout_secs, config.max_retries)
    }

    fn with_options(
        base_url: impl Into<String>,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self, CoreError> {
        // Base client with timeout
        let base_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .user_agent("arioso/0.1 (https://github.com/arioso/arioso)")
            .build()?;

        // Wrap with retry middleware (exponential backoff)
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
        let client = ClientBuilder::new(base_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Ok(Self { client, base_url })
    }

    fn failure(&self, reason: impl Into<String>) -> CoreError {
        CoreError::ProviderFailed {
            provider: self.name().to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SongUrlResponse {
    code: i64,
    #[serde(default)]
    data: Vec<SongUrlData>,
}

#[derive(Debug, Deserialize)]
struct SongUrlData {
    url: Option<String>,
    level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LyricResponse {
    code: i64,
    #[serde(default)]
    lrc: Option<LyricBody>,
    #[serde(default)]
    yrc: Option<LyricBody>,
    #[serde(default)]
    tlyric: Option<LyricBody>,
    /// Set by the gateway for tracks with no vocals
    #[serde(default, rename = "nolyric")]
    no_lyric: bool,
}

#[derive(Debug, Default, Deserialize)]
struct LyricBody {
    #[serde(default)]
    lyric: Option<String>,
}

impl LyricBody {
    fn into_text(self) -> Option<String> {
        self.lyric.filter(|text| !text.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    code: i64,
    #[serde(default)]
    result: Option<SearchResult>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResult {
    #[serde(default)]
    songs: Vec<SearchSong>,
}

#[derive(Debug, Deserialize)]
struct SearchSong {
    id: i64,
    name: String,
    #[serde(default)]
    ar: Vec<SearchArtist>,
    #[serde(default)]
    al: Option<SearchAlbum>,
    /// Duration in milliseconds
    #[serde(default)]
    dt: u64,
}

#[derive(Debug, Deserialize)]
struct SearchArtist {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct SearchAlbum {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "picUrl")]
    pic_url: Option<String>,
}

#[async_trait]
impl MediaProvider for NcmProvider {
    fn name(&self) -> &'static str {
        "ncm"
    }

    async fn resolve_audio_locator(
        &self,
        track_id: &str,
        quality: AudioQuality,
    ) -> Result<ResolvedLocator, CoreError> {
        info!(
            target: LOG_TARGET,
            "Resolving audio locator for track {track_id} at {quality}"
        );

        let url = format!(
            "{}/song/url/v1?id={}&level={}",
            self.base_url,
            urlencoding::encode(track_id),
            quality.as_str()
        );
        debug!(target: LOG_TARGET, "Locator request URL: {url}");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(self.failure(format!("locator endpoint returned {}", response.status())));
        }

        let body: SongUrlResponse = response.json().await?;
        if body.code != 200 {
            return Err(self.failure(format!("locator endpoint returned code {}", body.code)));
        }

        let entry = body
            .data
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::LocatorUnavailable {
                track_id: track_id.to_string(),
            })?;

        let Some(stream_url) = entry.url.filter(|u| !u.is_empty()) else {
            return Err(CoreError::LocatorUnavailable {
                track_id: track_id.to_string(),
            });
        };

        let level = entry
            .level
            .as_deref()
            .and_then(AudioQuality::from_level)
            .unwrap_or(quality);
        if level != quality {
            debug!(
                target: LOG_TARGET,
                "Gateway served {level} instead of requested {quality} for track {track_id}"
            );
        }

        Ok(ResolvedLocator {
            url: stream_url,
            level,
        })
    }

    async fn fetch_lyric_text(&self, track_id: &str) -> Result<RawLyricText, CoreError> {
        info!(target: LOG_TARGET, "Fetching lyric text for track {track_id}");

        let url = format!(
            "{}/lyric?id={}",
            self.base_url,
            urlencoding::encode(track_id)
        );

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(self.failure(format!("lyric endpoint returned {}", response.status())));
        }

        let body: LyricResponse = response.json().await?;
        if body.code != 200 {
            return Err(self.failure(format!("lyric endpoint returned code {}", body.code)));
        }

        let raw = RawLyricText {
            primary: body.lrc.and_then(LyricBody::into_text),
            word_synced: body.yrc.and_then(LyricBody::into_text),
            translation: body.tlyric.and_then(LyricBody::into_text),
            instrumental: body.no_lyric,
        };

        if raw.is_empty() && !raw.instrumental {
            warn!(target: LOG_TARGET, "Gateway returned no lyric text for track {track_id}");
        }

        Ok(raw)
    }

    async fn search_catalog(&self, query: &str) -> Result<Vec<TrackInfo>, CoreError> {
        info!(target: LOG_TARGET, "Searching catalog for {query:?}");

        let url = format!(
            "{}/cloudsearch?keywords={}&type=1&limit={SEARCH_LIMIT}",
            self.base_url,
            urlencoding::encode(query)
        );

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(self.failure(format!("search endpoint returned {}", response.status())));
        }

        let body: SearchResponse = response.json().await?;
        if body.code != 200 {
            return Err(self.failure(format!("search endpoint returned code {}", body.code)));
        }

        let songs = body.result.unwrap_or_default().songs;
        debug!(target: LOG_TARGET, "Search returned {} tracks", songs.len());

        Ok(songs.into_iter().map(track_from_song).collect())
    }
}

fn track_from_song(song: SearchSong) -> TrackInfo {
    let artist = song
        .ar
        .iter()
        .map(|a| a.name.as_str())
        .filter(|name| !name.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    let album = song.al.unwrap_or_default();

    let mut track = TrackInfo::new(
        song.id.to_string(),
        song.name,
        artist,
        album.name,
        Duration::from_millis(song.dt),
    )
    .with_source(TrackSource::Remote);

    if let Some(pic_url) = album.pic_url.filter(|u| !u.is_empty()) {
        track = track.with_cover_url(pic_url);
    }

    track
}
