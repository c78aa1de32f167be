//! Look-ahead resolution of queue-adjacent track resources.
//!
//! The scheduler keeps a short-lived, cancellable window of resolved
//! audio locators, parsed lyrics and cover locators for the tracks around
//! the current queue position, so track transitions never wait on the
//! network. Entries live in memory only: locators expire and must never
//! be treated as durable.

use crate::config::PrefetchConfig;
use crate::lyric::LyricDocument;
use crate::playback::{AudioQuality, TrackInfo, TrackSource};
use crate::provider::{MediaProvider, RawLyricText};
use crate::store::{keys, CacheStore, Payload};
use crate::worker::ParseBroker;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "arioso::prefetch";

/// Resources resolved ahead of playback need for one queued track.
#[derive(Debug, Clone, Default)]
pub struct PrefetchEntry {
    pub track_id: String,
    /// Short-lived stream URL; only valid while unexpired and
    /// quality-matching
    pub audio_url: Option<String>,
    pub locator_fetched_at: Option<Instant>,
    pub locator_quality: Option<AudioQuality>,
    pub lyrics: Option<LyricDocument>,
    /// Raw text retained so the chorus-annotation pass needs no refetch
    pub raw_lyrics: Option<RawLyricText>,
    pub cover_url: Option<String>,
}

impl PrefetchEntry {
    fn new(track_id: &str) -> Self {
        Self {
            track_id: track_id.to_string(),
            ..Self::default()
        }
    }

    /// Whether the held locator can serve `quality` right now.
    fn locator_valid(&self, quality: AudioQuality, ttl: std::time::Duration) -> bool {
        match (&self.audio_url, self.locator_fetched_at, self.locator_quality) {
            (Some(_), Some(fetched_at), Some(held)) => {
                fetched_at.elapsed() < ttl && held == quality
            }
            _ => false,
        }
    }

    /// Null out the locator fields, leaving lyrics and cover intact.
    fn invalidate_locator(&mut self) {
        self.audio_url = None;
        self.locator_fetched_at = None;
        self.locator_quality = None;
    }
}

/// In-memory table of prefetched entries.
///
/// Explicitly owned and injectable so the playback-switch logic and tests
/// can construct isolated instances; all operations are single-step.
#[derive(Default)]
pub struct PrefetchTable {
    entries: RwLock<HashMap<String, PrefetchEntry>>,
}

impl PrefetchTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot one entry.
    pub async fn get(&self, track_id: &str) -> Option<PrefetchEntry> {
        self.entries.read().await.get(track_id).cloned()
    }

    /// Create-or-update an entry in a single atomic step.
    pub async fn update(&self, track_id: &str, apply: impl FnOnce(&mut PrefetchEntry)) {
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(track_id.to_string())
            .or_insert_with(|| PrefetchEntry::new(track_id));
        apply(entry);
    }

    /// Drop every entry whose id is not in `keep`. Bounds memory after
    /// queue advancement and reshuffles alike.
    pub async fn retain_ids(&self, keep: &HashSet<&str>) {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|id, _| keep.contains(id.as_str()));
        let purged = before - entries.len();
        if purged > 0 {
            debug!(target: LOG_TARGET, "Purged {purged} entries no longer in the queue");
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Drives the look-ahead window around the currently playing track.
pub struct PrefetchScheduler {
    store: Arc<CacheStore>,
    provider: Arc<dyn MediaProvider>,
    broker: Arc<ParseBroker>,
    table: Arc<PrefetchTable>,
    config: PrefetchConfig,
    /// Token of the chain currently in flight; rotated on every new window
    chain_token: Mutex<CancellationToken>,
}

impl PrefetchScheduler {
    #[must_use]
    pub fn new(
        store: Arc<CacheStore>,
        provider: Arc<dyn MediaProvider>,
        broker: Arc<ParseBroker>,
        table: Arc<PrefetchTable>,
        config: PrefetchConfig,
    ) -> Self {
        Self {
            store,
            provider,
            broker,
            table,
            config,
            chain_token: Mutex::new(CancellationToken::new()),
        }
    }

    /// The ambient table playback-switch logic consults before falling
    /// back to a live fetch.
    #[must_use]
    pub fn table(&self) -> Arc<PrefetchTable> {
        Arc::clone(&self.table)
    }

    /// Recompute the look-ahead window around `current_track_id`.
    ///
    /// Cancels any chain still in flight from a previous call; every step
    /// of the new chain checks the fresh token before each side effect,
    /// so a superseded chain commits nothing.
    pub fn schedule_window(
        self: Arc<Self>,
        current_track_id: &str,
        queue: &[TrackInfo],
        quality: AudioQuality,
    ) -> JoinHandle<()> {
        let token = self.rotate_token();
        let current = current_track_id.to_string();
        let queue = queue.to_vec();

        tokio::spawn(async move {
            self.run_window(&current, &queue, quality, &token).await;
        })
    }

    fn rotate_token(&self) -> CancellationToken {
        let fresh = CancellationToken::new();
        if let Ok(mut guard) = self.chain_token.lock() {
            guard.cancel();
            *guard = fresh.clone();
        }
        fresh
    }

    async fn run_window(
        &self,
        current: &str,
        queue: &[TrackInfo],
        quality: AudioQuality,
        token: &CancellationToken,
    ) {
        let Some(index) = queue.iter().position(|t| t.id == current) else {
            debug!(
                target: LOG_TARGET,
                "Current track {current} not in queue; nothing to anchor the window to"
            );
            return;
        };

        info!(
            target: LOG_TARGET,
            "Prefetching around queue index {index} ({} behind, {} ahead)",
            self.config.behind,
            self.config.ahead
        );

        for track in neighbor_window(queue, index, self.config.behind, self.config.ahead) {
            if token.is_cancelled() {
                debug!(target: LOG_TARGET, "Window superseded; abandoning chain");
                return;
            }

            // Pace the chain so it never competes with interactive work or
            // the playing track's own requests.
            tokio::time::sleep(self.config.step_delay()).await;
            tokio::task::yield_now().await;
            if token.is_cancelled() {
                return;
            }

            self.resolve_neighbor(track, quality, token).await;
        }

        if token.is_cancelled() {
            return;
        }

        let keep: HashSet<&str> = queue.iter().map(|t| t.id.as_str()).collect();
        self.table.retain_ids(&keep).await;
    }

    async fn resolve_neighbor(
        &self,
        track: &TrackInfo,
        quality: AudioQuality,
        token: &CancellationToken,
    ) {
        if track.source == TrackSource::Local {
            debug!(target: LOG_TARGET, "Skipping locally supplied track {}", track.id);
            return;
        }

        debug!(target: LOG_TARGET, "Resolving neighbor {} ({})", track.id, track.title);

        self.resolve_audio(track, quality, token).await;
        self.resolve_lyrics(track, token).await;

        if token.is_cancelled() {
            return;
        }
        if let Some(cover) = track.cover_url.clone() {
            // Straight from track metadata; no network fetch
            self.table
                .update(&track.id, |entry| entry.cover_url = Some(cover))
                .await;
        }
    }

    async fn resolve_audio(
        &self,
        track: &TrackInfo,
        quality: AudioQuality,
        token: &CancellationToken,
    ) {
        // Already-downloaded audio counts as resolved; playback reads the
        // bytes from the store without needing a locator.
        match self.store.get(&keys::media_audio(&track.id)).await {
            Ok(Some(_)) => {
                debug!(target: LOG_TARGET, "Audio for {} already in the store", track.id);
                return;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(
                    target: LOG_TARGET,
                    "Store read failed for {}; treating as miss: {e}", track.id
                );
            }
        }

        if token.is_cancelled() {
            return;
        }

        let held_valid = self
            .table
            .get(&track.id)
            .await
            .is_some_and(|entry| entry.locator_valid(quality, self.config.locator_ttl()));
        if held_valid {
            debug!(target: LOG_TARGET, "Locator for {} still fresh", track.id);
            return;
        }

        match self.provider.resolve_audio_locator(&track.id, quality).await {
            Ok(locator) => {
                if token.is_cancelled() {
                    debug!(target: LOG_TARGET, "Dropping stale locator for {}", track.id);
                    return;
                }
                let fetched_at = Instant::now();
                self.table
                    .update(&track.id, |entry| {
                        entry.audio_url = Some(locator.url);
                        entry.locator_fetched_at = Some(fetched_at);
                        entry.locator_quality = Some(quality);
                    })
                    .await;
                debug!(target: LOG_TARGET, "Resolved locator for {} at {quality}", track.id);
            }
            Err(e) => {
                warn!(target: LOG_TARGET, "Failed to resolve locator for {}: {e}", track.id);
            }
        }
    }

    async fn resolve_lyrics(&self, track: &TrackInfo, token: &CancellationToken) {
        if self
            .table
            .get(&track.id)
            .await
            .is_some_and(|entry| entry.lyrics.is_some())
        {
            return;
        }

        // Parsed lyrics may already be cached from an earlier session.
        match self.store.get(&keys::metadata_lyric(&track.id)).await {
            Ok(Some(Payload::Json(value))) => {
                if let Ok(document) = serde_json::from_value::<LyricDocument>(value) {
                    if token.is_cancelled() {
                        return;
                    }
                    debug!(target: LOG_TARGET, "Loaded cached lyrics for {}", track.id);
                    self.table
                        .update(&track.id, |entry| entry.lyrics = Some(document))
                        .await;
                    return;
                }
                // An unreadable cached document is just a miss
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    target: LOG_TARGET,
                    "Store read failed for {} lyrics; treating as miss: {e}", track.id
                );
            }
        }

        if token.is_cancelled() {
            return;
        }

        let raw = match self.provider.fetch_lyric_text(&track.id).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(target: LOG_TARGET, "Failed to fetch lyric text for {}: {e}", track.id);
                return;
            }
        };

        if token.is_cancelled() {
            return;
        }

        let document = if raw.instrumental {
            LyricDocument::default()
        } else if let Some((format, text)) = raw.preferred_encoding() {
            // CPU-bound parse runs on the worker, never on this task
            match self.broker.parse(format, text, raw.translation.as_deref()).await {
                Ok(document) => document,
                Err(e) => {
                    warn!(target: LOG_TARGET, "Parse worker failed for {}: {e}", track.id);
                    return;
                }
            }
        } else {
            LyricDocument::default()
        };

        if token.is_cancelled() {
            return;
        }

        self.table
            .update(&track.id, |entry| {
                entry.lyrics = Some(document.clone());
                entry.raw_lyrics = Some(raw);
            })
            .await;

        // Write-through so the next session skips the fetch entirely; a
        // failed write is only a lost optimization.
        match serde_json::to_value(&document) {
            Ok(value) => {
                if let Err(e) = self
                    .store
                    .put(&keys::metadata_lyric(&track.id), Payload::Json(value))
                    .await
                {
                    warn!(target: LOG_TARGET, "Failed to cache parsed lyrics for {}: {e}", track.id);
                }
            }
            Err(e) => {
                warn!(target: LOG_TARGET, "Failed to serialize lyrics for {}: {e}", track.id);
            }
        }
    }

    /// Return the held entry for a track, first nulling its locator in
    /// place if expired or quality-mismatched. Lyrics and cover survive a
    /// locator invalidation. Never-prefetched ids return `None`.
    pub async fn get_resolved(
        &self,
        track_id: &str,
        required_quality: AudioQuality,
    ) -> Option<PrefetchEntry> {
        let ttl = self.config.locator_ttl();
        let mut entries = self.table.entries.write().await;
        let entry = entries.get_mut(track_id)?;

        if entry.audio_url.is_some() && !entry.locator_valid(required_quality, ttl) {
            debug!(
                target: LOG_TARGET,
                "Invalidating held locator for {track_id} (expired or quality mismatch)"
            );
            entry.invalidate_locator();
        }

        Some(entry.clone())
    }
}

/// Build the neighbor processing order: nearest-behind first, then the
/// tracks ahead in queue order.
fn neighbor_window(
    queue: &[TrackInfo],
    index: usize,
    behind: usize,
    ahead: usize,
) -> Vec<&TrackInfo> {
    let mut window = Vec::with_capacity(behind + ahead);
    for offset in 1..=behind {
        if let Some(i) = index.checked_sub(offset) {
            window.push(&queue[i]);
        }
    }
    for offset in 1..=ahead {
        if let Some(track) = queue.get(index + offset) {
            window.push(track);
        }
    }
    window
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::provider::ResolvedLocator;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[derive(Default)]
    struct MockProvider {
        locator_calls: StdMutex<Vec<String>>,
        lyric_calls: StdMutex<Vec<String>>,
        fail_locator_for: Option<String>,
    }

    impl MockProvider {
        fn locator_calls(&self) -> Vec<String> {
            self.locator_calls.lock().unwrap().clone()
        }

        fn lyric_calls(&self) -> Vec<String> {
            self.lyric_calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MediaProvider for MockProvider {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn resolve_audio_locator(
            &self,
            track_id: &str,
            quality: AudioQuality,
        ) -> Result<ResolvedLocator, CoreError> {
            self.locator_calls.lock().unwrap().push(track_id.to_string());
            if self.fail_locator_for.as_deref() == Some(track_id) {
                return Err(CoreError::ProviderFailed {
                    provider: "mock".to_string(),
                    reason: "synthetic failure".to_string(),
                });
            }
            Ok(ResolvedLocator {
                url: format!("https://cdn.example/{track_id}.mp3"),
                level: quality,
            })
        }

        async fn fetch_lyric_text(&self, track_id: &str) -> Result<RawLyricText, CoreError> {
            self.lyric_calls.lock().unwrap().push(track_id.to_string());
            Ok(RawLyricText {
                primary: Some("[00:01.00]Hello world\n[00:04.00]Second line".to_string()),
                ..RawLyricText::default()
            })
        }

        async fn search_catalog(&self, _query: &str) -> Result<Vec<TrackInfo>, CoreError> {
            Ok(Vec::new())
        }
    }

    fn test_config() -> PrefetchConfig {
        PrefetchConfig {
            behind: 1,
            ahead: 2,
            locator_ttl_secs: 1200,
            step_delay_ms: 10,
        }
    }

    async fn build_scheduler(provider: Arc<MockProvider>) -> Arc<PrefetchScheduler> {
        let store = Arc::new(CacheStore::open_in_memory().await.unwrap());
        Arc::new(PrefetchScheduler::new(
            store,
            provider,
            Arc::new(ParseBroker::new()),
            Arc::new(PrefetchTable::new()),
            test_config(),
        ))
    }

    fn queue_of(ids: &[&str]) -> Vec<TrackInfo> {
        ids.iter()
            .map(|id| {
                TrackInfo::new(*id, format!("Title {id}"), "Artist", "Album", Duration::from_secs(200))
                    .with_cover_url(format!("https://img.example/{id}.jpg"))
            })
            .collect()
    }

    #[test]
    fn test_neighbor_window_order() {
        let queue = queue_of(&["s1", "s2", "s3", "s4"]);
        let window = neighbor_window(&queue, 1, 1, 2);
        let ids: Vec<&str> = window.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["s1", "s3", "s4"]);
    }

    #[test]
    fn test_neighbor_window_at_edges() {
        let queue = queue_of(&["s1", "s2", "s3"]);

        let at_start = neighbor_window(&queue, 0, 1, 2);
        let ids: Vec<&str> = at_start.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["s2", "s3"]);

        let at_end = neighbor_window(&queue, 2, 1, 2);
        let ids: Vec<&str> = at_end.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["s2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_window() {
        let provider = Arc::new(MockProvider::default());
        let scheduler = build_scheduler(Arc::clone(&provider)).await;
        let queue = queue_of(&["s1", "s2", "s3", "s4"]);

        Arc::clone(&scheduler)
            .schedule_window("s2", &queue, AudioQuality::Exhigh)
            .await
            .unwrap();

        assert_eq!(provider.locator_calls(), ["s1", "s3", "s4"]);

        let entry = scheduler
            .get_resolved("s3", AudioQuality::Exhigh)
            .await
            .expect("s3 was prefetched");
        assert_eq!(entry.audio_url.as_deref(), Some("https://cdn.example/s3.mp3"));
        assert!(entry.lyrics.is_some());
        assert!(entry.raw_lyrics.is_some());
        assert_eq!(entry.cover_url.as_deref(), Some("https://img.example/s3.jpg"));

        // Never-prefetched ids return nothing
        assert!(scheduler.get_resolved("s5", AudioQuality::Exhigh).await.is_none());
        // The playing track itself is not part of the window
        assert!(scheduler.get_resolved("s2", AudioQuality::Exhigh).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_current_track_absent_is_noop() {
        let provider = Arc::new(MockProvider::default());
        let scheduler = build_scheduler(Arc::clone(&provider)).await;
        let queue = queue_of(&["s1", "s2"]);

        Arc::clone(&scheduler)
            .schedule_window("missing", &queue, AudioQuality::Standard)
            .await
            .unwrap();

        assert!(provider.locator_calls().is_empty());
        assert!(scheduler.table().is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_window_commits_nothing() {
        let provider = Arc::new(MockProvider::default());
        let scheduler = build_scheduler(Arc::clone(&provider)).await;
        let queue = queue_of(&["a1", "a2", "a3"]);

        // Chain A is cancelled before its first pacing delay elapses
        let first = Arc::clone(&scheduler).schedule_window("a2", &queue, AudioQuality::Standard);
        let second = Arc::clone(&scheduler).schedule_window("missing", &queue, AudioQuality::Standard);

        first.await.unwrap();
        second.await.unwrap();

        assert!(provider.locator_calls().is_empty());
        assert!(scheduler.table().is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_locator_ttl_boundaries() {
        let provider = Arc::new(MockProvider::default());
        let scheduler = build_scheduler(provider).await;

        let fetched_at = Instant::now();
        scheduler
            .table()
            .update("s9", |entry| {
                entry.audio_url = Some("https://cdn.example/s9.mp3".to_string());
                entry.locator_fetched_at = Some(fetched_at);
                entry.locator_quality = Some(AudioQuality::Standard);
                entry.lyrics = Some(LyricDocument::default());
            })
            .await;

        tokio::time::advance(Duration::from_secs(1199)).await;
        let fresh = scheduler
            .get_resolved("s9", AudioQuality::Standard)
            .await
            .unwrap();
        assert!(fresh.audio_url.is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        let expired = scheduler
            .get_resolved("s9", AudioQuality::Standard)
            .await
            .unwrap();
        assert!(expired.audio_url.is_none());
        assert!(expired.locator_fetched_at.is_none());
        // Lyrics survive locator invalidation
        assert!(expired.lyrics.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_quality_mismatch_invalidates_locator() {
        let provider = Arc::new(MockProvider::default());
        let scheduler = build_scheduler(provider).await;

        scheduler
            .table()
            .update("s9", |entry| {
                entry.audio_url = Some("https://cdn.example/s9.mp3".to_string());
                entry.locator_fetched_at = Some(Instant::now());
                entry.locator_quality = Some(AudioQuality::Standard);
            })
            .await;

        let entry = scheduler
            .get_resolved("s9", AudioQuality::Lossless)
            .await
            .unwrap();
        assert!(entry.audio_url.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_departed_ids_purged_after_window() {
        let provider = Arc::new(MockProvider::default());
        let scheduler = build_scheduler(provider).await;

        scheduler
            .table()
            .update("gone", |entry| {
                entry.audio_url = Some("https://cdn.example/gone.mp3".to_string());
            })
            .await;

        let queue = queue_of(&["s1", "s2"]);
        Arc::clone(&scheduler)
            .schedule_window("s1", &queue, AudioQuality::Standard)
            .await
            .unwrap();

        assert!(scheduler.get_resolved("gone", AudioQuality::Standard).await.is_none());
        assert!(scheduler.get_resolved("s2", AudioQuality::Standard).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_audio_skips_locator_fetch() {
        let provider = Arc::new(MockProvider::default());
        let store = Arc::new(CacheStore::open_in_memory().await.unwrap());
        store
            .put(&keys::media_audio("s2"), Payload::Blob(vec![1, 2, 3]))
            .await
            .unwrap();

        let scheduler = Arc::new(PrefetchScheduler::new(
            store,
            Arc::clone(&provider) as Arc<dyn MediaProvider>,
            Arc::new(ParseBroker::new()),
            Arc::new(PrefetchTable::new()),
            test_config(),
        ));

        let queue = queue_of(&["s1", "s2"]);
        Arc::clone(&scheduler)
            .schedule_window("s1", &queue, AudioQuality::Standard)
            .await
            .unwrap();

        // Audio was already downloaded: no locator call, but lyrics still fetched
        assert!(provider.locator_calls().is_empty());
        assert_eq!(provider.lyric_calls(), ["s2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_parsed_lyrics_skip_fetch() {
        let provider = Arc::new(MockProvider::default());
        let store = Arc::new(CacheStore::open_in_memory().await.unwrap());

        let cached = crate::lyric::parse(
            crate::lyric::LyricFormat::Lrc,
            "[00:01.00]Cached line\n[00:03.00]More",
            None,
        );
        store
            .put(
                &keys::metadata_lyric("s2"),
                Payload::Json(serde_json::to_value(&cached).unwrap()),
            )
            .await
            .unwrap();

        let scheduler = Arc::new(PrefetchScheduler::new(
            store,
            Arc::clone(&provider) as Arc<dyn MediaProvider>,
            Arc::new(ParseBroker::new()),
            Arc::new(PrefetchTable::new()),
            test_config(),
        ));

        let queue = queue_of(&["s1", "s2"]);
        Arc::clone(&scheduler)
            .schedule_window("s1", &queue, AudioQuality::Standard)
            .await
            .unwrap();

        assert!(provider.lyric_calls().is_empty());
        let entry = scheduler
            .get_resolved("s2", AudioQuality::Standard)
            .await
            .unwrap();
        assert_eq!(entry.lyrics.unwrap(), cached);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parsed_lyrics_written_through_to_store() {
        let provider = Arc::new(MockProvider::default());
        let store = Arc::new(CacheStore::open_in_memory().await.unwrap());

        let scheduler = Arc::new(PrefetchScheduler::new(
            Arc::clone(&store),
            provider as Arc<dyn MediaProvider>,
            Arc::new(ParseBroker::new()),
            Arc::new(PrefetchTable::new()),
            test_config(),
        ));

        let queue = queue_of(&["s1", "s2"]);
        Arc::clone(&scheduler)
            .schedule_window("s1", &queue, AudioQuality::Standard)
            .await
            .unwrap();

        let cached = store.get(&keys::metadata_lyric("s2")).await.unwrap();
        let Some(Payload::Json(value)) = cached else {
            panic!("parsed lyrics not cached");
        };
        let document: LyricDocument = serde_json::from_value(value).unwrap();
        assert_eq!(document.lines[0].full_text, "Hello world");
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_failed_neighbor_does_not_abort_chain() {
        let provider = Arc::new(MockProvider {
            fail_locator_for: Some("s3".to_string()),
            ..MockProvider::default()
        });
        let scheduler = build_scheduler(Arc::clone(&provider)).await;
        let queue = queue_of(&["s1", "s2", "s3", "s4"]);

        Arc::clone(&scheduler)
            .schedule_window("s2", &queue, AudioQuality::Standard)
            .await
            .unwrap();

        // The failing neighbor was attempted, the rest still resolved
        assert_eq!(provider.locator_calls(), ["s1", "s3", "s4"]);
        let failed = scheduler
            .get_resolved("s3", AudioQuality::Standard)
            .await
            .unwrap();
        assert!(failed.audio_url.is_none());
        // Lyrics for the failed neighbor still resolved independently
        assert!(failed.lyrics.is_some());
        let ok = scheduler
            .get_resolved("s4", AudioQuality::Standard)
            .await
            .unwrap();
        assert!(ok.audio_url.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_tracks_skipped() {
        let provider = Arc::new(MockProvider::default());
        let scheduler = build_scheduler(Arc::clone(&provider)).await;

        let mut queue = queue_of(&["s1", "s2", "s3"]);
        queue[2] = queue[2].clone().with_source(TrackSource::Local);

        Arc::clone(&scheduler)
            .schedule_window("s1", &queue, AudioQuality::Standard)
            .await
            .unwrap();

        assert_eq!(provider.locator_calls(), ["s2"]);
        assert!(scheduler.get_resolved("s3", AudioQuality::Standard).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_valid_locator_not_refetched() {
        let provider = Arc::new(MockProvider::default());
        let scheduler = build_scheduler(Arc::clone(&provider)).await;
        let queue = queue_of(&["s1", "s2"]);

        Arc::clone(&scheduler)
            .schedule_window("s1", &queue, AudioQuality::Standard)
            .await
            .unwrap();
        assert_eq!(provider.locator_calls(), ["s2"]);

        // Second pass within the TTL: the held locator is reused
        Arc::clone(&scheduler)
            .schedule_window("s1", &queue, AudioQuality::Standard)
            .await
            .unwrap();
        assert_eq!(provider.locator_calls(), ["s2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_cached_lyrics_fall_back_to_fetch() {
        let provider = Arc::new(MockProvider::default());
        let scheduler = build_scheduler(Arc::clone(&provider)).await;

        let json = json!({"lines": "not-a-document"});
        scheduler
            .store
            .put(&keys::metadata_lyric("s2"), Payload::Json(json))
            .await
            .unwrap();

        let queue = queue_of(&["s1", "s2"]);
        Arc::clone(&scheduler)
            .schedule_window("s1", &queue, AudioQuality::Standard)
            .await
            .unwrap();

        // Unreadable cached document fell through to a live fetch
        assert_eq!(provider.lyric_calls(), ["s2"]);
    }
}
