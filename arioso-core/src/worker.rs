//! Dedicated lyric-parse worker and its request/response broker.
//!
//! Parsing is CPU-bound, so it runs on one dedicated OS thread behind a
//! message channel rather than on the scheduler task. The broker owns the
//! request-id correlation state; dropping it shuts the worker down and
//! fails every outstanding request.

use crate::error::{CoreError, Result};
use crate::lyric::{self, LyricDocument, LyricFormat};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

const LOG_TARGET: &str = "arioso::worker";

struct ParseRequest {
    id: u64,
    format: LyricFormat,
    primary: String,
    translation: Option<String>,
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<LyricDocument>>>>;

/// Correlates parse requests with worker responses.
///
/// Must be constructed inside a tokio runtime: the response dispatcher is
/// a spawned task.
pub struct ParseBroker {
    request_tx: mpsc::UnboundedSender<ParseRequest>,
    pending: PendingMap,
    next_id: AtomicU64,
}

impl ParseBroker {
    #[must_use]
    pub fn new() -> Self {
        let (request_tx, mut request_rx) = mpsc::unbounded_channel::<ParseRequest>();
        let (response_tx, mut response_rx) = mpsc::unbounded_channel::<(u64, LyricDocument)>();
        let pending: PendingMap = Arc::default();

        std::thread::spawn(move || {
            while let Some(request) = request_rx.blocking_recv() {
                let document = lyric::parse(
                    request.format,
                    &request.primary,
                    request.translation.as_deref(),
                );
                if response_tx.send((request.id, document)).is_err() {
                    break;
                }
            }
            debug!(target: LOG_TARGET, "Parse worker thread exiting");
        });

        let dispatch_pending = Arc::clone(&pending);
        tokio::spawn(async move {
            while let Some((id, document)) = response_rx.recv().await {
                let sender = dispatch_pending
                    .lock()
                    .ok()
                    .and_then(|mut map| map.remove(&id));
                match sender {
                    // The caller may have given up; a dead receiver is fine
                    Some(tx) => {
                        let _ = tx.send(document);
                    }
                    None => {
                        debug!(target: LOG_TARGET, "Dropping response for unknown request {id}");
                    }
                }
            }

            // Worker gone: reject whatever is still pending by dropping the
            // completion senders.
            if let Ok(mut map) = dispatch_pending.lock() {
                if !map.is_empty() {
                    warn!(
                        target: LOG_TARGET,
                        "Worker channel closed with {} pending requests", map.len()
                    );
                }
                map.clear();
            }
        });

        Self {
            request_tx,
            pending,
            next_id: AtomicU64::new(0),
        }
    }

    /// Parse raw lyric text on the worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::WorkerClosed`] if the worker has shut down
    /// before the request could complete.
    pub async fn parse(
        &self,
        format: LyricFormat,
        primary: &str,
        translation: Option<&str>,
    ) -> Result<LyricDocument> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let (completion_tx, completion_rx) = oneshot::channel();
        {
            let Ok(mut map) = self.pending.lock() else {
                return Err(CoreError::WorkerClosed);
            };
            map.insert(id, completion_tx);
        }

        let request = ParseRequest {
            id,
            format,
            primary: primary.to_string(),
            translation: translation.map(str::to_string),
        };

        if self.request_tx.send(request).is_err() {
            if let Ok(mut map) = self.pending.lock() {
                map.remove(&id);
            }
            return Err(CoreError::WorkerClosed);
        }

        completion_rx.await.map_err(|_| CoreError::WorkerClosed)
    }
}

impl Default for ParseBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_parse_round_trip() {
        let broker = ParseBroker::new();
        let doc = broker
            .parse(LyricFormat::Lrc, "[00:01.00]Hello world\n[00:03.00]Bye", None)
            .await
            .unwrap();

        assert_eq!(doc.lines.len(), 2);
        assert_eq!(doc.lines[0].full_text, "Hello world");
    }

    #[tokio::test]
    async fn test_requests_correlate_independently() {
        let broker = Arc::new(ParseBroker::new());

        let a = Arc::clone(&broker);
        let first = tokio::spawn(async move {
            a.parse(LyricFormat::Lrc, "[00:01.00]First doc", None).await
        });
        let b = Arc::clone(&broker);
        let second = tokio::spawn(async move {
            b.parse(LyricFormat::Lrc, "[00:01.00]Second doc", None).await
        });

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        assert_eq!(first.lines[0].full_text, "First doc");
        assert_eq!(second.lines[0].full_text, "Second doc");
    }

    #[tokio::test]
    async fn test_translation_passes_through() {
        let broker = ParseBroker::new();
        let doc = broker
            .parse(
                LyricFormat::Lrc,
                "[00:01.00]Hello",
                Some("[00:01.20]Bonjour"),
            )
            .await
            .unwrap();

        assert_eq!(doc.lines[0].translation.as_deref(), Some("Bonjour"));
    }

    #[tokio::test]
    async fn test_unparseable_input_yields_empty_document() {
        let broker = ParseBroker::new();
        let doc = broker
            .parse(LyricFormat::Yrc, "no timestamps here", None)
            .await
            .unwrap();
        assert!(doc.is_empty());
    }
}
