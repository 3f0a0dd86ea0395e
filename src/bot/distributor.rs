use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::mastodon::StatusPoster;
use crate::config::Visibility;

const DEDUP_CAPACITY: usize = 1000;
const DEDUP_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Sending half of the outbound toot queue.
#[derive(Clone)]
pub struct TootQueue {
    tx: mpsc::UnboundedSender<String>,
}

impl TootQueue {
    /// Enqueues a toot. Dropped silently once the distributor has stopped.
    pub fn post(&self, toot: String) {
        if self.tx.send(toot).is_err() {
            tracing::warn!("Toot distributor has stopped, dropping toot");
        }
    }
}

/// Posts queued toots one at a time, spacing them out and skipping any toot
/// already posted within the last week.
pub struct TootDistributor {
    poster: Arc<dyn StatusPoster>,
    interval: Duration,
    visibility: Visibility,
    recent: LruCache<String, Instant>,
}

impl TootDistributor {
    pub fn new(poster: Arc<dyn StatusPoster>, interval: Duration, visibility: Visibility) -> Self {
        let capacity = NonZeroUsize::new(DEDUP_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            poster,
            interval,
            visibility,
            recent: LruCache::new(capacity),
        }
    }

    /// Starts the distributor on its own task.
    pub fn spawn(self) -> (TootQueue, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(self.run(rx));
        (TootQueue { tx }, handle)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<String>) {
        while let Some(toot) = rx.recv().await {
            if self.deliver(&toot).await {
                let pause = pause_after_post(self.interval, rx.len());
                if !pause.is_zero() {
                    tokio::time::sleep(pause).await;
                }
            }
        }
        tracing::info!("Toot queue closed, distributor stopping");
    }

    /// Posts `toot` unless it is a recent duplicate. Returns true if it was
    /// posted.
    pub async fn deliver(&mut self, toot: &str) -> bool {
        let now = Instant::now();
        if self.is_recent(toot, now) {
            tracing::info!(toot = %toot, "Duplicate toot, skipping");
            return false;
        }

        match self.poster.post_status(toot, None, self.visibility).await {
            Ok(()) => {
                tracing::debug!(toot = %toot, "Tooted");
                self.recent.put(toot.to_string(), now);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to post toot");
                false
            }
        }
    }

    fn is_recent(&mut self, toot: &str, now: Instant) -> bool {
        match self.recent.get(toot) {
            Some(posted_at) if now.duration_since(*posted_at) < DEDUP_TTL => true,
            Some(_) => {
                self.recent.pop(toot);
                false
            }
            None => false,
        }
    }
}

/// Pause after a post: the full interval when the queue is empty, shorter
/// when toots are waiting, none once a backlog of ten has built up.
pub fn pause_after_post(interval: Duration, waiting: usize) -> Duration {
    match waiting {
        0 => interval,
        1..=9 => interval / waiting as u32,
        _ => Duration::ZERO,
    }
}
