//! Scripted collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use monesi::bot::{MastodonError, StatusPoster};
use monesi::config::Visibility;
use monesi::feed::{Entry, FeedProvider, FetchError, FetchedFeed, MetaTag};
use monesi::manager::FeedManager;
use monesi::storage::{MemoryStorage, Snapshot, Storage, StorageError};

#[derive(Default)]
struct Remote {
    /// page URL -> feed URL it advertises
    pages: HashMap<String, String>,
    feeds: HashMap<String, FetchedFeed>,
    broken: Vec<String>,
    meta: HashMap<String, Vec<MetaTag>>,
    redirects: HashMap<String, String>,
    fetches: HashMap<String, usize>,
    meta_requests: Vec<String>,
}

/// In-memory stand-in for the web: feeds, pages, metadata and redirects.
#[derive(Default)]
pub struct FakeProvider {
    remote: Mutex<Remote>,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Publishes a feed at `url` with `(title, url)` entries.
    pub fn set_feed(&self, url: &str, title: &str, entries: &[(&str, &str)]) {
        let feed = FetchedFeed {
            title: title.to_string(),
            entries: entries.iter().map(|(t, u)| Entry::new(*t, *u)).collect(),
        };
        self.set_fetched(url, feed);
    }

    pub fn set_fetched(&self, url: &str, feed: FetchedFeed) {
        let mut remote = self.remote.lock().unwrap();
        remote.broken.retain(|u| u != url);
        remote.feeds.insert(url.to_string(), feed);
    }

    /// Makes `page_url` an HTML page advertising `feed_url`.
    pub fn set_page(&self, page_url: &str, feed_url: &str) {
        self.remote
            .lock()
            .unwrap()
            .pages
            .insert(page_url.to_string(), feed_url.to_string());
    }

    /// Makes every further fetch of `url` fail.
    pub fn break_feed(&self, url: &str) {
        self.remote.lock().unwrap().broken.push(url.to_string());
    }

    pub fn set_meta(&self, url: &str, tags: &[(&str, &str)]) {
        self.remote.lock().unwrap().meta.insert(
            url.to_string(),
            tags.iter().map(|(n, c)| MetaTag::new(*n, *c)).collect(),
        );
    }

    pub fn set_redirect(&self, from: &str, to: &str) {
        self.remote
            .lock()
            .unwrap()
            .redirects
            .insert(from.to_string(), to.to_string());
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.remote.lock().unwrap().fetches.get(url).copied().unwrap_or(0)
    }

    pub fn meta_requests(&self) -> Vec<String> {
        self.remote.lock().unwrap().meta_requests.clone()
    }
}

#[async_trait]
impl FeedProvider for FakeProvider {
    async fn discover(&self, url: &str) -> Result<Option<String>, FetchError> {
        let remote = self.remote.lock().unwrap();
        if let Some(feed_url) = remote.pages.get(url) {
            return Ok(Some(feed_url.clone()));
        }
        Ok(remote.feeds.contains_key(url).then(|| url.to_string()))
    }

    async fn fetch_feed(&self, feed_url: &str) -> Result<FetchedFeed, FetchError> {
        let mut remote = self.remote.lock().unwrap();
        *remote.fetches.entry(feed_url.to_string()).or_default() += 1;
        if remote.broken.iter().any(|u| u == feed_url) {
            return Err(FetchError::HttpStatus(500));
        }
        remote
            .feeds
            .get(feed_url)
            .cloned()
            .ok_or(FetchError::HttpStatus(404))
    }

    async fn fetch_meta(&self, url: &str) -> Result<Vec<MetaTag>, FetchError> {
        let mut remote = self.remote.lock().unwrap();
        remote.meta_requests.push(url.to_string());
        remote
            .meta
            .get(url)
            .cloned()
            .ok_or(FetchError::HttpStatus(404))
    }

    async fn resolve_redirect(&self, url: &str) -> Result<String, FetchError> {
        self.remote
            .lock()
            .unwrap()
            .redirects
            .get(url)
            .cloned()
            .ok_or(FetchError::Timeout)
    }
}

/// A manager over `provider` persisting into `storage`.
pub fn manager(provider: &Arc<FakeProvider>, storage: &Arc<MemoryStorage>) -> FeedManager {
    FeedManager::new(provider.clone(), storage.clone())
}

/// Memory storage whose saves can be made to fail.
#[derive(Default)]
pub struct FlakyStorage {
    inner: MemoryStorage,
    failing: AtomicBool,
}

impl FlakyStorage {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Storage for FlakyStorage {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::HttpStatus(503));
        }
        self.inner.save(snapshot).await
    }

    async fn load(&self) -> Result<Snapshot, StorageError> {
        self.inner.load().await
    }
}

/// Records posted statuses instead of sending them.
#[derive(Default)]
pub struct RecordingPoster {
    pub posted: tokio::sync::Mutex<Vec<PostedStatus>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedStatus {
    pub text: String,
    pub in_reply_to: Option<String>,
    pub visibility: Visibility,
}

#[async_trait]
impl StatusPoster for RecordingPoster {
    async fn post_status(
        &self,
        text: &str,
        in_reply_to: Option<&str>,
        visibility: Visibility,
    ) -> Result<(), MastodonError> {
        self.posted.lock().await.push(PostedStatus {
            text: text.to_string(),
            in_reply_to: in_reply_to.map(str::to_string),
            visibility,
        });
        Ok(())
    }
}
