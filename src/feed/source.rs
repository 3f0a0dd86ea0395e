use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FeedProvider, FetchError};

/// One article of a feed. The `url` is the article's identity within a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    /// Author names as published by the feed, used by `feed_author_filter`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
}

impl Entry {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            last_updated: None,
            authors: Vec::new(),
        }
    }
}

/// Title and entries of a feed as returned by one fetch, in feed order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedFeed {
    pub title: String,
    pub entries: Vec<Entry>,
}

/// A subscribed feed and the result of its latest fetch.
///
/// `entries` is replaced wholesale on every successful fetch and
/// `new_entries` holds the entries whose URL was absent from the previous
/// fetch. A source that has never been fetched has no baseline, so its
/// first fetch reports no new entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSource {
    feed_url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    entries: Vec<Entry>,
    #[serde(skip)]
    new_entries: Vec<Entry>,
    #[serde(default)]
    fetched_at: Option<DateTime<Utc>>,
}

impl FeedSource {
    pub fn new(feed_url: impl Into<String>) -> Self {
        Self {
            feed_url: feed_url.into(),
            title: String::new(),
            entries: Vec::new(),
            new_entries: Vec::new(),
            fetched_at: None,
        }
    }

    pub fn feed_url(&self) -> &str {
        &self.feed_url
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn new_entries(&self) -> &[Entry] {
        &self.new_entries
    }

    /// When the last successful fetch happened, `None` before the first one.
    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    /// Forgets the last diff, e.g. after a failed fetch.
    pub fn clear_new_entries(&mut self) {
        self.new_entries.clear();
    }

    /// Fetches the feed and diffs it against the previous entries.
    ///
    /// On error the source is left untouched. Returns the number of new
    /// entries.
    pub async fn fetch(&mut self, provider: &dyn FeedProvider) -> Result<usize, FetchError> {
        let fetched = provider.fetch_feed(&self.feed_url).await?;
        Ok(self.apply(fetched, Utc::now()))
    }

    /// Replaces the entries with a freshly fetched list and recomputes
    /// `new_entries`. Entries are compared by URL only.
    pub fn apply(&mut self, fetched: FetchedFeed, at: DateTime<Utc>) -> usize {
        self.new_entries = if self.fetched_at.is_some() {
            let seen: HashSet<&str> = self.entries.iter().map(|e| e.url.as_str()).collect();
            fetched
                .entries
                .iter()
                .filter(|e| !seen.contains(e.url.as_str()))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        self.title = fetched.title;
        self.entries = fetched.entries;
        self.fetched_at = Some(at);

        tracing::debug!(
            feed = %self.feed_url,
            entries = self.entries.len(),
            new = self.new_entries.len(),
            "Feed diffed"
        );
        self.new_entries.len()
    }
}
