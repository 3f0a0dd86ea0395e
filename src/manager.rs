//! Subscription lifecycle, fetch orchestration, filtering and rendering.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::feed::{Entry, FeedProvider, FeedSource, FetchError};
use crate::storage::{Snapshot, Storage, StorageError};
use crate::subscription::{Subscription, SubscriptionOptions};

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("{0} was not found")]
    NotFound(String),

    #[error("feed id {0} is already subscribed")]
    AlreadySubscribed(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Outcome of one [`FeedManager::fetch`] cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub fetched: usize,
    pub failed: usize,
    pub new_entries: usize,
}

/// Owns every subscription and persists them after each change.
///
/// Mutating operations take `&mut self`: a manager is driven by one task at
/// a time, so it needs no internal locking.
pub struct FeedManager {
    subscriptions: Vec<Subscription>,
    last_fetched: Option<DateTime<Utc>>,
    provider: Arc<dyn FeedProvider>,
    storage: Arc<dyn Storage>,
}

impl FeedManager {
    pub fn new(provider: Arc<dyn FeedProvider>, storage: Arc<dyn Storage>) -> Self {
        Self {
            subscriptions: Vec::new(),
            last_fetched: None,
            provider,
            storage,
        }
    }

    /// Subscriptions in registration order.
    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    pub fn get(&self, id: &str) -> Option<&Subscription> {
        self.subscriptions.iter().find(|s| s.id == id)
    }

    pub fn last_fetched(&self) -> Option<DateTime<Utc>> {
        self.last_fetched
    }

    /// Restores the saved state. Missing state is an empty start.
    pub async fn load(&mut self) -> Result<(), StorageError> {
        match self.storage.load().await {
            Ok(snapshot) => {
                tracing::info!(subscriptions = snapshot.subscriptions.len(), "Loaded feeds");
                self.subscriptions = snapshot.subscriptions;
                self.last_fetched = snapshot.last_fetched;
                Ok(())
            }
            Err(StorageError::NotFound) => {
                tracing::info!("No saved feeds, starting empty");
                self.subscriptions.clear();
                self.last_fetched = None;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn save(&self) -> Result<(), StorageError> {
        let snapshot = Snapshot {
            subscriptions: self.subscriptions.clone(),
            last_fetched: self.last_fetched,
        };
        self.storage.save(&snapshot).await?;
        tracing::info!(subscriptions = snapshot.subscriptions.len(), "Saved feeds");
        Ok(())
    }

    /// Resolves `url` to a feed, fetches it once and registers it as `id`.
    ///
    /// The same feed may be registered under several ids; the id alone must
    /// be unique. Returns the resolved feed URL. Nothing is registered if the
    /// new state cannot be saved.
    pub async fn subscribe(
        &mut self,
        id: &str,
        url: &str,
        options: SubscriptionOptions,
    ) -> Result<String, ManagerError> {
        if self.get(id).is_some() {
            return Err(ManagerError::AlreadySubscribed(id.to_string()));
        }

        let feed_url = self
            .provider
            .discover(url)
            .await?
            .ok_or_else(|| ManagerError::NotFound(format!("feed for {url}")))?;

        let mut feed = FeedSource::new(feed_url.clone());
        feed.fetch(self.provider.as_ref()).await?;

        let title = feed.title().to_string();
        self.subscriptions.push(Subscription::new(id, feed, options));
        if let Err(e) = self.save().await {
            self.subscriptions.pop();
            return Err(e.into());
        }
        tracing::info!(id = %id, feed = %feed_url, title = %title, "Subscribed");
        Ok(feed_url)
    }

    /// Removes `id`, keeping it if the new state cannot be saved.
    pub async fn unsubscribe(&mut self, id: &str) -> Result<(), ManagerError> {
        let index = self
            .subscriptions
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| ManagerError::NotFound(format!("feed id {id}")))?;
        let removed = self.subscriptions.remove(index);
        if let Err(e) = self.save().await {
            self.subscriptions.insert(index, removed);
            return Err(e.into());
        }
        tracing::info!(id = %id, feed = %removed.feed.feed_url(), "Unsubscribed");
        Ok(())
    }

    /// Fetches every feed in registration order.
    ///
    /// A failing feed is logged and skipped; its previous entries stay and
    /// it reports no new entries this cycle. State is saved afterwards
    /// whatever the individual outcomes, and only a save failure is
    /// returned as an error.
    pub async fn fetch(&mut self) -> Result<FetchSummary, ManagerError> {
        let mut summary = FetchSummary::default();
        let provider = Arc::clone(&self.provider);

        for subscription in &mut self.subscriptions {
            match subscription.feed.fetch(provider.as_ref()).await {
                Ok(new) => {
                    summary.fetched += 1;
                    summary.new_entries += new;
                }
                Err(e) => {
                    summary.failed += 1;
                    subscription.feed.clear_new_entries();
                    tracing::warn!(
                        id = %subscription.id,
                        feed = %subscription.feed.feed_url(),
                        error = %e,
                        "Feed fetch failed"
                    );
                }
            }
        }

        self.last_fetched = Some(Utc::now());
        tracing::info!(
            fetched = summary.fetched,
            failed = summary.failed,
            new_entries = summary.new_entries,
            "Fetch cycle done"
        );
        self.save().await?;
        Ok(summary)
    }

    /// Delivers every new entry that passes its subscription's filters,
    /// feed by feed in registration order.
    pub async fn new_entries(
        &self,
        sink: &mut (dyn FnMut(String) + Send),
    ) -> Result<(), ManagerError> {
        for subscription in &self.subscriptions {
            for entry in subscription.feed.new_entries() {
                if let Some(toot) = self.render_if_accepted(subscription, entry).await? {
                    sink(toot);
                }
            }
        }
        Ok(())
    }

    /// Delivers every current entry of `id` that passes its filters.
    pub async fn show_articles(
        &self,
        id: &str,
        sink: &mut (dyn FnMut(String) + Send),
    ) -> Result<(), ManagerError> {
        let subscription = self.require(id)?;
        for entry in subscription.feed.entries() {
            if let Some(toot) = self.render_if_accepted(subscription, entry).await? {
                sink(toot);
            }
        }
        Ok(())
    }

    /// Delivers the `<meta>` tags of the page at `url`, one `name: content`
    /// message per tag.
    pub async fn show_meta(
        &self,
        url: &str,
        sink: &mut (dyn FnMut(String) + Send),
    ) -> Result<(), ManagerError> {
        for tag in self.provider.fetch_meta(url).await? {
            sink(format!("{}: {}", tag.name, tag.content));
        }
        Ok(())
    }

    /// Returns true if the article at `url` must be dropped for subscription
    /// `id`: it has a meta filter and the page's metadata does not satisfy it.
    ///
    /// A failed page fetch is an error, not a verdict.
    pub async fn filter(&self, url: &str, id: &str) -> Result<bool, ManagerError> {
        let subscription = self.require(id)?;
        self.fails_meta_filter(subscription, url).await
    }

    /// Renders the message for `entry` of subscription `id`.
    pub fn toot_for_article(&self, id: &str, entry: &Entry) -> Result<String, ManagerError> {
        let subscription = self.require(id)?;
        Ok(render_toot(subscription, &entry.title, &entry.url))
    }

    /// One `<id> <title> <feed_url> <options>` line per subscription.
    pub fn list_lines(&self) -> Vec<String> {
        self.subscriptions
            .iter()
            .map(|s| {
                let line = format!("{} {} {} {}", s.id, s.feed.title(), s.feed.feed_url(), s.options);
                line.trim_end().to_string()
            })
            .collect()
    }

    fn require(&self, id: &str) -> Result<&Subscription, ManagerError> {
        self.get(id)
            .ok_or_else(|| ManagerError::NotFound(format!("feed id {id}")))
    }

    async fn fails_meta_filter(
        &self,
        subscription: &Subscription,
        url: &str,
    ) -> Result<bool, ManagerError> {
        let Some(meta_filter) = &subscription.options.meta_filter else {
            return Ok(false);
        };
        let tags = self.provider.fetch_meta(url).await?;
        let drop = !meta_filter.accepts(&tags);
        if drop {
            tracing::debug!(id = %subscription.id, url = %url, key = %meta_filter.key, "Filtered out");
        }
        Ok(drop)
    }

    async fn render_if_accepted(
        &self,
        subscription: &Subscription,
        entry: &Entry,
    ) -> Result<Option<String>, ManagerError> {
        if !subscription.options.accepts_author(entry) {
            return Ok(None);
        }

        let url = if subscription.options.redirect_url {
            match self.provider.resolve_redirect(&entry.url).await {
                Ok(resolved) => resolved,
                Err(e) => {
                    tracing::warn!(url = %entry.url, error = %e, "Redirect resolution failed, keeping original URL");
                    entry.url.clone()
                }
            }
        } else {
            entry.url.clone()
        };

        if self.fails_meta_filter(subscription, &url).await? {
            return Ok(None);
        }
        Ok(Some(render_toot(subscription, &entry.title, &url)))
    }
}

fn render_toot(subscription: &Subscription, title: &str, url: &str) -> String {
    let mut toot = format!("{title}\n{url}\n#{}", subscription.id);
    if !subscription.options.tags.is_empty() {
        let tags: Vec<String> = subscription
            .options
            .tags
            .iter()
            .map(|t| format!("#{t}"))
            .collect();
        toot.push('\n');
        toot.push_str(&tags.join(" "));
    }
    toot
}
