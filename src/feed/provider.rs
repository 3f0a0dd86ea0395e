use async_trait::async_trait;
use reqwest::redirect::Policy;

use super::discovery::discover_feed;
use super::fetcher::{checked_url, fetch_feed, send_with_retry, FetchError, FetchSettings};
use super::meta::{fetch_meta, MetaTag};
use super::source::FetchedFeed;
use crate::util::{validate_url, UrlPolicy};

const MAX_REDIRECTS: usize = 5;

/// Network side of the feed engine.
///
/// The subscription manager only talks to feeds through this trait, which
/// keeps it independent of HTTP and lets tests script remote content.
#[async_trait]
pub trait FeedProvider: Send + Sync {
    /// Resolves an arbitrary URL to a feed URL; `Ok(None)` if there is none.
    async fn discover(&self, url: &str) -> Result<Option<String>, FetchError>;

    /// Fetches and parses a feed.
    async fn fetch_feed(&self, feed_url: &str) -> Result<FetchedFeed, FetchError>;

    /// Fetches a page and returns its `<meta>` name/value pairs.
    async fn fetch_meta(&self, url: &str) -> Result<Vec<MetaTag>, FetchError>;

    /// Follows HTTP redirects from `url` and returns the final location.
    async fn resolve_redirect(&self, url: &str) -> Result<String, FetchError>;
}

/// [`FeedProvider`] backed by a shared `reqwest` client.
#[derive(Clone)]
pub struct HttpFeedProvider {
    client: reqwest::Client,
    policy: UrlPolicy,
    settings: FetchSettings,
}

impl HttpFeedProvider {
    /// Builds a provider with its own client (user agent, redirect policy).
    ///
    /// Every redirect hop is held to `policy`, not just the first URL.
    pub fn new(policy: UrlPolicy, settings: FetchSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("monesi/", env!("CARGO_PKG_VERSION")))
            .redirect(create_redirect_policy(policy))
            .build()?;
        Ok(Self::with_client(client, policy, settings))
    }

    pub fn with_client(client: reqwest::Client, policy: UrlPolicy, settings: FetchSettings) -> Self {
        Self {
            client,
            policy,
            settings,
        }
    }
}

#[async_trait]
impl FeedProvider for HttpFeedProvider {
    async fn discover(&self, url: &str) -> Result<Option<String>, FetchError> {
        discover_feed(&self.client, url, self.policy, &self.settings).await
    }

    async fn fetch_feed(&self, feed_url: &str) -> Result<FetchedFeed, FetchError> {
        fetch_feed(&self.client, feed_url, self.policy, &self.settings).await
    }

    async fn fetch_meta(&self, url: &str) -> Result<Vec<MetaTag>, FetchError> {
        fetch_meta(&self.client, url, self.policy, &self.settings).await
    }

    async fn resolve_redirect(&self, url: &str) -> Result<String, FetchError> {
        let validated = checked_url(url, self.policy)?;
        let response = send_with_retry(&self.client, validated.as_str(), &self.settings).await?;
        Ok(response.url().to_string())
    }
}

/// Redirect policy with a hop limit, loop detection and the host policy
/// applied to every hop.
///
/// Click-tracking links of feed proxies typically take two or three hops
/// before reaching the article.
fn create_redirect_policy(policy: UrlPolicy) -> Policy {
    Policy::custom(move |attempt| match check_redirect(attempt.url(), attempt.previous(), policy) {
        Ok(()) => {
            tracing::debug!(
                from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
                to = %attempt.url(),
                hop = attempt.previous().len() + 1,
                "Following redirect"
            );
            attempt.follow()
        }
        Err(reason) => {
            tracing::warn!(to = %attempt.url(), reason = %reason, "Redirect refused");
            attempt.error(reason)
        }
    })
}

fn check_redirect(next: &url::Url, previous: &[url::Url], policy: UrlPolicy) -> Result<(), String> {
    if previous.len() >= MAX_REDIRECTS {
        return Err(format!("Too many redirects (max {MAX_REDIRECTS})"));
    }
    if previous.iter().any(|prev| prev == next) {
        return Err("Redirect loop detected".to_owned());
    }
    validate_url(next.as_str(), policy).map_err(|e| format!("Redirect to {next} refused: {e}"))?;
    Ok(())
}
