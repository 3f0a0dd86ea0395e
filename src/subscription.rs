//! Subscriptions and their per-subscription options.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::feed::{Entry, FeedSource, MetaTag};

/// How a meta filter compares a page's metadata value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "MatcherRepr", try_from = "MatcherRepr")]
pub enum Matcher {
    /// Matches when the content equals the string exactly.
    Exact(String),
    /// Matches when the pattern is found anywhere in the content.
    Pattern(Regex),
}

impl Matcher {
    pub fn pattern(source: &str) -> Result<Self, regex::Error> {
        Regex::new(source).map(Matcher::Pattern)
    }

    pub fn matches(&self, content: &str) -> bool {
        match self {
            Matcher::Exact(expected) => content == expected,
            Matcher::Pattern(re) => re.is_match(content),
        }
    }
}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Matcher::Exact(a), Matcher::Exact(b)) => a == b,
            (Matcher::Pattern(a), Matcher::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl Eq for Matcher {}

#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
enum MatcherRepr {
    Exact(String),
    Pattern(String),
}

impl From<Matcher> for MatcherRepr {
    fn from(matcher: Matcher) -> Self {
        match matcher {
            Matcher::Exact(s) => MatcherRepr::Exact(s),
            Matcher::Pattern(re) => MatcherRepr::Pattern(re.as_str().to_owned()),
        }
    }
}

impl TryFrom<MatcherRepr> for Matcher {
    type Error = regex::Error;

    fn try_from(repr: MatcherRepr) -> Result<Self, Self::Error> {
        match repr {
            MatcherRepr::Exact(s) => Ok(Matcher::Exact(s)),
            MatcherRepr::Pattern(p) => Matcher::pattern(&p),
        }
    }
}

/// Keeps an entry only if its page carries a `<meta>` named `key` whose
/// content satisfies `matcher`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaFilter {
    pub key: String,
    pub matcher: Matcher,
}

impl MetaFilter {
    pub fn new(key: impl Into<String>, matcher: Matcher) -> Self {
        Self {
            key: key.into(),
            matcher,
        }
    }

    /// True if any metadata tag with the filter's key matches.
    pub fn accepts(&self, tags: &[MetaTag]) -> bool {
        tags.iter()
            .filter(|tag| tag.name == self.key)
            .any(|tag| self.matcher.matches(&tag.content))
    }
}

/// Options given in the `with` clause of a subscribe command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_filter: Option<MetaFilter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_author_filter: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub redirect_url: bool,
}

impl SubscriptionOptions {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// True if the entry passes the author filter (or there is none).
    pub fn accepts_author(&self, entry: &Entry) -> bool {
        match &self.feed_author_filter {
            Some(author) => entry.authors.iter().any(|a| a == author),
            None => true,
        }
    }
}

/// Renders the options back in command syntax, e.g.
/// `tag(tech,rust) meta_filter(og:url=~/yajiuma/)`.
impl fmt::Display for SubscriptionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.tags.is_empty() {
            parts.push(format!("tag({})", self.tags.join(",")));
        }
        if let Some(filter) = &self.meta_filter {
            parts.push(match &filter.matcher {
                Matcher::Exact(value) => format!("meta_filter({}={})", filter.key, value),
                Matcher::Pattern(re) => format!("meta_filter({}=~/{}/)", filter.key, re.as_str()),
            });
        }
        if let Some(author) = &self.feed_author_filter {
            parts.push(format!("feed_author_filter({author})"));
        }
        if self.redirect_url {
            parts.push("redirect_url".to_owned());
        }
        f.write_str(&parts.join(" "))
    }
}

/// A feed bound to a subscriber-chosen identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub feed: FeedSource,
    #[serde(default)]
    pub options: SubscriptionOptions,
}

impl Subscription {
    pub fn new(id: impl Into<String>, feed: FeedSource, options: SubscriptionOptions) -> Self {
        Self {
            id: id.into(),
            feed,
            options,
        }
    }
}
