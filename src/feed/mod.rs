//! Feed access: discovery, fetching, parsing, page metadata and diffing.
//!
//! - [`discovery`] - resolve a page URL to the feed it advertises
//! - [`fetcher`] - HTTP retrieval with retry, size limits and timeouts
//! - [`parser`] - RSS/Atom/JSON Feed parsing via `feed-rs`
//! - [`meta`] - `<meta>` tag extraction used by subscription filters
//! - [`provider`] - the [`FeedProvider`] seam and its HTTP implementation
//! - [`source`] - [`FeedSource`], the per-subscription entry diff

mod discovery;
mod fetcher;
mod html;
mod meta;
mod parser;
mod provider;
mod source;

pub use discovery::discover_feed;
pub use fetcher::{fetch_feed, FetchError, FetchSettings};
pub use meta::{fetch_meta, scan_meta_tags, MetaTag};
pub use parser::{parse_feed, ParseResult};
pub use provider::{FeedProvider, HttpFeedProvider};
pub use source::{Entry, FeedSource, FetchedFeed};
