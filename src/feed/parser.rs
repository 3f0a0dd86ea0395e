use feed_rs::parser;

use super::source::{Entry, FetchedFeed};
use crate::util::strip_control_chars;

/// Outcome of parsing one feed document.
#[derive(Debug)]
pub struct ParseResult {
    pub feed: FetchedFeed,
    /// Entries dropped because they carry no link.
    pub skipped: usize,
}

/// Parses RSS 0.9x/1.0/2.0, Atom or JSON Feed bytes into title + entries.
///
/// The document's declared encoding is honoured by the parser; all text is
/// returned as UTF-8 with control characters removed. Entry order is the
/// feed's own order.
pub fn parse_feed(bytes: &[u8]) -> Result<ParseResult, parser::ParseFeedError> {
    let feed = parser::parse(bytes)?;

    let title = feed
        .title
        .map(|t| clean(&t.content))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled Feed".to_owned());

    let mut skipped = 0;
    let entries = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let Some(url) = article_link(&entry.links)
                .map(|l| l.href.trim().to_owned())
                .filter(|href| !href.is_empty())
            else {
                skipped += 1;
                return None;
            };

            let title = entry
                .title
                .map(|t| clean(&t.content))
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Untitled".to_owned());

            Some(Entry {
                title,
                url: clean(&url),
                last_updated: entry.published.or(entry.updated),
                authors: entry
                    .authors
                    .into_iter()
                    .map(|p| clean(&p.name))
                    .filter(|name| !name.is_empty())
                    .collect(),
            })
        })
        .collect();

    Ok(ParseResult {
        feed: FetchedFeed { title, entries },
        skipped,
    })
}

fn clean(s: &str) -> String {
    strip_control_chars(s.trim()).into_owned()
}

/// The link pointing at the article itself: the first one without a `rel`
/// or with `rel="alternate"`, else the first link of any kind. Atom entries
/// may list `replies` or `edit` links ahead of it.
fn article_link(links: &[feed_rs::model::Link]) -> Option<&feed_rs::model::Link> {
    links
        .iter()
        .find(|l| l.rel.as_deref().map_or(true, |rel| rel == "alternate"))
        .or_else(|| links.first())
}
