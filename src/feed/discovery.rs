use super::fetcher::{checked_url, read_limited_bytes, send_once, FetchError, FetchSettings, MAX_PAGE_SIZE};
use super::html::{attr, scan_tags};
use crate::util::UrlPolicy;

/// Resolves an arbitrary URL to the URL of a feed.
///
/// Accepts either a direct feed URL or an HTML page URL:
///
/// - A response that parses as RSS/Atom/JSON Feed resolves to the URL itself
/// - An HTML page resolves to the first `<link rel="alternate">` whose type
///   is RSS or Atom, made absolute against the page URL
/// - Anything else, including 4xx responses, resolves to `Ok(None)`
///
/// # Errors
///
/// Returns [`FetchError`] when the URL is refused by `policy`, on network
/// failure, timeout, 5xx status or an oversized response.
pub async fn discover_feed(
    client: &reqwest::Client,
    url: &str,
    policy: UrlPolicy,
    settings: &FetchSettings,
) -> Result<Option<String>, FetchError> {
    let validated = checked_url(url, policy)?;
    let url_str = validated.to_string();

    let response = send_once(client, &url_str, settings).await?;
    let status = response.status();
    if status.is_client_error() {
        tracing::debug!(url = %url_str, status = %status, "Nothing to discover");
        return Ok(None);
    }
    if !status.is_success() {
        return Err(FetchError::HttpStatus(status.as_u16()));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();

    let is_xml = content_type.contains("application/rss+xml")
        || content_type.contains("application/atom+xml")
        || content_type.contains("application/feed+json")
        || content_type.contains("application/xml")
        || content_type.contains("text/xml");
    let is_html = content_type.contains("text/html") || content_type.contains("application/xhtml");

    let bytes = read_limited_bytes(response, MAX_PAGE_SIZE).await?;

    // Some servers label feeds text/html, so the content decides first
    if feed_rs::parser::parse(bytes.as_slice()).is_ok() {
        return Ok(Some(url_str));
    }
    if is_xml && !is_html {
        return Ok(None);
    }

    let html = String::from_utf8_lossy(&bytes);
    let Some(href) = find_feed_link_in_html(&html, &validated) else {
        tracing::debug!(url = %url_str, "No feed link in page");
        return Ok(None);
    };

    let feed_url = checked_url(&href, policy)?;
    tracing::debug!(page = %url_str, feed = %feed_url, "Discovered feed link");
    Ok(Some(feed_url.to_string()))
}

/// Scans HTML for `<link rel="alternate">` tags with an RSS/Atom type and
/// returns the first one's `href`, resolved against `base`.
fn find_feed_link_in_html(html: &str, base: &url::Url) -> Option<String> {
    scan_tags(html, "link").into_iter().find_map(|attrs| {
        let rel_alternate = attr(&attrs, "rel")
            .map(|rel| {
                rel.split_ascii_whitespace()
                    .any(|r| r.eq_ignore_ascii_case("alternate"))
            })
            .unwrap_or(false);
        let feed_type = attr(&attrs, "type")
            .map(|t| {
                let t = t.to_ascii_lowercase();
                t.contains("application/rss+xml") || t.contains("application/atom+xml")
            })
            .unwrap_or(false);

        if !(rel_alternate && feed_type) {
            return None;
        }
        let href = attr(&attrs, "href")?.trim();
        if href.is_empty() {
            return None;
        }
        // join() handles absolute, protocol-relative and relative hrefs
        base.join(href).ok().map(|u| u.to_string())
    })
}
