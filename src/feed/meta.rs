use super::fetcher::{checked_url, send_with_retry, FetchError, FetchSettings, MAX_PAGE_SIZE};
use super::html::{attr, scan_tags};
use crate::util::{strip_control_chars, UrlPolicy};

/// One `<meta>` name/value pair of a web page.
///
/// `name` comes from the `name` attribute, or from `property` for Open Graph
/// style tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaTag {
    pub name: String,
    pub content: String,
}

impl MetaTag {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Fetches the page at `url` and returns its metadata tags in page order.
///
/// The body is decoded using the charset announced by the server, so pages
/// served as Shift_JIS or EUC-JP yield correct UTF-8 values.
pub async fn fetch_meta(
    client: &reqwest::Client,
    url: &str,
    policy: UrlPolicy,
    settings: &FetchSettings,
) -> Result<Vec<MetaTag>, FetchError> {
    let validated = checked_url(url, policy)?;
    let response = send_with_retry(client, validated.as_str(), settings).await?;

    if response
        .content_length()
        .is_some_and(|len| len as usize > MAX_PAGE_SIZE)
    {
        return Err(FetchError::ResponseTooLarge);
    }

    let html = tokio::time::timeout(settings.timeout, response.text())
        .await
        .map_err(|_| FetchError::Timeout)?
        .map_err(FetchError::Network)?;

    if html.len() > MAX_PAGE_SIZE {
        return Err(FetchError::ResponseTooLarge);
    }

    let tags = scan_meta_tags(&html);
    tracing::debug!(url = %url, tags = tags.len(), "Fetched page metadata");
    Ok(tags)
}

/// Extracts `(name|property, content)` pairs from every `<meta>` tag.
///
/// Tags lacking either a name or a content attribute (such as
/// `<meta charset>`) are skipped.
pub fn scan_meta_tags(html: &str) -> Vec<MetaTag> {
    scan_tags(html, "meta")
        .into_iter()
        .filter_map(|attrs| {
            let name = attr(&attrs, "name").or_else(|| attr(&attrs, "property"))?;
            let content = attr(&attrs, "content")?;
            if name.trim().is_empty() {
                return None;
            }
            Some(MetaTag::new(
                strip_control_chars(name.trim()).into_owned(),
                strip_control_chars(content).into_owned(),
            ))
        })
        .collect()
}
