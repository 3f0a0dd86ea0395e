use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL points to a private/internal IP address.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    /// The URL points to localhost.
    #[error("Localhost not allowed")]
    Localhost,
}

/// Which hosts the bot is willing to contact.
///
/// Feed and article URLs arrive from remote users through mentions, so the
/// default policy refuses loopback and private ranges. `allow_private_hosts`
/// lifts that restriction for self-hosted feeds and local test servers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UrlPolicy {
    pub allow_private_hosts: bool,
}

impl UrlPolicy {
    pub const STRICT: UrlPolicy = UrlPolicy {
        allow_private_hosts: false,
    };

    pub const PERMISSIVE: UrlPolicy = UrlPolicy {
        allow_private_hosts: true,
    };
}

/// Validates a URL string before the bot fetches it.
///
/// Rejects non-HTTP(S) schemes always; rejects localhost and private,
/// link-local or unspecified addresses unless the policy allows them.
///
/// # Examples
///
/// ```
/// use monesi::util::{validate_url, UrlPolicy};
///
/// let url = validate_url("https://example.com/feed.xml", UrlPolicy::STRICT).unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_url("http://localhost/feed", UrlPolicy::STRICT).is_err());
/// assert!(validate_url("http://localhost/feed", UrlPolicy::PERMISSIVE).is_ok());
/// assert!(validate_url("file:///etc/passwd", UrlPolicy::PERMISSIVE).is_err());
/// ```
pub fn validate_url(url_str: &str, policy: UrlPolicy) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if policy.allow_private_hosts {
        return Ok(url);
    }

    if let Some(host) = url.host_str() {
        if host.eq_ignore_ascii_case("localhost") {
            return Err(UrlValidationError::Localhost);
        }

        // IPv6 hosts come back bracketed
        let bare = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        if let Ok(ip) = bare.parse::<IpAddr>() {
            if ip.is_loopback() {
                return Err(UrlValidationError::Localhost);
            }
            if is_private_ip(&ip) {
                return Err(UrlValidationError::PrivateIp(ip.to_string()));
            }
        }
    }

    Ok(url)
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local() || v4.is_unspecified(),
        IpAddr::V6(v6) => {
            if v6.is_unspecified() {
                return true;
            }
            let first = v6.segments()[0];
            // fc00::/7 unique local, fe80::/10 link local
            (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}
