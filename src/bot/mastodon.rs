//! Minimal Mastodon REST and streaming client.
//!
//! Only what the bot needs: posting statuses, checking the token, receiving
//! mentions from the user stream, and the two OAuth calls used by setup.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;

use super::worker::WorkItem;
use crate::config::{Credentials, Visibility};
use crate::util::{html_to_text, truncate_chars};

/// Statuses longer than this are cut before posting.
pub const MAX_STATUS_CHARS: usize = 500;

pub const DEFAULT_SCOPES: &str = "read write";

/// Out-of-band redirect used for the password grant flow.
const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

#[derive(Debug, Error)]
pub enum MastodonError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Unexpected response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Anything that can publish a status.
#[async_trait]
pub trait StatusPoster: Send + Sync {
    async fn post_status(
        &self,
        text: &str,
        in_reply_to: Option<&str>,
        visibility: Visibility,
    ) -> Result<(), MastodonError>;
}

/// A status that mentions the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    /// `username@host` of the author.
    pub account: String,
    pub status_id: String,
    /// Status content reduced to plain text.
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct Account {
    pub username: String,
    pub acct: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct Status {
    id: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct Notification {
    #[serde(rename = "type")]
    kind: String,
    account: Account,
    status: Option<Status>,
}

/// Client credentials of a registered OAuth application.
pub struct AppRegistration {
    pub client_id: String,
    pub client_secret: SecretString,
}

#[derive(Deserialize)]
struct AppResponse {
    client_id: String,
    client_secret: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct MastodonClient {
    client: reqwest::Client,
    base_url: String,
    token: SecretString,
}

impl MastodonClient {
    pub fn new(base_url: &str, token: SecretString) -> Result<Self, MastodonError> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_credentials(credentials: &Credentials) -> Result<Self, MastodonError> {
        Self::new(
            &credentials.instance_url,
            SecretString::from(credentials.access_token.expose_secret().to_owned()),
        )
    }

    /// Returns the account the token belongs to.
    pub async fn verify_credentials(&self) -> Result<Account, MastodonError> {
        let response = self
            .client
            .get(format!("{}/api/v1/accounts/verify_credentials", self.base_url))
            .bearer_auth(self.token.expose_secret())
            .send()
            .await?;
        let body = checked(response).await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Reads the user stream until the server closes it, pushing every
    /// mention onto `queue`. Returns early once the queue is closed.
    pub async fn stream_mentions(&self, queue: &mpsc::Sender<WorkItem>) -> Result<(), MastodonError> {
        let response = self
            .client
            .get(format!("{}/api/v1/streaming/user", self.base_url))
            .bearer_auth(self.token.expose_secret())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let mut stream = checked(response).await?.bytes_stream();
        tracing::info!(instance = %self.base_url, "Connected to user stream");

        let mut decoder = SseDecoder::default();
        while let Some(chunk) = stream.next().await {
            for event in decoder.push(&chunk?) {
                let Some(mention) = mention_from_event(&event) else {
                    continue;
                };
                tracing::info!(from = %mention.account, text = %mention.text, "Mention received");
                if queue.send(WorkItem::Mention(mention)).await.is_err() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// [`stream_mentions`](Self::stream_mentions) in a loop, reconnecting
    /// after EOF or errors until the queue is closed.
    pub async fn watch_mentions(&self, queue: mpsc::Sender<WorkItem>, reconnect_delay: Duration) {
        loop {
            match self.stream_mentions(&queue).await {
                Ok(()) => tracing::info!("User stream ended"),
                Err(e) => tracing::warn!(error = %e, "User stream failed"),
            }
            if queue.is_closed() {
                return;
            }
            tracing::info!(delay_secs = reconnect_delay.as_secs(), "Reconnecting to user stream");
            tokio::time::sleep(reconnect_delay).await;
        }
    }
}

#[async_trait]
impl StatusPoster for MastodonClient {
    async fn post_status(
        &self,
        text: &str,
        in_reply_to: Option<&str>,
        visibility: Visibility,
    ) -> Result<(), MastodonError> {
        let status = truncate_chars(text, MAX_STATUS_CHARS);
        let mut form = vec![("status", status.as_ref()), ("visibility", visibility.as_str())];
        if let Some(id) = in_reply_to {
            form.push(("in_reply_to_id", id));
        }
        let response = self
            .client
            .post(format!("{}/api/v1/statuses", self.base_url))
            .bearer_auth(self.token.expose_secret())
            .form(&form)
            .send()
            .await?;
        checked(response).await?;
        Ok(())
    }
}

/// Registers an OAuth application on the instance.
pub async fn register_app(
    base_url: &str,
    app_name: &str,
    scopes: &str,
) -> Result<AppRegistration, MastodonError> {
    let base_url = base_url.trim_end_matches('/');
    let response = http_client()?
        .post(format!("{base_url}/api/v1/apps"))
        .form(&[
            ("client_name", app_name),
            ("redirect_uris", OOB_REDIRECT_URI),
            ("scopes", scopes),
        ])
        .send()
        .await?;
    let body = checked(response).await?.bytes().await?;
    let app: AppResponse = serde_json::from_slice(&body)?;
    Ok(AppRegistration {
        client_id: app.client_id,
        client_secret: SecretString::from(app.client_secret),
    })
}

/// Exchanges the account's email and password for an access token.
pub async fn password_grant(
    base_url: &str,
    app: &AppRegistration,
    username: &str,
    password: &SecretString,
    scopes: &str,
) -> Result<SecretString, MastodonError> {
    let base_url = base_url.trim_end_matches('/');
    let response = http_client()?
        .post(format!("{base_url}/oauth/token"))
        .form(&[
            ("grant_type", "password"),
            ("client_id", app.client_id.as_str()),
            ("client_secret", app.client_secret.expose_secret()),
            ("username", username),
            ("password", password.expose_secret()),
            ("scope", scopes),
        ])
        .send()
        .await?;
    let body = checked(response).await?.bytes().await?;
    let token: TokenResponse = serde_json::from_slice(&body)?;
    Ok(SecretString::from(token.access_token))
}

fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(concat!("monesi/", env!("CARGO_PKG_VERSION")))
        .build()
}

async fn checked(response: reqwest::Response) -> Result<reqwest::Response, MastodonError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(MastodonError::HttpStatus(status.as_u16()))
    }
}

/// One server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SseEvent {
    event: String,
    data: String,
}

/// Incremental `text/event-stream` decoder; chunks may split lines anywhere.
#[derive(Default)]
struct SseDecoder {
    buffer: Vec<u8>,
    current: SseEvent,
}

impl SseDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                let event = std::mem::take(&mut self.current);
                if !event.data.is_empty() {
                    events.push(event);
                }
                continue;
            }
            // ":" lines are comments/heartbeats
            if line.starts_with(':') {
                continue;
            }
            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.current.event = value.to_string(),
                "data" => {
                    if !self.current.data.is_empty() {
                        self.current.data.push('\n');
                    }
                    self.current.data.push_str(value);
                }
                _ => {}
            }
        }
        events
    }
}

fn mention_from_event(event: &SseEvent) -> Option<Mention> {
    if event.event != "notification" {
        return None;
    }
    let notification: Notification = match serde_json::from_str(&event.data) {
        Ok(n) => n,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping undecodable notification");
            return None;
        }
    };
    if notification.kind != "mention" {
        return None;
    }
    let status = notification.status?;
    if status.content.is_empty() {
        return None;
    }
    let host = url::Url::parse(&notification.account.url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))?;
    Some(Mention {
        account: format!("{}@{}", notification.account.username, host),
        status_id: status.id,
        text: html_to_text(&status.content),
    })
}
