use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};

use super::{Snapshot, Storage, StorageError};

/// Keeps the snapshot as one object in an HTTP object store.
///
/// The object lives at `{endpoint}/{key}`; it is read with `GET` and
/// replaced with `PUT`. Stores that support presigned or token access
/// (S3-compatible gateways, GCS/R2 buckets behind a proxy) work as long as
/// a whole-object `PUT` is atomic, which it is for all of them.
pub struct ObjectStorage {
    client: reqwest::Client,
    object_url: String,
    token: Option<SecretString>,
}

impl std::fmt::Debug for ObjectStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStorage")
            .field("object_url", &self.object_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ObjectStorage {
    pub fn new(endpoint: &str, key: &str) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("monesi/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            object_url: format!(
                "{}/{}",
                endpoint.trim_end_matches('/'),
                key.trim_start_matches('/')
            ),
            token: None,
        })
    }

    /// Sends `Authorization: Bearer <token>` with every request.
    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, &self.object_url);
        match &self.token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }
}

#[async_trait]
impl Storage for ObjectStorage {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let response = self
            .request(reqwest::Method::PUT)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(snapshot.to_json()?)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StorageError::HttpStatus(response.status().as_u16()));
        }
        tracing::debug!(
            object = %self.object_url,
            subscriptions = snapshot.subscriptions.len(),
            "Saved state"
        );
        Ok(())
    }

    async fn load(&self) -> Result<Snapshot, StorageError> {
        let response = self.request(reqwest::Method::GET).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::NotFound),
            status if !status.is_success() => Err(StorageError::HttpStatus(status.as_u16())),
            _ => Snapshot::from_json(&response.bytes().await?),
        }
    }
}
