//! Configuration file parser for `config.toml` and credential loading.
//!
//! The config file is optional. A missing or empty file yields
//! `Config::default()`; unknown keys are accepted but logged as warnings.
//! Mastodon credentials never live in the config file: they come from the
//! environment (usually populated from `.env` by `dotenvy`).
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::util::UrlPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Environment variable that overrides `[storage] token`.
pub const STORAGE_TOKEN_ENV: &str = "MONESI_STORAGE_TOKEN";

const DEFAULT_CONFIG: &str = r#"# monesi configuration

# visibility of toots: public, unlisted, private or direct
visibility = "unlisted"
# seconds between toots of new entries
toot_interval_secs = 120
# seconds between feed fetch cycles
fetch_interval_secs = 600
# timeout for every HTTP request, in seconds
http_timeout_secs = 30
# allow feeds on localhost and private networks
allow_private_hosts = false

[storage]
# "file" or "object"
backend = "file"
path = "monesi_state.json"
# endpoint = "https://storage.example.com/bucket"
# key = "monesi_state.json"
# token is read from MONESI_STORAGE_TOKEN when set
"#;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),

    #[error("Missing credential {0}: run `monesi setup` first")]
    MissingCredential(&'static str),
}

/// Visibility of posted statuses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Unlisted,
    Private,
    Direct,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Unlisted => "unlisted",
            Visibility::Private => "private",
            Visibility::Direct => "direct",
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Object,
}

/// The `[storage]` table.
#[derive(Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// State file for the `file` backend.
    pub path: PathBuf,
    /// Base URL of the object store for the `object` backend.
    pub endpoint: Option<String>,
    /// Object key under `endpoint`.
    pub key: String,
    #[serde(deserialize_with = "deserialize_secret")]
    pub token: Option<SecretString>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            path: PathBuf::from("monesi_state.json"),
            endpoint: None,
            key: "monesi_state.json".to_string(),
            token: None,
        }
    }
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("backend", &self.backend)
            .field("path", &self.path)
            .field("endpoint", &self.endpoint)
            .field("key", &self.key)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

/// Top-level bot configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be given.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Visibility of toots announcing new entries.
    pub visibility: Visibility,

    /// Pause between two toots of new entries, in seconds.
    pub toot_interval_secs: u64,

    /// Pause between two fetch cycles, in seconds.
    pub fetch_interval_secs: u64,

    /// Disables the private-address check on feed and article URLs.
    pub allow_private_hosts: bool,

    pub http_timeout_secs: u64,

    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            visibility: Visibility::Unlisted,
            toot_interval_secs: 120,
            fetch_interval_secs: 600,
            allow_private_hosts: false,
            http_timeout_secs: 30,
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 6] = [
        "visibility",
        "toot_interval_secs",
        "fetch_interval_secs",
        "allow_private_hosts",
        "http_timeout_secs",
        "storage",
    ];

    const KNOWN_STORAGE_KEYS: [&'static str; 5] = ["backend", "path", "endpoint", "key", "token"];

    /// Load configuration from a TOML file.
    ///
    /// - Missing or blank file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    ///
    /// `MONESI_STORAGE_TOKEN` takes precedence over `[storage] token`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_file(path)?;
        config.apply_storage_token(std::env::var(STORAGE_TOKEN_ENV).ok());
        Ok(config)
    }

    /// Writes a commented default config when `path` does not exist yet,
    /// then loads it.
    pub fn setup(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            std::fs::write(path, DEFAULT_CONFIG)?;
            tracing::info!(path = %path.display(), "Created default config, check and edit it before starting the bot");
        }
        Self::load(path)
    }

    fn load_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(&raw, &Self::KNOWN_KEYS, "");
            if let Some(toml::Value::Table(storage)) = raw.get("storage") {
                warn_unknown_keys(storage, &Self::KNOWN_STORAGE_KEYS, "storage.");
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            visibility = %config.visibility,
            storage = ?config.storage.backend,
            "Loaded configuration"
        );
        Ok(config)
    }

    fn apply_storage_token(&mut self, env_token: Option<String>) {
        if let Some(token) = env_token.filter(|t| !t.is_empty()) {
            self.storage.token = Some(SecretString::from(token));
        }
    }

    /// Rejects values the runtime cannot work with. A zero toot interval is
    /// fine (no pacing); a zero fetch interval or HTTP timeout is not.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "fetch_interval_secs must be at least 1".to_owned(),
            ));
        }
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "http_timeout_secs must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn toot_interval(&self) -> Duration {
        Duration::from_secs(self.toot_interval_secs)
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn url_policy(&self) -> UrlPolicy {
        UrlPolicy {
            allow_private_hosts: self.allow_private_hosts,
        }
    }
}

fn warn_unknown_keys(table: &toml::Table, known: &[&str], prefix: &str) {
    for key in table.keys() {
        if !known.contains(&key.as_str()) {
            tracing::warn!(key = %format!("{prefix}{key}"), "Unknown key in config file, ignoring");
        }
    }
}

/// Mastodon account credentials, read from the environment.
pub struct Credentials {
    /// Instance base URL, e.g. `https://mstdn.jp`.
    pub instance_url: String,
    pub access_token: SecretString,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("instance_url", &self.instance_url)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    /// Reads `MASTODON_URL` and `MASTODON_ACCESS_TOKEN`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingCredential(name))
        };
        Ok(Self {
            instance_url: get("MASTODON_URL")?.trim_end_matches('/').to_string(),
            access_token: SecretString::from(get("MASTODON_ACCESS_TOKEN")?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    fn write_config(content: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.visibility, Visibility::Unlisted);
        assert_eq!(config.toot_interval(), Duration::from_secs(120));
        assert_eq!(config.fetch_interval(), Duration::from_secs(600));
        assert_eq!(config.http_timeout(), Duration::from_secs(30));
        assert!(!config.allow_private_hosts);
        assert_eq!(config.storage.backend, StorageBackend::File);
        assert_eq!(config.storage.path, PathBuf::from("monesi_state.json"));
    }

    #[test]
    fn test_missing_file_returns_default() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_file(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.toot_interval_secs, 120);
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let (_dir, path) = write_config("   \n  \n  ");
        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.visibility, Visibility::Unlisted);
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (_dir, path) = write_config("visibility = \"public\"\n");
        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.visibility, Visibility::Public);
        assert_eq!(config.toot_interval_secs, 120);
        assert_eq!(config.storage.backend, StorageBackend::File);
    }

    #[test]
    fn test_full_config() {
        let (_dir, path) = write_config(
            r#"
visibility = "private"
toot_interval_secs = 30
fetch_interval_secs = 900
allow_private_hosts = true
http_timeout_secs = 10

[storage]
backend = "object"
endpoint = "https://storage.example.com/bucket"
key = "bot/state.json"
token = "from-file"
"#,
        );
        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.visibility, Visibility::Private);
        assert_eq!(config.toot_interval_secs, 30);
        assert_eq!(config.fetch_interval_secs, 900);
        assert!(config.url_policy().allow_private_hosts);
        assert_eq!(config.http_timeout(), Duration::from_secs(10));
        assert_eq!(config.storage.backend, StorageBackend::Object);
        assert_eq!(
            config.storage.endpoint.as_deref(),
            Some("https://storage.example.com/bucket")
        );
        assert_eq!(config.storage.key, "bot/state.json");
        assert_eq!(
            config.storage.token.as_ref().map(|t| t.expose_secret()),
            Some("from-file")
        );
    }

    #[test]
    fn test_invalid_visibility_is_parse_error() {
        let (_dir, path) = write_config("visibility = \"everyone\"\n");
        assert!(matches!(Config::load_file(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (_dir, path) = write_config("this is not [valid toml");
        let err = Config::load_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_zero_fetch_interval_rejected() {
        let (_dir, path) = write_config("fetch_interval_secs = 0\n");
        let err = Config::load_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("fetch_interval_secs"));
    }

    #[test]
    fn test_zero_http_timeout_rejected() {
        let (_dir, path) = write_config("http_timeout_secs = 0\n");
        let err = Config::load_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("http_timeout_secs"));
    }

    #[test]
    fn test_zero_toot_interval_accepted() {
        let (_dir, path) = write_config("toot_interval_secs = 0\n");
        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.toot_interval(), Duration::ZERO);
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let (_dir, path) = write_config(
            "interval = 120\ntoot_interval_secs = 60\n[storage]\nbucket = \"x\"\n",
        );
        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.toot_interval_secs, 60);
    }

    #[test]
    fn test_too_large_file_rejected() {
        let (_dir, path) = write_config(&"a".repeat(1_048_577));
        let err = Config::load_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_env_token_overrides_file_token() {
        let (_dir, path) = write_config("[storage]\ntoken = \"from-file\"\n");
        let mut config = Config::load_file(&path).unwrap();

        config.apply_storage_token(None);
        assert_eq!(
            config.storage.token.as_ref().map(|t| t.expose_secret()),
            Some("from-file")
        );

        config.apply_storage_token(Some("from-env".to_string()));
        assert_eq!(
            config.storage.token.as_ref().map(|t| t.expose_secret()),
            Some("from-env")
        );
    }

    #[test]
    fn test_debug_masks_storage_token() {
        let mut config = Config::default();
        config.storage.token = Some(SecretString::from("super-secret-token".to_string()));
        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains("super-secret-token"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn test_setup_writes_default_file_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::setup(&path).unwrap();
        assert_eq!(config.visibility, Visibility::Unlisted);
        assert!(path.exists());

        std::fs::write(&path, "visibility = \"direct\"\n").unwrap();
        let config = Config::setup(&path).unwrap();
        assert_eq!(config.visibility, Visibility::Direct);
    }

    #[test]
    fn test_default_config_text_parses_to_defaults() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.visibility, Visibility::default());
        assert_eq!(config.toot_interval_secs, 120);
        assert_eq!(config.storage.path, PathBuf::from("monesi_state.json"));
    }

    #[test]
    fn test_credentials_from_lookup() {
        let creds = Credentials::from_lookup(|name| match name {
            "MASTODON_URL" => Some("https://mstdn.jp/".to_string()),
            "MASTODON_ACCESS_TOKEN" => Some("tok".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(creds.instance_url, "https://mstdn.jp");
        assert_eq!(creds.access_token.expose_secret(), "tok");
        assert!(!format!("{creds:?}").contains("tok\""));

        let missing = Credentials::from_lookup(|name| {
            (name == "MASTODON_URL").then(|| "https://mstdn.jp".to_string())
        });
        assert!(matches!(
            missing,
            Err(ConfigError::MissingCredential("MASTODON_ACCESS_TOKEN"))
        ));
    }
}
