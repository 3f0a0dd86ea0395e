//! One-time account setup (`monesi setup`).
//!
//! Fills in whatever is missing from `.env`: the instance URL, an OAuth
//! application and an access token from the password grant. Then writes
//! the default config file if there is none.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

use super::mastodon::{password_grant, register_app, AppRegistration, DEFAULT_SCOPES};
use crate::config::Config;

pub const DEFAULT_INSTANCE_URL: &str = "https://mstdn.jp";
const DEFAULT_APP_NAME: &str = "monesi";

pub async fn run(config_path: &Path, env_path: &Path) -> Result<()> {
    if env_path.exists() {
        dotenvy::from_path(env_path)
            .with_context(|| format!("Failed to read {}", env_path.display()))?;
    }
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    let instance_url = match env("MASTODON_URL") {
        Some(url) => url,
        None => {
            let url = prompt(&mut lines, "Instance URL", Some(DEFAULT_INSTANCE_URL)).await?;
            append_env(env_path, "MASTODON_URL", &url)?;
            url
        }
    };
    let scopes = env("MASTODON_SCOPES").unwrap_or_else(|| DEFAULT_SCOPES.to_string());
    let app_name = env("MASTODON_APP_NAME").unwrap_or_else(|| DEFAULT_APP_NAME.to_string());

    let app = match (env("MASTODON_CLIENT_ID"), env("MASTODON_CLIENT_SECRET")) {
        (Some(client_id), Some(client_secret)) => AppRegistration {
            client_id,
            client_secret: SecretString::from(client_secret),
        },
        _ => {
            let app = register_app(&instance_url, &app_name, &scopes)
                .await
                .with_context(|| format!("Failed to register app on {instance_url}"))?;
            append_env(env_path, "MASTODON_CLIENT_ID", &app.client_id)?;
            append_env(env_path, "MASTODON_CLIENT_SECRET", app.client_secret.expose_secret())?;
            tracing::info!(instance = %instance_url, "Registered application");
            app
        }
    };

    if env("MASTODON_ACCESS_TOKEN").is_none() {
        let email = prompt(&mut lines, "Your Email Address", None).await?;
        let password = SecretString::from(prompt(&mut lines, "Your Password", None).await?);
        let token = password_grant(&instance_url, &app, &email, &password, &scopes)
            .await
            .context("Login failed, check email and password")?;
        append_env(env_path, "MASTODON_ACCESS_TOKEN", token.expose_secret())?;
        tracing::info!("Obtained access token");
    }

    Config::setup(config_path)
        .with_context(|| format!("Failed to set up {}", config_path.display()))?;
    println!(
        "Setup done. Check {} before starting the bot.",
        config_path.display()
    );
    Ok(())
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

async fn prompt<R>(lines: &mut Lines<R>, question: &str, default: Option<&str>) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    match default {
        Some(default) => print!("{question} [{default}]: "),
        None => print!("{question}: "),
    }
    std::io::stdout().flush()?;

    let answer = lines
        .next_line()
        .await?
        .context("Input closed before setup finished")?;
    let answer = answer.trim();
    match (answer.is_empty(), default) {
        (true, Some(default)) => Ok(default.to_string()),
        (true, None) => anyhow::bail!("{question} is required"),
        (false, _) => Ok(answer.to_string()),
    }
}

/// Appends `KEY='value'` to the dotenv file, creating it if needed.
fn append_env(path: &Path, key: &str, value: &str) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{key}='{value}'")
}
