use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use monesi::bot::{
    console, setup, spawn_fetch_timer, MastodonClient, StatusPoster, TootDistributor, Worker,
};
use monesi::command::CommandDispatcher;
use monesi::config::{Config, Credentials, DEFAULT_CONFIG_PATH};
use monesi::feed::{FetchSettings, HttpFeedProvider};
use monesi::manager::FeedManager;
use monesi::storage;

/// Pending work items (mentions and fetch requests) the worker may lag behind by.
const WORK_QUEUE_SIZE: usize = 100;

const STREAM_RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "monesi", version, about = "Shared feed reader bot for Mastodon")]
struct Args {
    /// Configuration file
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bot: answer mentions and toot new entries
    Bot,
    /// Run commands from the terminal against the saved feeds
    Console,
    /// Register the bot account and write a default config
    Setup,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("monesi=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Setup => setup::run(&args.config, Path::new(".env")).await,
        Command::Console => {
            dotenvy::dotenv().ok();
            let config = load_config(&args.config)?;
            run_console(&config).await
        }
        Command::Bot => {
            dotenvy::dotenv().ok();
            let config = load_config(&args.config)?;
            run_bot(&config).await
        }
    }
}

fn load_config(path: &Path) -> Result<Config> {
    Config::load(path).with_context(|| format!("Failed to load config '{}'", path.display()))
}

async fn open_manager(config: &Config) -> Result<FeedManager> {
    let settings = FetchSettings {
        timeout: config.http_timeout(),
        ..FetchSettings::default()
    };
    let provider =
        HttpFeedProvider::new(config.url_policy(), settings).context("Failed to build HTTP client")?;
    let storage = storage::open(&config.storage).context("Failed to open storage")?;

    let mut manager = FeedManager::new(Arc::new(provider), storage);
    manager.load().await.context("Failed to load saved feeds")?;
    Ok(manager)
}

async fn run_console(config: &Config) -> Result<()> {
    let mut dispatcher = CommandDispatcher::new(open_manager(config).await?);
    let input = tokio::io::BufReader::new(tokio::io::stdin());
    let mut output = tokio::io::stdout();
    console::run(&mut dispatcher, input, &mut output)
        .await
        .context("Console I/O failed")
}

async fn run_bot(config: &Config) -> Result<()> {
    let credentials = Credentials::from_env()?;
    let client = Arc::new(
        MastodonClient::from_credentials(&credentials).context("Failed to build Mastodon client")?,
    );
    let account = client
        .verify_credentials()
        .await
        .context("Failed to verify the access token")?;
    tracing::info!(account = %account.acct, instance = %credentials.instance_url, "Logged in");

    let dispatcher = CommandDispatcher::new(open_manager(config).await?);
    let poster: Arc<dyn StatusPoster> = client.clone();

    let (toots, distributor) =
        TootDistributor::new(Arc::clone(&poster), config.toot_interval(), config.visibility).spawn();

    let (work_tx, work_rx) = mpsc::channel(WORK_QUEUE_SIZE);
    let listener = {
        let client = Arc::clone(&client);
        let work_tx = work_tx.clone();
        tokio::spawn(async move { client.watch_mentions(work_tx, STREAM_RECONNECT_DELAY).await })
    };
    let timer = spawn_fetch_timer(work_tx, config.fetch_interval());
    let mut worker = tokio::spawn(Worker::new(dispatcher, poster, toots).run(work_rx));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Received Ctrl-C, shutting down");
        }
        result = &mut worker => {
            result.context("Worker task failed")?;
        }
    }

    listener.abort();
    timer.abort();
    worker.abort();
    distributor.abort();
    Ok(())
}
