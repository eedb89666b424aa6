use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use planet::config::Config;
use planet::export;
use planet::feed::{FeedRsExtractor, HttpFetcher};
use planet::storage::{Database, StorageError};
use planet::sync::{shutdown_channel, Synchronizer};

type PlanetSync = Synchronizer<HttpFetcher, FeedRsExtractor>;

/// Get the config directory path (~/.config/planet/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("planet"))
}

#[derive(Parser, Debug)]
#[command(name = "planet", version, about = "Aggregate feeds into a static planet site")]
struct Args {
    /// SQLite database file (default: planet.db next to the config file)
    #[arg(short, long, global = true, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Configuration file (default: ~/.config/planet/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a feed after fetching it once to read its metadata
    AddFeed {
        url: String,

        /// Author to record instead of the one the feed declares
        #[arg(long)]
        author: Option<String>,
    },

    /// Synchronize every enabled feed
    Update,

    /// Write planet.json for the site generator into OUTPUT
    Generate { output: PathBuf },

    /// List registered feeds
    List,

    /// Include a feed in synchronization again
    Enable { id: i64 },

    /// Exclude a feed from synchronization, keeping its posts
    Disable { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = args
        .db
        .clone()
        .unwrap_or_else(|| config.database_path_for(&config_path));
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(StorageError::Locked) => {
            eprintln!("Error: The database is locked by another planet process. Please try again later.");
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let fetcher = HttpFetcher::with_user_agent(&config.user_agent, config.fetch_options())
        .context("Failed to build HTTP client")?;
    let sync = Synchronizer::new(db.clone(), fetcher, FeedRsExtractor, config.sync_options());

    let result = run(args.command, &sync).await;
    db.close().await;
    result
}

async fn run(command: Command, sync: &PlanetSync) -> Result<()> {
    let db = sync.database();

    match command {
        Command::AddFeed { url, author } => {
            let feed = sync
                .register_feed(&url, author.as_deref())
                .await
                .with_context(|| format!("Failed to add feed {}", url))?;
            println!("Added feed {}: {} ({})", feed.id, feed.title, feed.url);
        }

        Command::Update => {
            let feeds = db
                .with_transaction(|tx| Box::pin(async move { tx.load_enabled_feeds().await }))
                .await
                .context("Failed to load feeds")?;

            let (handle, shutdown) = shutdown_channel();
            let interrupt = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, finishing feeds already in progress");
                    handle.trigger();
                }
            });

            let report = sync.synchronize_all(feeds, shutdown).await;
            interrupt.abort();

            // Per-feed failures are reported, not fatal
            println!("{}", report);
        }

        Command::Generate { output } => {
            let path = export::write_snapshot(db, &output)
                .await
                .context("Failed to generate site snapshot")?;
            println!("Wrote {}", path.display());
        }

        Command::List => {
            let feeds = db
                .with_transaction(|tx| Box::pin(async move { tx.load_feeds().await }))
                .await
                .context("Failed to load feeds")?;
            if feeds.is_empty() {
                println!("No feeds registered. Add one with: planet add-feed <url>");
            }
            for feed in feeds {
                let state = if feed.enabled { "enabled " } else { "disabled" };
                println!("{:>4}  {}  {}  <{}>", feed.id, state, feed.title, feed.url);
            }
        }

        Command::Enable { id } => set_enabled(db, id, true).await?,
        Command::Disable { id } => set_enabled(db, id, false).await?,
    }

    Ok(())
}

async fn set_enabled(db: &Database, id: i64, enabled: bool) -> Result<()> {
    db.with_transaction(move |tx| Box::pin(async move { tx.set_feed_enabled(id, enabled).await }))
        .await
        .with_context(|| format!("Failed to update feed {}", id))?;
    println!("Feed {} {}", id, if enabled { "enabled" } else { "disabled" });
    Ok(())
}
