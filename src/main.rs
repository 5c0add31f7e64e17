use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use feedstore::config::Config;
use feedstore::storage::{Database, StorageError};
use feedstore::sync::{FeedSync, RefreshScheduler};

/// Get the config directory path (~/.config/feedstore/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    let config_dir = PathBuf::from(home).join(".config").join("feedstore");
    Ok(config_dir)
}

#[derive(Parser, Debug)]
#[command(name = "feedstore", about = "Feed ingestion and storage service")]
struct Args {
    /// Database file path (overrides the config file)
    #[arg(long, value_name = "FILE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe to a feed URL and fetch it
    Add { url: String },
    /// Unsubscribe from a feed and remove its articles
    Remove { url: String },
    /// Refresh every stored feed once
    Update,
    /// Refresh every stored feed on an interval until interrupted
    Watch {
        /// Interval in minutes (overrides the config file)
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Find stored articles matching any of the given keywords
    Search {
        #[arg(required = true)]
        keywords: Vec<String>,
        /// Maximum number of results
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Remove articles older than the given number of days
    Prune { days: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    // Set up config directory
    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
    }

    let config = Config::load(&config_dir.join("config.toml")).context("Failed to load config")?;

    let db_path = args
        .database
        .clone()
        .or_else(|| {
            if config.database.is_empty() {
                None
            } else {
                Some(PathBuf::from(&config.database))
            }
        })
        .unwrap_or_else(|| config_dir.join("feeds.db"));

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;

    // Store connection failure is the one globally fatal fault
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(e @ StorageError::Connection(_)) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    let client = reqwest::Client::new();
    let sync = FeedSync::new(
        db,
        client,
        Duration::from_secs(config.fetch_timeout_secs),
    );

    match args.command {
        Command::Add { url } => {
            sync.add_feed(&url).await?;
            println!("Added {}", url);
        }
        Command::Remove { url } => {
            sync.remove_feed(&url).await?;
            println!("Removed {}", url);
        }
        Command::Update => {
            let results = sync.refresh_all().await?;
            let failed = results.iter().filter(|r| r.result.is_err()).count();
            println!(
                "Refreshed {} feeds ({} failed)",
                results.len(),
                failed
            );
        }
        Command::Watch { interval } => {
            let minutes = interval.unwrap_or(config.refresh_interval_minutes).max(1);
            let scheduler = RefreshScheduler::new(sync.clone());

            // One immediate pass, then the interval takes over
            let results = sync.refresh_all().await?;
            println!(
                "Refreshed {} feeds; refreshing every {} minutes (Ctrl-C to stop)",
                results.len(),
                minutes
            );

            scheduler.start(Duration::from_secs(minutes * 60));
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            scheduler.stop();
        }
        Command::Search { keywords, limit } => {
            let limit = limit.unwrap_or(config.search_limit);
            let articles = sync.articles_by_keywords(&keywords, limit).await?;
            for article in &articles {
                println!(
                    "{}\t{}\t{}",
                    article.feed_url,
                    article.title.as_deref().unwrap_or("(untitled)"),
                    article.link.as_deref().unwrap_or("-")
                );
            }
            println!("{} articles", articles.len());
        }
        Command::Prune { days } => {
            let removed = sync.remove_articles_older_than(days).await?;
            println!("Removed {} articles older than {} days", removed, days);
        }
    }

    Ok(())
}
