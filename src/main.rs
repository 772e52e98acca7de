use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rssbridge::bridge::{Bridge, BridgeSettings, FeedEvents};
use rssbridge::config::Config;
use rssbridge::feed::{FeedNegotiator, FetchOptions, HttpFetcher};
use rssbridge::storage::{Database, DatabaseError};
use rssbridge::util::UrlPolicy;

/// Get the config directory path (~/.config/rssbridge/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("rssbridge"))
}

#[derive(Parser, Debug)]
#[command(name = "rssbridge", about = "Bridge RSS/Atom feeds into signed-message identities")]
struct Args {
    /// Config file (default: ~/.config/rssbridge/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the canonical feed URL for a page or feed URL
    Discover { url: String },
    /// Print the profile and note events for a feed as JSON lines
    Events { url: String },
    /// Discover a feed and record it in the feed store
    Register { url: String },
    /// Rebuild events for a registered feed by public key
    Refresh { public_key: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries event output
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
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
    tracing::debug!(config = ?config, "Effective configuration");

    let fetcher = Arc::new(
        HttpFetcher::new(config.max_feed_size_bytes).context("Failed to build HTTP client")?,
    );
    let options = FetchOptions {
        timeout: config.fetch_timeout(),
    };
    let policy = UrlPolicy {
        allow_private_hosts: config.allow_private_hosts,
    };

    if let Command::Discover { url } = &args.command {
        let negotiator = FeedNegotiator::new(Arc::clone(&fetcher), options, policy);
        match negotiator.get_feed_url(url).await {
            Some(feed_url) => {
                println!("{feed_url}");
                return Ok(());
            }
            None => {
                eprintln!("Error: No feed found at {url}");
                std::process::exit(1);
            }
        }
    }

    let settings = BridgeSettings {
        secret: config.resolve_secret()?,
        default_picture_url: config.default_profile_picture_url.clone(),
        auto_register: config.enable_auto_registration,
    };
    let bridge = Bridge::new(fetcher, options, policy, settings);

    match args.command {
        Command::Discover { .. } => Ok(()),
        Command::Events { url } => {
            let events = bridge.events_for(&url).await?;
            print_events(&events)
        }
        Command::Register { url } => {
            let db = open_store(&config.database_path_in(&config_dir)).await?;
            let registered = bridge.with_store(db).register(&url).await?;
            println!(
                "{} {}",
                registered.public_key, registered.source.canonical_feed_url
            );
            Ok(())
        }
        Command::Refresh { public_key } => {
            let db = open_store(&config.database_path_in(&config_dir)).await?;
            let events = bridge.with_store(db).refresh(&public_key).await?;
            print_events(&events)
        }
    }
}

async fn open_store(path: &Path) -> Result<Database> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create store directory {}", parent.display())
            })?;
        }
    }

    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    match Database::open(path_str).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::Locked) => {
            eprintln!("Error: The feed store at {path_str} is locked by another process.");
            std::process::exit(1);
        }
        Err(e) => Err(anyhow::anyhow!("Failed to open feed store: {}", e)),
    }
}

fn print_events(events: &FeedEvents) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    serde_json::to_writer(&mut out, &events.profile.event)?;
    writeln!(out)?;
    for note in &events.notes {
        serde_json::to_writer(&mut out, note)?;
        writeln!(out)?;
    }

    tracing::info!(
        feed_url = %events.source.canonical_feed_url,
        notes = events.notes.len(),
        "Printed feed events"
    );
    Ok(())
}
