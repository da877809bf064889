use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use newsreel::config::Config;
use newsreel::images::ImageCache;
use newsreel::ingest::{IngestMode, IngestScheduler, IngestStatus, IngestionCoordinator};
use newsreel::notify::{LogNotifier, Notification, Notifier};
use newsreel::storage::{Article, Database, StoreError};
use newsreel::feed::FeedFetcher;

/// Get the config directory path (~/.config/newsreel/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("newsreel"))
}

#[derive(Parser, Debug)]
#[command(name = "newsreel", about = "RSS ingestion daemon with local article cache")]
struct Args {
    /// Path to the config file (default: ~/.config/newsreel/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Feed URL to ingest; persisted as the configured feed
    #[arg(long, value_name = "URL")]
    url: Option<String>,

    /// Run a single full refresh and exit
    #[arg(long)]
    once: bool,

    /// Reset database (delete and recreate)
    #[arg(long)]
    reset_db: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        println!("Created config directory: {}", config_dir.display());
    }

    let config_path = args
        .config
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path).context("Failed to load configuration")?;

    let db_path = config_dir.join("news.db");
    if args.reset_db && db_path.exists() {
        std::fs::remove_file(&db_path).context("Failed to delete database")?;
        println!("Database reset.");
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(StoreError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of newsreel appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    // Resolve the feed URL: command line beats stored preference beats
    // config file seed. Overrides are persisted so later runs agree.
    let mut settings = db.load_settings().await.context("Failed to load settings")?;
    let override_url = args.url.or_else(|| {
        if db_has_no_feed_preference(&settings, &config) {
            config.feed_url.clone()
        } else {
            None
        }
    });
    if let Some(url) = override_url {
        if url != settings.feed_url {
            settings.feed_url = url;
            db.save_settings(&settings)
                .await
                .context("Failed to persist feed URL")?;
        }
    }
    let feed_url = settings.feed_url.clone();

    let (discovery_tx, discovery_rx) = mpsc::channel::<Vec<Article>>(32);
    let coordinator = Arc::new(
        IngestionCoordinator::new(db.clone(), FeedFetcher::new()).with_discoveries(discovery_tx),
    );

    let image_cache = settings
        .download_images_in_background
        .then(|| Arc::new(ImageCache::new(config_dir.join("images"), reqwest::Client::new())));
    let drain = tokio::spawn(drain_discoveries(
        discovery_rx,
        db.clone(),
        image_cache,
        Arc::new(LogNotifier),
    ));

    if args.once {
        let mut status = coordinator.subscribe();
        coordinator.ingest(&feed_url, IngestMode::Full).await;
        let outcome = status.borrow_and_update().clone();
        drop(coordinator);
        let _ = drain.await;
        match outcome {
            IngestStatus::Error { message, cause } => {
                eprintln!("Error: {} ({})", message, cause);
                std::process::exit(1);
            }
            _ => {
                println!("Refreshed {} articles.", db.count().await?);
                return Ok(());
            }
        }
    }

    // Startup refresh, then periodic incremental refreshes until interrupted
    coordinator.ingest(&feed_url, IngestMode::Full).await;

    let scheduler = IngestScheduler::new(Arc::clone(&coordinator));
    if config.refresh_interval_minutes > 0 {
        let interval = std::time::Duration::from_secs(config.refresh_interval_minutes * 60);
        scheduler.schedule_periodic(feed_url, interval).await;
        tracing::info!(
            interval_minutes = config.refresh_interval_minutes,
            "periodic refresh scheduled"
        );
    } else {
        tracing::info!("periodic refresh disabled (refresh_interval_minutes = 0)");
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("shutting down");
    scheduler.shutdown().await;

    Ok(())
}

/// True when the stored feed URL is still the built-in default and the
/// config file offers a seed value instead.
fn db_has_no_feed_preference(settings: &newsreel::storage::Settings, config: &Config) -> bool {
    config.feed_url.is_some() && settings.feed_url == newsreel::storage::DEFAULT_FEED_URL
}

/// Consume batches of newly discovered articles: mirror their images into
/// the cache (when enabled) and announce each one through the notifier.
async fn drain_discoveries(
    mut rx: mpsc::Receiver<Vec<Article>>,
    db: Database,
    image_cache: Option<Arc<ImageCache>>,
    notifier: Arc<dyn Notifier>,
) {
    while let Some(fresh) = rx.recv().await {
        if let Some(cache) = &image_cache {
            match db.get_all_raw().await {
                Ok(current) => {
                    if let Err(e) = cache.sync(&current).await {
                        tracing::warn!(error = %e, "image cache sync failed");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "could not read store for image sync"),
            }
        }

        for article in &fresh {
            let image = image_cache
                .as_ref()
                .and_then(|cache| cache.cached_image(article));
            notifier.notify(&Notification::for_article(article, image));
        }
    }
}
