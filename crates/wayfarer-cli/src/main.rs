//! Wayfarer - a command-line client for location-scoped travel content.
//!
//! Streams overview text, points of interest and regional cuisine for a
//! location, keeps the catalogue cached per location, and reuses it on the
//! next start or when returning to a place.

mod args;

use std::convert::Infallible;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use futures::stream::{self, Stream};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use args::{Command, USAGE};
use wayfarer_core::api::StreamClient;
use wayfarer_core::cache::CacheManager;
use wayfarer_core::config::Config;
use wayfarer_core::models::strip_metadata;
use wayfarer_core::router::{self, EventHandler, RoutedEvent};
use wayfarer_core::stream::{decode, Event, StreamError};
use wayfarer_core::{CatalogueManager, LocationContext, RestoreOutcome};

/// Log file written inside the cache directory.
const LOG_FILE: &str = "wayfarer.log";

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG to control the level (e.g., RUST_LOG=debug). Output goes to
/// stderr and to a log file in `log_dir`.
fn init_tracing(log_dir: &Path) -> WorkerGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .with(filter)
        .init();

    guard
}

/// Forwards events to the manager and persists whenever a burst finishes.
struct PersistOnFinish<'a> {
    manager: &'a mut CatalogueManager,
    location: LocationContext,
    writes: Vec<JoinHandle<()>>,
}

impl EventHandler for PersistOnFinish<'_> {
    fn handle(&mut self, event: RoutedEvent) {
        let finished = matches!(event, RoutedEvent::Finish(_));
        self.manager.handle(event);
        if finished {
            if let Some(write) = self.manager.persist_current_state(Some(&self.location)) {
                self.writes.push(write);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let raw_args: Vec<String> = std::env::args().skip(1).collect();
    let command = match args::parse(&raw_args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config, using defaults: {}", e);
            Config::default()
        }
    };
    let cache_dir = config.cache_dir().unwrap_or_else(|_| PathBuf::from("./cache"));
    let cache = CacheManager::new(cache_dir.clone())?.with_max_age_hours(config.snapshot_max_age_hours);
    let _log_guard = init_tracing(&cache_dir);
    info!(?cache_dir, "Wayfarer starting");

    match command {
        Command::Help => println!("{}", USAGE),
        Command::ClearCache => {
            let removed = cache.clear()?;
            println!("Removed {} cached snapshot file(s)", removed);
        }
        Command::Show => {
            let mut manager = CatalogueManager::with_cache(cache);
            match manager.restore_from_cache(None).await {
                RestoreOutcome::Hit { age, .. } => {
                    println!("(cached {})", age);
                    render(&manager);
                }
                RestoreOutcome::Miss => println!("Nothing cached yet"),
            }
        }
        Command::Stream(location) => {
            let server_url = config
                .server_url
                .clone()
                .context("No server configured (set WAYFARER_SERVER_URL or server_url in config.json)")?;
            let mut client = StreamClient::new(server_url)?;
            if let Some(token) = config.api_token.clone() {
                client = client.with_token(token);
            }

            let mut manager = CatalogueManager::with_cache(cache);
            prepare_location(&mut manager, &location).await;
            let events = client.open(&location).await?;
            run_burst(&mut manager, location.clone(), events).await?;
            render(&manager);
        }
        Command::Replay { path, location } => {
            let bytes = std::fs::read(&path).with_context(|| format!("Failed to read capture file: {}", path))?;
            let source = stream::iter(vec![Ok::<_, Infallible>(bytes)]);

            let mut manager = CatalogueManager::with_cache(cache);
            prepare_location(&mut manager, &location).await;
            run_burst(&mut manager, location, decode(source)).await?;
            render(&manager);
        }
    }

    info!("Wayfarer shutting down");
    Ok(())
}

/// Cold-start restore, prune for the new location, then fill from its snapshot.
async fn prepare_location(manager: &mut CatalogueManager, location: &LocationContext) {
    manager.restore_from_cache(None).await;

    let report = manager.set_location(location.clone(), false);
    info!(
        divergence = ?report.stale.divergence(),
        removed_items = report.removed_items,
        "Location set"
    );

    if let RestoreOutcome::Hit { items_added, age, .. } = manager.restore_from_cache(Some(location)).await {
        info!(items_added, %age, "Filled catalogue from cached snapshot");
    }
}

/// Route one stream into the manager, persisting after each finished burst.
async fn run_burst<S>(manager: &mut CatalogueManager, location: LocationContext, events: S) -> Result<()>
where
    S: Stream<Item = Result<Event, StreamError>>,
{
    let mut handler = PersistOnFinish {
        manager,
        location,
        writes: Vec::new(),
    };

    let result = router::run(events, &mut handler).await;

    for write in handler.writes {
        if let Err(e) = write.await {
            warn!(error = %e, "Snapshot write task failed");
        }
    }

    match result {
        Ok(stats) => {
            info!(applied = stats.applied, skipped = stats.skipped, "Stream complete");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Stream interrupted");
            Err(e.into())
        }
    }
}

fn render(manager: &CatalogueManager) {
    if let Some(summary) = manager.location_summary() {
        println!("# {}", summary.label());
    }

    let feed = manager.feed();
    if let Some(ref notification) = feed.notification {
        println!("[{}]", notification.message);
    }
    if !feed.narrative.is_empty() {
        println!("\n{}", feed.narrative);
    }

    for section in manager.ordered_sections() {
        println!("\n== {} ==", section.display_title);
        match strip_metadata(&section.content) {
            serde_json::Value::Object(items) => {
                for (key, item) in items {
                    println!("  {}: {}", key, item);
                }
            }
            other => println!("  {}", other),
        }
    }

    if !feed.markers.is_empty() {
        println!("\n{} map marker(s)", feed.markers.len());
    }
}
