use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

mod aggregator;
mod api;
mod categorize;
mod config;
mod dashboard;
mod models;
mod snapshot;
mod sync;

use aggregator::{Aggregator, AggregatorConfig, DerivedView};
use api::{FeedClient, RemoteFetcher};
use config::{Config, SnapshotBackend};
use dashboard::AppState;
use snapshot::{FileSnapshotStore, SnapshotStore, SqliteSnapshotStore};
use sync::{Competitions, Events, Resource, Sports};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let store: Arc<dyn SnapshotStore> = match config.snapshot_backend {
        SnapshotBackend::File => {
            let store = FileSnapshotStore::new(&config.cache_dir)
                .with_context(|| format!("Failed to prepare cache dir {}", config.cache_dir))?;
            info!("Snapshots stored under {}", store.cache_dir().display());
            Arc::new(store)
        }
        SnapshotBackend::Sqlite => {
            let store = SqliteSnapshotStore::open(&config.database_path)
                .with_context(|| format!("Failed to open database {}", config.database_path))?;
            info!("Snapshots stored in {}", config.database_path);
            for key in [Sports::KEY, Competitions::KEY, Events::KEY] {
                if let Ok(Some(saved_at)) = store.saved_at(key) {
                    info!(resource = key, %saved_at, "Existing snapshot found");
                }
            }
            Arc::new(store)
        }
    };

    let fetcher: Arc<dyn RemoteFetcher> = Arc::new(FeedClient::new(
        &config.api_base_url,
        &config.events_path,
        config.request_timeout(),
    )?);
    info!(
        "Feed source: {} ({}, events at '{}')",
        config.api_base_url,
        fetcher.name(),
        config.events_path
    );

    let (handle, aggregator_task) = Aggregator::spawn(AggregatorConfig {
        fetcher,
        store,
        clock: sync::local_clock(),
        cache_read_timeout: config.cache_read_timeout(),
        refresh_interval: config.refresh_interval(),
    });

    // Log every state transition of the derived view
    let mut views = handle.subscribe();
    tokio::spawn(async move {
        while views.changed().await.is_ok() {
            match &*views.borrow_and_update() {
                DerivedView::Loading => info!("View: loading"),
                DerivedView::Error => warn!("View: error (no sports or events available)"),
                DerivedView::Success(v) => info!(
                    sports = v.sports.len(),
                    live = v.live_matches.len(),
                    upcoming = v.upcoming_matches.len(),
                    sport = ?v.selected_sport_id,
                    category = %v.selected_date_category,
                    offline = v.is_offline,
                    "View updated"
                ),
            }
        }
    });

    let app = dashboard::router(AppState {
        aggregator: handle.clone(),
    });
    let addr: SocketAddr = config.dashboard_addr.parse()?;
    info!("View API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Run the API server until ctrl-c
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    if handle.shutdown().await.is_err() {
        warn!("Aggregator had already stopped");
    }
    aggregator_task.await?;

    Ok(())
}
