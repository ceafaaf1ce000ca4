//! OKX depth feed binary
//!
//! Wires the connection manager to the book engine: decoded messages arrive
//! on a throttled channel, mutate the single book instance and get logged.
//! Rendering is left to downstream consumers of the book snapshots.

use std::sync::Arc;
use std::time::Duration;
use axum::{routing::get, Json, Router};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::interval;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use okx_depth_feed::{BookEngine, Config, ConnectionManager, FeedMessage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting OKX depth feed");

    // Load configuration
    let config = Arc::new(Config::load()?);
    info!(instrument = %config.instrument, bucket_width = %config.bucket_width, "Configuration loaded");

    // Single book instance; apply_message calls are serialized by this mutex
    let mut engine = BookEngine::new();
    engine.set_bucket_width(config.bucket_width)?;
    let engine = Arc::new(Mutex::new(engine));

    let (message_tx, mut message_rx) = mpsc::channel::<FeedMessage>(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (mut manager, status_rx) = ConnectionManager::new(config.clone());

    // Start health check server
    tokio::spawn(async move {
        if let Err(e) = start_health_server().await {
            warn!(error = %e, "Health server error");
        }
    });

    // Log connection status transitions
    let mut status = status_rx.clone();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let state = *status.borrow();
            info!(
                state = ?state,
                connected = state.is_connected(),
                reconnecting = state.is_reconnecting(),
                disconnected = state.is_disconnected(),
                "Connection status"
            );
        }
    });

    // Apply throttled feed messages to the book
    let consumer_engine = engine.clone();
    tokio::spawn(async move {
        while let Some(msg) = message_rx.recv().await {
            let mut engine = consumer_engine.lock().await;
            match engine.apply_message(&msg) {
                Ok(book) => debug!(
                    best_ask = ?book.best_ask(),
                    best_bid = ?book.best_bid(),
                    total = %book.total_visible_quantity,
                    "Book updated"
                ),
                // The book stays at its last good state on rejected messages
                Err(e) => warn!(error = %e, "Dropped feed message"),
            }
        }
    });

    // Periodic book status logging
    let summary_engine = engine.clone();
    tokio::spawn(async move {
        let mut summary_interval = interval(Duration::from_secs(30));
        loop {
            summary_interval.tick().await;
            let engine = summary_engine.lock().await;
            let book = engine.book();
            info!(
                best_ask = ?book.best_ask(),
                best_bid = ?book.best_bid(),
                mark_price = ?book.mark_price,
                last_traded = ?book.last_traded_price,
                total = %book.total_visible_quantity,
                "Order book status"
            );
        }
    });

    // Translate Ctrl-C into a shutdown request
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    if let Err(e) = manager.run(message_tx, shutdown_rx).await {
        error!(error = %e, "Feed connection failed");
        return Err(e.into());
    }

    Ok(())
}

/// Start HTTP server for health checks and metrics
async fn start_health_server() -> anyhow::Result<()> {
    use std::net::SocketAddr;

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics));

    let addr = SocketAddr::from(([0, 0, 0, 0], 9090));
    info!(addr = %addr, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "component": "okx-depth-feed",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics() -> String {
    use prometheus::{Encoder, TextEncoder};
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
