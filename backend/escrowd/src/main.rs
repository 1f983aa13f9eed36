//! BlockFund escrow daemon: entry point.
//!
//! Owns the single escrow engine instance behind a [`sequencer::Sequencer`],
//! journals every committed event to SQLite and exposes a small Axum REST
//! API for the frontend. A background sweeper settles expired projects.

mod api;
mod config;
mod db;
mod errors;
mod events;
mod sequencer;

use std::sync::Arc;
use std::time::Duration;

use blockfund_escrow::EscrowEngine;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use sequencer::{Sequencer, SharedClock, UtcClock};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    let pool = db::init_pool(&config.database_url, config.db_max_connections).await?;

    let clock: SharedClock = Arc::new(UtcClock);
    let engine = EscrowEngine::new(clock, config.engine.clone())?;
    // Engine state lives in memory; the journal keeps each run apart by session.
    let session = Utc::now().timestamp_millis();
    let sequencer = Arc::new(Sequencer::new(engine, pool.clone(), session));
    info!(session, "Escrow engine ready");

    let shutdown = CancellationToken::new();

    // ─── Expiry sweeper ───────────────────────────────────
    let sweeper = tokio::spawn(sequencer::run_sweeper(
        sequencer.clone(),
        Duration::from_secs(config.settle_interval_secs),
        shutdown.clone(),
    ));

    // ─── REST API ─────────────────────────────────────────
    let app = api::router(Arc::new(api::ApiState {
        sequencer: sequencer.clone(),
        pool,
    }));

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
        }
        signal.cancel();
    });
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    sweeper.await?;
    let unjournaled = sequencer.unjournaled().await;
    if unjournaled > 0 {
        tracing::warn!(unjournaled, "Exiting with events the journal never accepted");
    }
    Ok(())
}
