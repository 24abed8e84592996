// ===============================
// src/main.rs
// ===============================
/*
 # health & metrics
 curl -s localhost:9898/health
 curl -s localhost:9898/metrics/trading
 curl -s localhost:9898/metrics/system
 curl -s localhost:9898/metrics | egrep '^(websocket_messages_total|trading_signals_total|ws_connected)'
*/
/*
=============================================================================
Project : kline_sma_trader — async SMA crossover paper trader in Rust
Module  : main.rs
Version : 0.1.0
Author  : kline_sma_trader contributors
License : MIT

Summary : Streams Binance klines for one symbol, detects short/long SMA
          crossovers, paper-trades a single LONG position, persists every
          sample/signal/order/position, and exposes health + Prometheus metrics.
=============================================================================
*/
use std::process::ExitCode;
use std::sync::Arc;

use tokio::{select, sync::mpsc, time::{timeout, Duration}};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use kline_sma_trader::{
    config, metrics,
    feed::{Backoff, StreamIngestor},
    pipeline::SignalPipeline,
    recorder::JsonlStore,
    server::{self, AppState},
    store::{MemoryStore, Store},
    system,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const SYSTEM_SAMPLE_EVERY: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> ExitCode {
    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ---- Load config ----
    let cfg = match config::load() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    info!(
        symbol = %cfg.symbol,
        interval = %cfg.interval,
        stream = %cfg.stream_url,
        short_period = cfg.strategy.short_period,
        long_period = cfg.strategy.long_period,
        unit_qty = %cfg.strategy.unit_qty,
        record_file = ?cfg.record_file,
        http_port = cfg.http_port,
        "startup config"
    );

    // ---- Metrics ----
    metrics::init();
    tokio::spawn(system::run(SYSTEM_SAMPLE_EVERY));

    // ---- Store ----
    let store: Arc<dyn Store> = match &cfg.record_file {
        Some(path) => match JsonlStore::open(path, cfg.sample_retention).await {
            Ok(s) => Arc::new(s),
            Err(e) => {
                error!(error = %e, path = %path.display(), "cannot open record file");
                return ExitCode::FAILURE;
            }
        },
        None => {
            warn!("RECORD_FILE not set, using in-memory store (nothing survives restart)");
            Arc::new(MemoryStore::with_sample_retention(cfg.sample_retention))
        }
    };

    // ---- Pipeline (rehydrate dari store) ----
    let pipeline = match SignalPipeline::recover(cfg.symbol.clone(), &cfg.strategy, store.clone()).await {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "pipeline recovery failed");
            return ExitCode::FAILURE;
        }
    };

    // ---- Feed ----
    let ingestor = StreamIngestor::new(
        cfg.symbol.clone(),
        cfg.stream_url.clone(),
        Backoff::new(cfg.backoff_initial, cfg.backoff_max),
    );
    let health = ingestor.health();

    // ---- HTTP ----
    let state = Arc::new(AppState { health, store: store.clone() });
    let http_port = cfg.http_port;
    tokio::spawn(async move {
        if let Err(e) = server::serve(http_port, state).await {
            error!(?e, "http server stopped");
        }
    });

    // ---- Wire ingestor -> pipeline ----
    let (tick_tx, tick_rx) = mpsc::channel(cfg.channel_capacity);
    let mut pipeline_task = tokio::spawn(pipeline.run(tick_rx));
    let mut feed_task = tokio::spawn(ingestor.start(tick_tx));

    select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
        res = &mut feed_task => {
            warn!(?res, "ingestion task ended");
        }
        res = &mut pipeline_task => {
            error!(?res, "pipeline task ended unexpectedly");
        }
    }

    // Stop ingestion; dropping its sender lets the pipeline drain and exit.
    feed_task.abort();
    if !pipeline_task.is_finished() {
        match timeout(SHUTDOWN_GRACE, &mut pipeline_task).await {
            Ok(_) => info!("pipeline drained"),
            Err(_) => {
                warn!("pipeline did not drain in time, abandoning in-flight ticks");
                pipeline_task.abort();
            }
        }
    }
    if let Err(e) = store.flush().await {
        warn!(error = %e, "final store flush failed");
    }
    info!("bye");
    ExitCode::SUCCESS
}
