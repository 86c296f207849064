//! Quote Feed Binary
//!
//! Starts the polling quote feed bridge.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin quote-feed
//! ```
//!
//! # Environment Variables
//!
//! ## Optional
//! - `QUOTE_FEED_SOURCE`: Batch source - "http" | "fixture" (default: http)
//! - `QUOTE_FEED_SOURCE_URL`: HTTP endpoint (default: <http://localhost:8080/query?id=1>)
//! - `QUOTE_FEED_FIXTURE_PATH`: Fixture file (required for the fixture source)
//! - `QUOTE_FEED_FIXTURE_CHUNK`: Ticks per replayed batch (default: 25)
//! - `QUOTE_FEED_POLL_INTERVAL_MS`: Polling cadence (default: 100)
//! - `QUOTE_FEED_FETCH_TIMEOUT_MS`: Per-fetch timeout (default: 2000)
//! - `QUOTE_FEED_APPLY_RETRY_MAX_ATTEMPTS`: Sink apply retries (default: 3)
//! - `QUOTE_FEED_METRICS_PORT`: Prometheus port, 0 disables (default: 9090)
//! - `RUST_LOG`: Log level (default: info,quote_feed=debug)

use std::sync::Arc;
use std::time::Duration;

use quote_feed::infrastructure::telemetry;
use quote_feed::{
    BatchSource, ConfigError, FeedConfig, FixtureSource, HttpBatchSource, HttpSourceConfig,
    MemoryTableSink, MergeService, PollDriver, SourceKind, init_metrics,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout for draining queued batches.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    telemetry::init();

    tracing::info!("Starting quote feed bridge");

    let config = FeedConfig::from_env()?;
    let _metrics_handle = init_metrics(config.metrics_port);
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let source = build_source(&config)?;
    let sink = Arc::new(MemoryTableSink::loaded());

    let (batch_tx, batch_rx) = mpsc::channel(config.polling.batch_channel_capacity);
    let driver = PollDriver::new(
        config.polling.to_poll_settings(),
        source,
        batch_tx,
        shutdown_token.child_token(),
    );
    let mut driver_handle = driver.spawn();

    let merge = MergeService::new(Arc::clone(&sink), config.retry.to_retry_config());
    let mut merge_task = tokio::spawn(merge.run(batch_rx, shutdown_token.clone()));

    tracing::info!("Quote feed bridge ready");

    tokio::select! {
        () = await_signal() => {
            tracing::info!("Received shutdown signal, stopping driver");
        }
        state = driver_handle.wait_until_terminal() => {
            tracing::info!(state = state.as_str(), "Polling driver reached terminal state");
        }
    }

    driver_handle.stop();
    let final_state = driver_handle.join().await;

    // The driver dropped its channel end; give the merge service a bounded
    // window to drain whatever is still queued.
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut merge_task).await {
        Ok(result) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Merge service task failed");
            }
        }
        Err(_elapsed) => {
            tracing::warn!(
                timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
                "Merge service did not drain in time, cancelling"
            );
            shutdown_token.cancel();
            let _ = merge_task.await;
        }
    }

    tracing::info!(
        state = final_state.as_str(),
        rows = sink.row_count(),
        "Quote feed bridge stopped"
    );
    Ok(())
}

/// Construct the configured batch source adapter.
fn build_source(config: &FeedConfig) -> anyhow::Result<Arc<dyn BatchSource>> {
    match config.source.kind {
        SourceKind::Http => {
            let source = HttpBatchSource::new(HttpSourceConfig {
                endpoint: config.source.http_endpoint.clone(),
                request_timeout: config.source.http_request_timeout,
            })?;
            Ok(Arc::new(source))
        }
        SourceKind::Fixture => {
            let path = config.source.fixture_path.as_deref().ok_or_else(|| {
                ConfigError::MissingEnvVar("QUOTE_FEED_FIXTURE_PATH".to_string())
            })?;
            let source = FixtureSource::from_file(path, config.source.fixture_chunk_size)?;
            Ok(Arc::new(source))
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &FeedConfig) {
    tracing::info!(
        source = config.source.kind.as_str(),
        poll_interval_ms =
            u64::try_from(config.polling.interval.as_millis()).unwrap_or(u64::MAX),
        fetch_timeout_ms =
            u64::try_from(config.polling.fetch_timeout.as_millis()).unwrap_or(u64::MAX),
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
    match config.source.kind {
        SourceKind::Http => {
            tracing::debug!(endpoint = %config.source.http_endpoint, "HTTP source endpoint");
        }
        SourceKind::Fixture => {
            if let Some(path) = config.source.fixture_path.as_deref() {
                tracing::debug!(
                    path = %path.display(),
                    chunk = config.source.fixture_chunk_size,
                    "Fixture source file"
                );
            }
        }
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
