//! Prometheus Metrics Module
//!
//! Exposes feed pipeline metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Fetching**: batches and ticks pulled from the source, timeouts, errors
//! - **Merging**: rows admitted, records deduplicated, repaired, or dropped
//! - **Applying**: sink retry and failure counts, deferred cycles
//! - **State**: resident sink rows and accumulated log size

use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// When `port` is non-zero an HTTP exporter is spawned on `0.0.0.0:port`;
/// with zero only the recorder is installed. Idempotent: later calls return
/// the handle from the first.
///
/// # Panics
///
/// Panics if the recorder cannot be installed on first initialization.
#[allow(clippy::expect_used)]
pub fn init_metrics(port: u16) -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = if port == 0 {
                builder
                    .install_recorder()
                    .expect("failed to install Prometheus recorder")
            } else {
                let addr = SocketAddr::from(([0, 0, 0, 0], port));
                let (recorder, exporter) = builder
                    .with_http_listener(addr)
                    .build()
                    .expect("failed to build Prometheus exporter");
                let handle = recorder.handle();
                metrics::set_global_recorder(recorder)
                    .expect("failed to install Prometheus recorder");
                tokio::spawn(async move {
                    if let Err(e) = exporter.await {
                        tracing::error!(error = ?e, "Prometheus exporter error");
                    }
                });
                handle
            };

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Fetch counters
    describe_counter!(
        "quote_feed_batches_fetched_total",
        "Batches received from the source"
    );
    describe_counter!(
        "quote_feed_ticks_received_total",
        "Individual ticks received from the source"
    );
    describe_counter!(
        "quote_feed_fetch_timeouts_total",
        "Fetches abandoned after the timeout"
    );
    describe_counter!("quote_feed_fetch_errors_total", "Failed source fetches");

    // Merge counters
    describe_counter!(
        "quote_feed_rows_admitted_total",
        "Rows appended to the sink"
    );
    describe_counter!(
        "quote_feed_records_deduplicated_total",
        "Records filtered as already-seen keys"
    );
    describe_counter!(
        "quote_feed_records_repaired_total",
        "Records kept after a field repair, by field"
    );
    describe_counter!(
        "quote_feed_records_dropped_total",
        "Records dropped for an empty stock identifier"
    );

    // Apply counters
    describe_counter!("quote_feed_apply_retries_total", "Retried sink applies");
    describe_counter!(
        "quote_feed_apply_failures_total",
        "Sink applies abandoned after the retry budget"
    );
    describe_counter!(
        "quote_feed_cycles_deferred_total",
        "Merge cycles deferred to the next batch"
    );

    // State gauges
    describe_gauge!("quote_feed_sink_rows", "Rows resident in the sink");
    describe_gauge!(
        "quote_feed_log_records",
        "Ticks accumulated in the append-only log"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Field whose value was repaired rather than rejected.
#[derive(Debug, Clone, Copy)]
pub enum RepairKind {
    /// Unparseable timestamp replaced with the current instant.
    Timestamp,
    /// Absent or non-numeric price side defaulted to zero.
    Price,
}

impl RepairKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Timestamp => "timestamp",
            Self::Price => "price",
        }
    }
}

/// Record a non-empty batch received from the source.
pub fn record_batch_fetched(ticks: u64) {
    counter!("quote_feed_batches_fetched_total").increment(1);
    counter!("quote_feed_ticks_received_total").increment(ticks);
}

/// Record a fetch abandoned after the timeout.
pub fn record_fetch_timeout() {
    counter!("quote_feed_fetch_timeouts_total").increment(1);
}

/// Record a failed fetch.
pub fn record_fetch_error() {
    counter!("quote_feed_fetch_errors_total").increment(1);
}

/// Record rows appended to the sink.
pub fn record_rows_admitted(count: u64) {
    counter!("quote_feed_rows_admitted_total").increment(count);
}

/// Record records filtered as duplicates.
pub fn record_records_deduplicated(count: u64) {
    if count > 0 {
        counter!("quote_feed_records_deduplicated_total").increment(count);
    }
}

/// Record records kept after repairing a field.
pub fn record_records_repaired(kind: RepairKind, count: u64) {
    if count > 0 {
        counter!(
            "quote_feed_records_repaired_total",
            "field" => kind.as_str()
        )
        .increment(count);
    }
}

/// Record records dropped for an empty key column.
pub fn record_records_dropped(count: u64) {
    if count > 0 {
        counter!("quote_feed_records_dropped_total").increment(count);
    }
}

/// Record a retried sink apply.
pub fn record_apply_retry() {
    counter!("quote_feed_apply_retries_total").increment(1);
}

/// Record a sink apply abandoned after the retry budget.
pub fn record_apply_failure() {
    counter!("quote_feed_apply_failures_total").increment(1);
}

/// Record a merge cycle deferred to the next batch.
pub fn record_cycle_deferred() {
    counter!("quote_feed_cycles_deferred_total").increment(1);
}

/// Update the resident sink row gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_sink_rows(count: usize) {
    gauge!("quote_feed_sink_rows").set(count as f64);
}

/// Update the accumulated log gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_log_records(count: usize) {
    gauge!("quote_feed_log_records").set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repair_kind_as_str() {
        assert_eq!(RepairKind::Timestamp.as_str(), "timestamp");
        assert_eq!(RepairKind::Price.as_str(), "price");
    }

    #[test]
    fn recording_without_a_recorder_is_harmless() {
        record_batch_fetched(3);
        record_records_repaired(RepairKind::Timestamp, 1);
        set_sink_rows(42);
    }
}
