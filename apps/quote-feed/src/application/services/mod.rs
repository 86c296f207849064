//! Merge Service
//!
//! The single writer to the table sink. Consumes batches forwarded by the
//! polling driver, plans the deduplicated update, and applies it with
//! bounded retries.
//!
//! # Seen-Key Index
//!
//! Deduplication runs against a local index of admitted keys rather than a
//! full sink read-back on every cycle. The index is primed from the sink on
//! the first batch and rebuilt after [`MergeService::resync`], so the sink
//! remains the source of truth at startup and whenever it may have been
//! reset externally.
//!
//! # Failure Handling
//!
//! Structural failures never crash the pipeline: if the sink is not yet
//! initialized or an apply fails after retries, the batch stays in a
//! pending buffer and is retried together with the next batch. Dedup makes
//! that retry idempotent.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{SinkError, TableSink};
use crate::application::retry::{RetryConfig, RetryPolicy};
use crate::domain::merge::{MergeStats, plan_update};
use crate::domain::quote::{ColumnBatch, QuoteTick, SinkRow, TickKey};
use crate::infrastructure::metrics;

/// Outcome of one merge cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Rows appended to the sink this cycle.
    pub admitted: usize,
    /// Records left pending because the cycle could not complete.
    pub deferred: usize,
    /// Dedup and repair counters for the planned records.
    pub stats: MergeStats,
}

impl MergeReport {
    const fn deferred(pending: usize) -> Self {
        Self {
            admitted: 0,
            deferred: pending,
            stats: MergeStats {
                deduplicated: 0,
                dropped: 0,
                repaired_timestamps: 0,
                defaulted_prices: 0,
            },
        }
    }
}

/// Merges incoming batches into the table sink, exactly one cycle per batch.
pub struct MergeService<K>
where
    K: TableSink + ?Sized,
{
    sink: Arc<K>,
    retry_config: RetryConfig,
    seen: HashSet<TickKey>,
    primed: bool,
    pending: Vec<QuoteTick>,
}

impl<K> MergeService<K>
where
    K: TableSink + ?Sized,
{
    /// Create a merge service writing to `sink`.
    #[must_use]
    pub fn new(sink: Arc<K>, retry_config: RetryConfig) -> Self {
        Self {
            sink,
            retry_config,
            seen: HashSet::new(),
            primed: false,
            pending: Vec::new(),
        }
    }

    /// Records currently buffered awaiting a successful cycle.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Forget the local seen-key index; the next cycle re-reads the sink.
    ///
    /// Call this when the sink may have been reset externally.
    pub fn resync(&mut self) {
        self.primed = false;
        self.seen.clear();
    }

    /// Merge one received batch into the sink.
    ///
    /// Runs the full read-back/plan/apply cycle described in the module
    /// docs. Never fails: structural errors defer the records instead.
    pub async fn handle_batch(&mut self, batch: Vec<QuoteTick>) -> MergeReport {
        self.pending.extend(batch);
        if self.pending.is_empty() {
            return MergeReport::default();
        }

        if !self.primed {
            match self.sink.current_rows().await {
                Ok(rows) => {
                    self.seen = rows.iter().map(SinkRow::key).collect();
                    self.primed = true;
                    tracing::debug!(resident = self.seen.len(), "Seen-key index primed from sink");
                }
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        pending = self.pending.len(),
                        "Sink read-back failed, deferring merge cycle"
                    );
                    metrics::record_cycle_deferred();
                    return MergeReport::deferred(self.pending.len());
                }
            }
        }

        let plan = plan_update(&self.pending, &self.seen, Utc::now());
        record_plan_metrics(&plan.stats);

        if plan.is_empty() {
            // Everything deduplicated or dropped; no sink call for zero rows.
            self.pending.clear();
            return MergeReport {
                admitted: 0,
                deferred: 0,
                stats: plan.stats,
            };
        }

        match self.apply_with_retry(&plan.batch).await {
            Ok(()) => {
                self.seen.extend(plan.admitted);
                self.pending.clear();
                metrics::record_rows_admitted(plan.batch.len() as u64);
                metrics::set_sink_rows(self.seen.len());
                tracing::debug!(rows = plan.batch.len(), "Sink update applied");
                MergeReport {
                    admitted: plan.batch.len(),
                    deferred: 0,
                    stats: plan.stats,
                }
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    rows = plan.batch.len(),
                    "Sink apply failed after retries, deferring batch"
                );
                metrics::record_apply_failure();
                metrics::record_cycle_deferred();
                MergeReport::deferred(self.pending.len())
            }
        }
    }

    /// Consume batches until the channel closes or cancellation fires.
    pub async fn run(
        mut self,
        mut batch_rx: mpsc::Receiver<Vec<QuoteTick>>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("Merge service cancelled");
                    break;
                }
                received = batch_rx.recv() => {
                    match received {
                        Some(batch) => {
                            let report = self.handle_batch(batch).await;
                            tracing::trace!(
                                admitted = report.admitted,
                                deduplicated = report.stats.deduplicated,
                                deferred = report.deferred,
                                "Merge cycle complete"
                            );
                        }
                        None => {
                            tracing::debug!("Batch channel closed, merge service stopping");
                            break;
                        }
                    }
                }
            }
        }

        if !self.pending.is_empty() {
            tracing::warn!(
                pending = self.pending.len(),
                "Merge service stopping with unmerged records"
            );
        }
    }

    async fn apply_with_retry(&self, batch: &ColumnBatch) -> Result<(), SinkError> {
        let mut policy = RetryPolicy::new(self.retry_config.clone());
        loop {
            match self.sink.apply(batch.clone()).await {
                Ok(()) => return Ok(()),
                Err(err) => match policy.next_delay() {
                    Some(delay) => {
                        tracing::warn!(
                            error = %err,
                            attempt = policy.attempt_count(),
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            "Sink apply failed, retrying"
                        );
                        metrics::record_apply_retry();
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(err),
                },
            }
        }
    }
}

fn record_plan_metrics(stats: &MergeStats) {
    metrics::record_records_deduplicated(stats.deduplicated as u64);
    metrics::record_records_dropped(stats.dropped as u64);
    metrics::record_records_repaired(
        metrics::RepairKind::Timestamp,
        stats.repaired_timestamps as u64,
    );
    metrics::record_records_repaired(metrics::RepairKind::Price, stats.defaulted_prices as u64);
}
