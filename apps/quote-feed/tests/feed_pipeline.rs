//! Feed Pipeline Integration Tests
//!
//! Drives the full source → driver → merge → sink pipeline with scripted
//! sources and asserts the end-to-end dedup, repair, and lifecycle
//! behavior.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use quote_feed::{
    BatchSource, DriverHandle, DriverState, MemoryTableSink, MergeService, PollDriver,
    PollSettings, PriceLevel, QuoteTick, RetryConfig, SourceError, TickKey, parse_timestamp,
};

const T1: &str = "2024-03-15T14:30:00.000Z";
const T2: &str = "2024-03-15T14:30:00.100Z";

fn decimal(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn tick(stock: &str, ts: &str, ask: &str, bid: &str) -> QuoteTick {
    QuoteTick::new(stock, ts, decimal(ask), decimal(bid))
}

enum Step {
    Batch(Vec<QuoteTick>),
    Empty,
    Fail,
}

struct ScriptedSource {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    repeat_last_batch: bool,
}

impl ScriptedSource {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into_iter().collect()),
            calls: AtomicUsize::new(0),
            repeat_last_batch: false,
        })
    }

    /// A source that never exhausts: serves a fresh tick on every call.
    fn endless() -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            repeat_last_batch: true,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BatchSource for ScriptedSource {
    async fn fetch_batch(&self) -> Result<Vec<QuoteTick>, SourceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.repeat_last_batch {
            let ts = format!("2024-03-15T14:30:{:02}.{:03}Z", call / 1000, call % 1000);
            return Ok(vec![tick("AAPL", &ts, "101", "100")]);
        }
        match self.steps.lock().pop_front() {
            Some(Step::Batch(batch)) => Ok(batch),
            Some(Step::Empty) | None => Ok(Vec::new()),
            Some(Step::Fail) => Err(SourceError::Transport("scripted failure".to_string())),
        }
    }
}

/// Wire a pipeline with a fast cadence and return its moving parts.
fn start_pipeline(
    source: Arc<ScriptedSource>,
    sink: Arc<MemoryTableSink>,
) -> (DriverHandle, JoinHandle<()>, CancellationToken) {
    let cancel = CancellationToken::new();
    let (batch_tx, batch_rx) = mpsc::channel(64);

    let driver = PollDriver::new(
        PollSettings::new(Duration::from_millis(5), Duration::from_millis(200)),
        source,
        batch_tx,
        cancel.child_token(),
    );
    let handle = driver.spawn();

    let merge = MergeService::new(
        sink,
        RetryConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 1.0,
            jitter_factor: 0.0,
            max_attempts: 2,
        },
    );
    let merge_task = tokio::spawn(merge.run(batch_rx, cancel.clone()));

    (handle, merge_task, cancel)
}

/// Wait for the driver to finish and the merge service to drain.
async fn settle(handle: DriverHandle, merge_task: JoinHandle<()>) -> DriverState {
    let state = tokio::time::timeout(Duration::from_secs(2), handle.join())
        .await
        .expect("driver should reach a terminal state");
    tokio::time::timeout(Duration::from_secs(2), merge_task)
        .await
        .expect("merge service should drain")
        .expect("merge task should not panic");
    state
}

#[tokio::test]
async fn streams_batches_dedups_and_stops_on_exhaustion() {
    // Scenario: batch1 admits T1; batch2 re-sends T1 alongside T2; then the
    // source exhausts.
    let source = ScriptedSource::new(vec![
        Step::Batch(vec![tick("AAPL", T1, "100", "99")]),
        Step::Batch(vec![
            tick("AAPL", T1, "100", "99"),
            tick("AAPL", T2, "101", "100"),
        ]),
        Step::Empty,
    ]);
    let sink = Arc::new(MemoryTableSink::loaded());
    let (handle, merge_task, _cancel) = start_pipeline(Arc::clone(&source), Arc::clone(&sink));

    let state = settle(handle, merge_task).await;
    assert_eq!(state, DriverState::Exhausted);

    let rows = sink.rows_snapshot();
    assert_eq!(rows.len(), 2);

    assert_eq!(rows[0].stock, "AAPL");
    assert_eq!(rows[0].top_ask_price, decimal("100"));
    assert_eq!(rows[0].top_bid_price, decimal("99"));
    assert_eq!(rows[0].timestamp, parse_timestamp(T1).unwrap());

    assert_eq!(rows[1].top_ask_price, decimal("101"));
    assert_eq!(rows[1].timestamp, parse_timestamp(T2).unwrap());

    // Exactly one update per non-empty batch, none for the exhaustion tick.
    assert_eq!(sink.apply_calls(), 2);

    // No further fetches after exhaustion.
    let calls = source.calls();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(source.calls(), calls);
}

#[tokio::test]
async fn fully_duplicate_batch_skips_the_sink_update() {
    let batch = vec![tick("AAPL", T1, "100", "99")];
    let source = ScriptedSource::new(vec![
        Step::Batch(batch.clone()),
        Step::Batch(batch),
        Step::Empty,
    ]);
    let sink = Arc::new(MemoryTableSink::loaded());
    let (handle, merge_task, _cancel) = start_pipeline(source, Arc::clone(&sink));

    settle(handle, merge_task).await;

    assert_eq!(sink.row_count(), 1);
    assert_eq!(sink.apply_calls(), 1);
}

#[tokio::test]
async fn malformed_records_are_repaired_not_rejected() {
    let missing_ask = QuoteTick {
        stock: "AAPL".to_string(),
        timestamp: T1.to_string(),
        top_ask: None,
        top_bid: Some(PriceLevel::new(decimal("99"))),
    };
    let bad_timestamp = tick("MSFT", "not a timestamp", "55", "54");
    let source = ScriptedSource::new(vec![
        Step::Batch(vec![missing_ask, bad_timestamp]),
        Step::Empty,
    ]);
    let sink = Arc::new(MemoryTableSink::loaded());
    let (handle, merge_task, _cancel) = start_pipeline(source, Arc::clone(&sink));

    settle(handle, merge_task).await;

    let rows = sink.rows_snapshot();
    assert_eq!(rows.len(), 2);

    // Absent ask side repaired to zero.
    assert_eq!(rows[0].top_ask_price, Decimal::ZERO);
    assert_eq!(rows[0].top_bid_price, decimal("99"));

    // Unparseable timestamp repaired to "now", which is well after T1.
    assert_eq!(rows[1].stock, "MSFT");
    assert!(rows[1].timestamp > parse_timestamp(T1).unwrap());
}

#[tokio::test]
async fn overlapping_batches_never_duplicate_keys_and_rows_only_grow() {
    let source = ScriptedSource::new(vec![
        Step::Batch(vec![tick("AAPL", T1, "100", "99"), tick("MSFT", T1, "50", "49")]),
        Step::Batch(vec![tick("AAPL", T1, "100", "99"), tick("AAPL", T2, "101", "100")]),
        Step::Batch(vec![tick("MSFT", T1, "50", "49"), tick("MSFT", T2, "51", "50")]),
        Step::Empty,
    ]);
    let sink = Arc::new(MemoryTableSink::loaded());
    let (handle, merge_task, _cancel) = start_pipeline(source, Arc::clone(&sink));

    settle(handle, merge_task).await;

    let rows = sink.rows_snapshot();
    assert_eq!(rows.len(), 4);

    let keys: HashSet<TickKey> = rows.iter().map(quote_feed::SinkRow::key).collect();
    assert_eq!(keys.len(), rows.len(), "sink contains a duplicated key");
}

#[tokio::test]
async fn stop_halts_fetching_before_exhaustion() {
    let source = ScriptedSource::endless();
    let sink = Arc::new(MemoryTableSink::loaded());
    let (handle, merge_task, _cancel) = start_pipeline(Arc::clone(&source), Arc::clone(&sink));

    // Let a few polls happen, then stop explicitly.
    tokio::time::sleep(Duration::from_millis(30)).await;
    handle.stop();

    let state = settle(handle, merge_task).await;
    assert_eq!(state, DriverState::Stopped);

    let calls = source.calls();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(source.calls(), calls, "fetches continued after stop");

    // Everything that was admitted before the stop is still unique.
    let rows = sink.rows_snapshot();
    let keys: HashSet<TickKey> = rows.iter().map(quote_feed::SinkRow::key).collect();
    assert_eq!(keys.len(), rows.len());
}

#[tokio::test]
async fn fetch_failure_halts_the_pipeline_but_keeps_merged_rows() {
    let source = ScriptedSource::new(vec![
        Step::Batch(vec![tick("AAPL", T1, "100", "99")]),
        Step::Fail,
    ]);
    let sink = Arc::new(MemoryTableSink::loaded());
    let (handle, merge_task, _cancel) = start_pipeline(Arc::clone(&source), Arc::clone(&sink));

    let state = settle(handle, merge_task).await;
    assert_eq!(state, DriverState::Stopped);
    assert_eq!(sink.row_count(), 1);

    let calls = source.calls();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(source.calls(), calls, "fetches continued after failure");
}

#[tokio::test]
async fn transient_apply_failures_are_retried_within_the_cycle() {
    let source = ScriptedSource::new(vec![
        Step::Batch(vec![tick("AAPL", T1, "100", "99")]),
        Step::Empty,
    ]);
    let sink = Arc::new(MemoryTableSink::loaded());
    // One injected failure; the in-cycle retry should succeed.
    sink.fail_next_applies(1);

    let (handle, merge_task, _cancel) = start_pipeline(source, Arc::clone(&sink));
    settle(handle, merge_task).await;

    assert_eq!(sink.row_count(), 1);
    assert!(sink.apply_calls() >= 2);
}
