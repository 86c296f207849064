//! Polling Driver
//!
//! Drives batch acquisition at a fixed cadence until the source signals
//! exhaustion, forwarding every non-empty batch downstream and keeping the
//! append-only log of everything received.
//!
//! # Lifecycle
//!
//! The driver is an explicit state machine published on a watch channel:
//!
//! ```text
//! Idle ──spawn──► Polling ──empty batch──► Exhausted
//!                    │
//!                    └──stop / fetch error / closed channel──► Stopped
//! ```
//!
//! [`PollDriver::spawn`] consumes the driver, so a single instance can never
//! run two timers. Stopping is idempotent, and dropping the returned
//! [`DriverHandle`] cancels the timer, which guarantees teardown on every
//! exit path of the owning scope.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::BatchSource;
use crate::domain::quote::{QuoteLog, QuoteTick};
use crate::infrastructure::metrics;

/// Configuration for polling behavior.
#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Interval between fetch attempts.
    pub interval: Duration,
    /// Upper bound on a single fetch; expiry skips the cycle rather than
    /// wedging the pipeline.
    pub fetch_timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            fetch_timeout: Duration::from_secs(2),
        }
    }
}

impl PollSettings {
    /// Create settings with custom values.
    #[must_use]
    pub const fn new(interval: Duration, fetch_timeout: Duration) -> Self {
        Self {
            interval,
            fetch_timeout,
        }
    }
}

/// Driver lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Constructed, not yet spawned.
    Idle,
    /// Timer running, source not yet exhausted.
    Polling,
    /// Source returned an empty batch; no further fetches will be issued.
    Exhausted,
    /// Stopped explicitly or after a fetch failure.
    Stopped,
}

impl DriverState {
    /// State name for logs and metrics labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Polling => "polling",
            Self::Exhausted => "exhausted",
            Self::Stopped => "stopped",
        }
    }

    /// Whether the driver will never issue another fetch.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Exhausted | Self::Stopped)
    }
}

/// Outcome of a single poll cycle.
enum TickOutcome {
    Forwarded,
    SkippedTimeout,
    Exhausted,
    Failed,
    ChannelClosed,
    Cancelled,
}

/// Timer-driven batch acquisition loop.
pub struct PollDriver<S>
where
    S: BatchSource + ?Sized,
{
    settings: PollSettings,
    source: Arc<S>,
    batch_tx: mpsc::Sender<Vec<QuoteTick>>,
    state_tx: watch::Sender<DriverState>,
    cancel: CancellationToken,
    log: QuoteLog,
}

impl<S> PollDriver<S>
where
    S: BatchSource + ?Sized,
{
    /// Create a new driver polling `source` and forwarding batches over
    /// `batch_tx`.
    #[must_use]
    pub fn new(
        settings: PollSettings,
        source: Arc<S>,
        batch_tx: mpsc::Sender<Vec<QuoteTick>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            settings,
            source,
            batch_tx,
            state_tx: watch::Sender::new(DriverState::Idle),
            cancel,
            log: QuoteLog::new(),
        }
    }

    /// Subscribe to state transitions, including the exhausted signal.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<DriverState> {
        self.state_tx.subscribe()
    }

    /// Run the polling loop until exhaustion, failure, or cancellation.
    pub async fn run(mut self) {
        self.state_tx.send_replace(DriverState::Polling);
        tracing::info!(
            interval_ms = u64::try_from(self.settings.interval.as_millis()).unwrap_or(u64::MAX),
            "Polling driver started"
        );

        let mut interval = tokio::time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let cancel = self.cancel.clone();

        let final_state = loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("Polling driver cancelled");
                    break DriverState::Stopped;
                }
                _ = interval.tick() => {
                    // Race the cycle against cancellation so a stop does not
                    // wait out a slow fetch.
                    let outcome = tokio::select! {
                        () = cancel.cancelled() => TickOutcome::Cancelled,
                        outcome = self.poll_once() => outcome,
                    };
                    match outcome {
                        TickOutcome::Forwarded | TickOutcome::SkippedTimeout => {}
                        TickOutcome::Exhausted => break DriverState::Exhausted,
                        TickOutcome::Failed | TickOutcome::ChannelClosed => break DriverState::Stopped,
                        TickOutcome::Cancelled => {
                            tracing::debug!("Polling driver cancelled mid-fetch");
                            break DriverState::Stopped;
                        }
                    }
                }
            }
        };

        self.state_tx.send_replace(final_state);
        // Release the timer resource on every exit path, including natural
        // exhaustion; stopping twice is harmless.
        self.cancel.cancel();
        tracing::info!(
            state = final_state.as_str(),
            received = self.log.len(),
            "Polling driver stopped"
        );
    }

    /// Spawn the loop onto the runtime and return its control handle.
    #[must_use]
    pub fn spawn(self) -> DriverHandle
    where
        S: 'static,
    {
        let cancel = self.cancel.clone();
        let state_rx = self.state_tx.subscribe();
        let join = tokio::spawn(self.run());
        DriverHandle {
            cancel,
            state_rx,
            join: Some(join),
        }
    }

    async fn poll_once(&mut self) -> TickOutcome {
        match tokio::time::timeout(self.settings.fetch_timeout, self.source.fetch_batch()).await {
            Err(_elapsed) => {
                tracing::warn!(
                    timeout_ms = u64::try_from(self.settings.fetch_timeout.as_millis())
                        .unwrap_or(u64::MAX),
                    "Batch fetch timed out, skipping cycle"
                );
                metrics::record_fetch_timeout();
                TickOutcome::SkippedTimeout
            }
            Ok(Err(err)) => {
                tracing::error!(error = %err, "Batch fetch failed, halting driver");
                metrics::record_fetch_error();
                TickOutcome::Failed
            }
            Ok(Ok(batch)) if batch.is_empty() => {
                tracing::info!(received = self.log.len(), "Source exhausted");
                TickOutcome::Exhausted
            }
            Ok(Ok(batch)) => {
                self.log.append_batch(&batch);
                metrics::record_batch_fetched(batch.len() as u64);
                metrics::set_log_records(self.log.len());
                if self.batch_tx.send(batch).await.is_err() {
                    tracing::warn!("Downstream channel closed, halting driver");
                    TickOutcome::ChannelClosed
                } else {
                    TickOutcome::Forwarded
                }
            }
        }
    }
}

/// Control surface for a spawned driver.
///
/// Dropping the handle cancels the driver, so the timer can never outlive
/// the scope that owns it.
#[derive(Debug)]
pub struct DriverHandle {
    cancel: CancellationToken,
    state_rx: watch::Receiver<DriverState>,
    join: Option<JoinHandle<()>>,
}

impl DriverHandle {
    /// Stop the driver. Idempotent; safe to call after exhaustion.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Current driver state.
    #[must_use]
    pub fn state(&self) -> DriverState {
        *self.state_rx.borrow()
    }

    /// Subscribe to state transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<DriverState> {
        self.state_rx.clone()
    }

    /// Wait until the driver reaches a terminal state and return it.
    pub async fn wait_until_terminal(&mut self) -> DriverState {
        loop {
            let state = *self.state_rx.borrow();
            if state.is_terminal() {
                return state;
            }
            if self.state_rx.changed().await.is_err() {
                return *self.state_rx.borrow();
            }
        }
    }

    /// Wait for the driver task to finish and return the final state.
    pub async fn join(mut self) -> DriverState {
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
        *self.state_rx.borrow()
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
