//! In-Memory Table Sink
//!
//! A concrete [`TableSink`] holding rows under the fixed quote schema.
//! Stands in for the visualization widget: it accepts column-oriented
//! append updates, supports read-back of the resident rows, and carries
//! the view configuration (pivots, aggregates) as opaque presentation
//! data it never interprets.
//!
//! The table starts unloaded, mirroring a viewer whose worker has not
//! attached yet; operations before [`MemoryTableSink::load`] fail with
//! [`SinkError::Uninitialized`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::application::ports::{SinkError, TableSink};
use crate::domain::quote::{ColumnBatch, SinkRow, TableSchema};

// =============================================================================
// View Configuration
// =============================================================================

/// Presentation-layer settings handed to the sink at setup.
///
/// The sink stores these for whoever renders it; the feed core never reads
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewConfig {
    /// Chart type.
    pub chart: String,
    /// Row pivot columns.
    pub row_pivots: Vec<String>,
    /// Column pivot columns.
    pub column_pivots: Vec<String>,
    /// Columns rendered by the view.
    pub columns: Vec<String>,
    /// Aggregation function per column.
    pub aggregates: HashMap<String, String>,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            chart: "y_line".to_string(),
            row_pivots: vec!["timestamp".to_string()],
            column_pivots: vec!["stock".to_string()],
            columns: vec!["top_ask_price".to_string()],
            aggregates: HashMap::from([
                ("stock".to_string(), "distinct count".to_string()),
                ("top_ask_price".to_string(), "avg".to_string()),
                ("top_bid_price".to_string(), "avg".to_string()),
                ("timestamp".to_string(), "distinct count".to_string()),
            ]),
        }
    }
}

// =============================================================================
// Memory Table Sink
// =============================================================================

#[derive(Debug, Default)]
struct TableState {
    schema: TableSchema,
    rows: Vec<SinkRow>,
}

/// In-memory table sink with the fixed four-column quote schema.
#[derive(Debug)]
pub struct MemoryTableSink {
    state: RwLock<Option<TableState>>,
    view: ViewConfig,
    apply_calls: AtomicUsize,
    fail_applies: AtomicUsize,
}

impl Default for MemoryTableSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTableSink {
    /// Create a sink whose table is not yet loaded.
    #[must_use]
    pub fn new() -> Self {
        Self::with_view(ViewConfig::default())
    }

    /// Create an unloaded sink with explicit view configuration.
    #[must_use]
    pub fn with_view(view: ViewConfig) -> Self {
        Self {
            state: RwLock::new(None),
            view,
            apply_calls: AtomicUsize::new(0),
            fail_applies: AtomicUsize::new(0),
        }
    }

    /// Create a sink with its table already loaded.
    #[must_use]
    pub fn loaded() -> Self {
        let sink = Self::new();
        sink.load();
        sink
    }

    /// Load the table under the fixed schema. Idempotent; an already loaded
    /// table keeps its rows.
    pub fn load(&self) {
        let mut state = self.state.write();
        if state.is_none() {
            *state = Some(TableState::default());
        }
    }

    /// Whether the table has been loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.state.read().is_some()
    }

    /// Resident row count; zero when unloaded.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.state.read().as_ref().map_or(0, |s| s.rows.len())
    }

    /// Snapshot of the resident rows in append order.
    #[must_use]
    pub fn rows_snapshot(&self) -> Vec<SinkRow> {
        self.state
            .read()
            .as_ref()
            .map_or_else(Vec::new, |s| s.rows.clone())
    }

    /// Clear all resident rows, keeping the table loaded. Models an
    /// external reset of the viewer.
    pub fn reset(&self) {
        if let Some(state) = self.state.write().as_mut() {
            state.rows.clear();
        }
    }

    /// The presentation configuration this sink was set up with.
    #[must_use]
    pub const fn view(&self) -> &ViewConfig {
        &self.view
    }

    /// The schema the table was loaded under, once loaded.
    #[must_use]
    pub fn schema(&self) -> Option<TableSchema> {
        self.state.read().as_ref().map(|s| s.schema)
    }

    /// Total apply attempts observed, including failed ones.
    #[must_use]
    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    /// Make the next `count` apply attempts fail. Test and fault-drill
    /// support; pass zero to clear.
    pub fn fail_next_applies(&self, count: usize) {
        self.fail_applies.store(count, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> bool {
        self.fail_applies
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                (remaining > 0).then(|| remaining.saturating_sub(1))
            })
            .is_ok()
    }
}

#[async_trait]
impl TableSink for MemoryTableSink {
    async fn current_rows(&self) -> Result<Vec<SinkRow>, SinkError> {
        self.state
            .read()
            .as_ref()
            .map(|s| s.rows.clone())
            .ok_or(SinkError::Uninitialized)
    }

    async fn apply(&self, batch: ColumnBatch) -> Result<(), SinkError> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);

        if self.take_injected_failure() {
            return Err(SinkError::Rejected("injected apply failure".to_string()));
        }

        if !batch.is_aligned() {
            return Err(SinkError::Misaligned(format!(
                "stock={} ask={} bid={} timestamp={}",
                batch.stock.len(),
                batch.top_ask_price.len(),
                batch.top_bid_price.len(),
                batch.timestamp.len()
            )));
        }

        let mut guard = self.state.write();
        let state = guard.as_mut().ok_or(SinkError::Uninitialized)?;
        for row in batch.rows() {
            state.rows.push(row);
        }
        Ok(())
    }
}
