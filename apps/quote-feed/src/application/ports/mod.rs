//! Port Interfaces
//!
//! Contracts for the two opaque collaborators of the feed pipeline,
//! following the Hexagonal Architecture pattern used across the workspace.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`BatchSource`]: the upstream producer of quote tick batches
//! - [`TableSink`]: the visualization table that holds resident rows

use async_trait::async_trait;

use crate::domain::quote::{ColumnBatch, QuoteTick, SinkRow};

/// Errors surfaced by a batch source.
///
/// Exhaustion is not an error: a source signals end-of-stream by returning
/// an empty batch.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The transport layer failed (connection, I/O, HTTP status).
    #[error("source transport failed: {0}")]
    Transport(String),

    /// The payload could not be decoded into quote ticks.
    #[error("source payload could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors surfaced by a table sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The sink exists but its table has not been loaded yet.
    #[error("sink table is not initialized")]
    Uninitialized,

    /// The update's columns are not index-aligned.
    #[error("column batch is misaligned: {0}")]
    Misaligned(String),

    /// The sink rejected an otherwise well-formed update.
    #[error("sink rejected update: {0}")]
    Rejected(String),
}

/// Upstream producer of quote tick batches.
///
/// Each call yields either a non-empty ordered batch or an empty vec, the
/// exhaustion sentinel. After signaling exhaustion a source is not called
/// again by the driver.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BatchSource: Send + Sync {
    /// Fetch the next batch of ticks.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the transport or decoding fails; the
    /// driver treats this as a contract violation and halts.
    async fn fetch_batch(&self) -> Result<Vec<QuoteTick>, SourceError>;
}

/// The visualization table: resident rows under a fixed schema, append-style
/// column updates, and read-back of the current row set.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TableSink: Send + Sync {
    /// Read back the full resident row set.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Uninitialized`] before the table is loaded.
    async fn current_rows(&self) -> Result<Vec<SinkRow>, SinkError>;

    /// Append a column-oriented update batch.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the table is not loaded or the batch is
    /// misaligned; the caller decides whether to retry.
    async fn apply(&self, batch: ColumnBatch) -> Result<(), SinkError>;
}
