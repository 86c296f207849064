#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Quote Feed - Polling Quote Stream Bridge
//!
//! Ingests a simulated real-time feed of stock quote ticks by polling a
//! batch source at a fixed cadence, and merges every batch into a
//! pivot-chart table sink without reprocessing or duplicating previously
//! seen records.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Tick records, the append-only log, and merge planning
//!   - `quote`: Quote tick, key, row, and column-batch types
//!   - `merge`: Pure dedup/repair planning
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Interfaces for the batch source and table sink
//!   - `retry`: Bounded-backoff policy for sink applies
//!   - `services`: The merge service, sole writer to the sink
//!
//! - **Infrastructure**: Adapters and runtime integrations
//!   - `driver`: Timer-driven polling loop with explicit lifecycle states
//!   - `source`: HTTP poller and fixture replayer
//!   - `sink`: In-memory table under the fixed quote schema
//!   - `config`: Environment-variable configuration
//!   - `telemetry`: Tracing initialization
//!   - `metrics`: Prometheus metrics
//!
//! # Data Flow
//!
//! ```text
//! Batch Source ──► Polling Driver ──► Merge Service ──► Table Sink
//!  (HTTP/fixture)   (100ms cadence,    (dedup, repair,    (resident rows,
//!                    append-only log)   column batches)     read-back)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core feed types with no runtime dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and runtime integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::merge::{MergePlan, MergeStats, plan_update};
pub use domain::quote::{
    ColumnBatch, ColumnType, PriceLevel, QuoteLog, QuoteTick, SinkRow, TableSchema, TickKey,
    parse_timestamp,
};

// Ports
pub use application::ports::{BatchSource, SinkError, SourceError, TableSink};

// Retry policy
pub use application::retry::{RetryConfig, RetryPolicy};

// Merge service
pub use application::services::{MergeReport, MergeService};

// Polling driver
pub use infrastructure::driver::{DriverHandle, DriverState, PollDriver, PollSettings};

// Source adapters
pub use infrastructure::source::{FixtureSource, HttpBatchSource, HttpSourceConfig};

// Sink adapter
pub use infrastructure::sink::{MemoryTableSink, ViewConfig};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, FeedConfig, PollingSettings, RetrySettings, SourceKind, SourceSettings,
};

// Metrics
pub use infrastructure::metrics::{RepairKind, get_metrics_handle, init_metrics};

// Telemetry
pub use infrastructure::telemetry::init as init_telemetry;
