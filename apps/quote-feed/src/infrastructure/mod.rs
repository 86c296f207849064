//! Infrastructure Layer
//!
//! Adapters and runtime integrations.

/// Configuration loading.
pub mod config;

/// Timer-driven polling driver.
pub mod driver;

/// Prometheus metrics.
pub mod metrics;

/// In-memory table sink adapter.
pub mod sink;

/// Batch source adapters.
pub mod source;

/// Tracing initialization.
pub mod telemetry;
