//! Tracing Initialization
//!
//! Configures the `tracing` subscriber for the feed binary.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Log filter directives (default: `info,quote_feed=debug`)

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter applied when `RUST_LOG` is unset.
const DEFAULT_DIRECTIVES: &str = "info,quote_feed=debug";

/// Initialize the tracing subscriber.
///
/// Idempotent; subsequent calls are no-ops so tests can call it freely.
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
