//! Configuration Module
//!
//! Configuration loading for the quote feed bridge.

mod settings;

pub use settings::{
    ConfigError, FeedConfig, PollingSettings, RetrySettings, SourceKind, SourceSettings,
};
