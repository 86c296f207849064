//! Quote Tick Types
//!
//! Core domain types for the quote feed: the tick records produced by a
//! batch source, the append-only log of everything received, and the
//! row/column shapes understood by the table sink.
//!
//! Ticks arrive with a raw string timestamp and optionally missing price
//! sides; parsing and repair happen in the merge planner, so these types
//! preserve the wire values as received.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// Tick Records
// =============================================================================

/// One side of the book at observation time.
///
/// # Wire Format (JSON)
/// ```json
/// {"price": 101.25}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PriceLevel {
    /// Quoted price for this side. Absent or non-numeric values decode to
    /// `None`; the merge planner substitutes zero ("no quote on this side").
    #[serde(default, deserialize_with = "de_lenient_price")]
    pub price: Option<Decimal>,
}

impl PriceLevel {
    /// Create a level with a known price.
    #[must_use]
    pub const fn new(price: Decimal) -> Self {
        Self { price: Some(price) }
    }
}

/// One observed quote tick, immutable once produced.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "stock": "AAPL",
///   "timestamp": "2024-03-15T14:30:00.125Z",
///   "top_ask": {"price": 101.25},
///   "top_bid": {"price": 101.10}
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct QuoteTick {
    /// Stock identifier. The merge planner drops records where this is empty
    /// rather than corrupt the sink's key column.
    #[serde(default)]
    pub stock: String,

    /// Raw timestamp as received. Parsed to an instant during merge;
    /// unparseable values are repaired to the current wall clock.
    #[serde(default, deserialize_with = "de_lenient_timestamp")]
    pub timestamp: String,

    /// Best ask at observation time, if any.
    #[serde(default)]
    pub top_ask: Option<PriceLevel>,

    /// Best bid at observation time, if any.
    #[serde(default)]
    pub top_bid: Option<PriceLevel>,
}

impl QuoteTick {
    /// Create a tick with both sides quoted.
    #[must_use]
    pub fn new(
        stock: impl Into<String>,
        timestamp: impl Into<String>,
        ask: Decimal,
        bid: Decimal,
    ) -> Self {
        Self {
            stock: stock.into(),
            timestamp: timestamp.into(),
            top_ask: Some(PriceLevel::new(ask)),
            top_bid: Some(PriceLevel::new(bid)),
        }
    }
}

/// Accept numbers or numeric strings as prices; anything else becomes `None`.
fn de_lenient_price<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Number(n) => n.to_string().parse().ok(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

/// Accept string or numeric timestamps; anything else becomes the empty
/// string, which the merge planner treats as unparseable.
fn de_lenient_timestamp<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}

// =============================================================================
// Timestamps and Identity
// =============================================================================

/// Parse a raw tick timestamp to an instant.
///
/// Accepts RFC 3339, the common `YYYY-MM-DD HH:MM:SS[.fff]` forms (space or
/// `T` separated, assumed UTC), and integer epoch milliseconds.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    if trimmed.chars().all(|c| c.is_ascii_digit() || c == '-')
        && let Ok(millis) = trimmed.parse::<i64>()
    {
        return Utc.timestamp_millis_opt(millis).single();
    }

    None
}

/// Identity key for deduplication: `(stock, timestamp)` at millisecond
/// resolution. Two ticks with the same stock and the same instant are the
/// same logical record regardless of how the timestamp was spelled.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TickKey {
    stock: String,
    timestamp_millis: i64,
}

impl TickKey {
    /// Build a key from a stock identifier and a parsed instant.
    #[must_use]
    pub fn new(stock: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            stock: stock.to_owned(),
            timestamp_millis: timestamp.timestamp_millis(),
        }
    }

    /// The stock identifier.
    #[must_use]
    pub fn stock(&self) -> &str {
        &self.stock
    }

    /// The instant, truncated to millisecond resolution.
    #[must_use]
    pub const fn timestamp_millis(&self) -> i64 {
        self.timestamp_millis
    }
}

// =============================================================================
// Sink Shapes
// =============================================================================

/// A row as resident in the table sink: one accepted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkRow {
    /// Stock identifier.
    pub stock: String,
    /// Best ask price; zero when the tick carried no ask side.
    pub top_ask_price: Decimal,
    /// Best bid price; zero when the tick carried no bid side.
    pub top_bid_price: Decimal,
    /// Observation instant.
    pub timestamp: DateTime<Utc>,
}

impl SinkRow {
    /// The deduplication key for this row.
    #[must_use]
    pub fn key(&self) -> TickKey {
        TickKey::new(&self.stock, self.timestamp)
    }
}

/// Column data types in the sink schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// String column.
    Text,
    /// Decimal price column.
    Price,
    /// Date/time column.
    Timestamp,
}

/// The fixed four-column schema the sink is constructed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableSchema;

impl TableSchema {
    /// Column names and types, in sink order.
    #[must_use]
    pub const fn columns() -> &'static [(&'static str, ColumnType)] {
        &[
            ("stock", ColumnType::Text),
            ("top_ask_price", ColumnType::Price),
            ("top_bid_price", ColumnType::Price),
            ("timestamp", ColumnType::Timestamp),
        ]
    }
}

/// Column-oriented update batch: four index-aligned sequences, built fresh
/// each update cycle from only the newly admitted records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnBatch {
    /// Stock identifiers.
    pub stock: Vec<String>,
    /// Ask prices.
    pub top_ask_price: Vec<Decimal>,
    /// Bid prices.
    pub top_bid_price: Vec<Decimal>,
    /// Observation instants.
    pub timestamp: Vec<DateTime<Utc>>,
}

impl ColumnBatch {
    /// Create an empty batch.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            stock: Vec::new(),
            top_ask_price: Vec::new(),
            top_bid_price: Vec::new(),
            timestamp: Vec::new(),
        }
    }

    /// Append one logical row to every column.
    pub fn push_row(&mut self, row: SinkRow) {
        self.stock.push(row.stock);
        self.top_ask_price.push(row.top_ask_price);
        self.top_bid_price.push(row.top_bid_price);
        self.timestamp.push(row.timestamp);
    }

    /// Number of logical rows in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stock.len()
    }

    /// Whether the batch carries no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stock.is_empty()
    }

    /// Whether all four columns carry the same number of entries.
    #[must_use]
    pub fn is_aligned(&self) -> bool {
        let len = self.stock.len();
        self.top_ask_price.len() == len
            && self.top_bid_price.len() == len
            && self.timestamp.len() == len
    }

    /// View the batch as row structs, in column order.
    #[must_use]
    pub fn rows(&self) -> Vec<SinkRow> {
        (0..self.len())
            .map(|i| SinkRow {
                stock: self.stock[i].clone(),
                top_ask_price: self.top_ask_price[i],
                top_bid_price: self.top_bid_price[i],
                timestamp: self.timestamp[i],
            })
            .collect()
    }
}

// =============================================================================
// Accumulated Log
// =============================================================================

/// Append-only log of every tick received across all polls.
///
/// Owned by the polling driver; grows monotonically, never truncated.
#[derive(Debug, Default)]
pub struct QuoteLog {
    ticks: Vec<QuoteTick>,
}

impl QuoteLog {
    /// Create an empty log.
    #[must_use]
    pub const fn new() -> Self {
        Self { ticks: Vec::new() }
    }

    /// Append a received batch, preserving arrival order.
    pub fn append_batch(&mut self, batch: &[QuoteTick]) {
        self.ticks.extend_from_slice(batch);
    }

    /// Total ticks received so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    /// Whether anything has been received yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// All ticks in arrival order.
    #[must_use]
    pub fn as_slice(&self) -> &[QuoteTick] {
        &self.ticks
    }
}
