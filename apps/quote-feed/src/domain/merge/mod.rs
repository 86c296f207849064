//! Incremental Merge Planning
//!
//! Translates a batch of raw quote ticks into the minimal column-oriented
//! sink update: deduplicate against everything already admitted, repair
//! malformed fields per policy, and shape the survivors into index-aligned
//! columns.
//!
//! # Repair Policy
//!
//! - Empty `stock`: the record is dropped and counted. A missing key column
//!   can never be repaired without corrupting deduplication.
//! - Absent or non-numeric price side: substituted with zero. No quote on a
//!   side is a valid market state, not an error.
//! - Unparseable `timestamp`: substituted with the supplied wall-clock
//!   instant and counted. The row stays visible at the cost of timestamp
//!   fidelity.
//!
//! Planning is pure: the caller supplies the already-seen key set and the
//! current instant, so the same inputs always produce the same plan.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::quote::{ColumnBatch, QuoteTick, SinkRow, TickKey, parse_timestamp};

/// Counters describing what happened to the records of one planned batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Records filtered out because their key was already admitted.
    pub deduplicated: usize,
    /// Records dropped for an empty stock identifier.
    pub dropped: usize,
    /// Records whose timestamp was replaced with the current instant.
    pub repaired_timestamps: usize,
    /// Price sides (ask or bid) defaulted to zero.
    pub defaulted_prices: usize,
}

/// The computed update for one batch: the column batch to apply, the keys it
/// admits, and the repair counters.
#[derive(Debug, Clone, Default)]
pub struct MergePlan {
    /// Columns to append to the sink, in input order.
    pub batch: ColumnBatch,
    /// Keys of the admitted rows, index-aligned with `batch`.
    pub admitted: Vec<TickKey>,
    /// What was deduplicated, dropped, or repaired.
    pub stats: MergeStats,
}

impl MergePlan {
    /// Whether the plan admits no rows and the sink call should be skipped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}

/// Plan the sink update for `records` given the set of keys already resident
/// in the sink.
///
/// `now` is the fallback instant for unparseable timestamps; passing it in
/// keeps planning deterministic. Records that duplicate a key within the
/// same batch are deduplicated too, so the resulting batch never admits the
/// same key twice.
#[must_use]
pub fn plan_update(
    records: &[QuoteTick],
    seen: &HashSet<TickKey>,
    now: DateTime<Utc>,
) -> MergePlan {
    let mut plan = MergePlan::default();
    let mut admitted_keys: HashSet<TickKey> = HashSet::new();

    for record in records {
        if record.stock.is_empty() {
            plan.stats.dropped += 1;
            tracing::warn!(timestamp = %record.timestamp, "Dropping tick with empty stock identifier");
            continue;
        }

        let timestamp = match parse_timestamp(&record.timestamp) {
            Some(parsed) => parsed,
            None => {
                plan.stats.repaired_timestamps += 1;
                tracing::warn!(
                    stock = %record.stock,
                    raw = %record.timestamp,
                    "Unparseable tick timestamp, substituting current time"
                );
                now
            }
        };

        let key = TickKey::new(&record.stock, timestamp);
        if seen.contains(&key) || admitted_keys.contains(&key) {
            plan.stats.deduplicated += 1;
            continue;
        }

        let top_ask_price = extract_price(record.top_ask.as_ref().and_then(|l| l.price), &mut plan.stats);
        let top_bid_price = extract_price(record.top_bid.as_ref().and_then(|l| l.price), &mut plan.stats);

        plan.batch.push_row(SinkRow {
            stock: record.stock.clone(),
            top_ask_price,
            top_bid_price,
            timestamp,
        });
        admitted_keys.insert(key.clone());
        plan.admitted.push(key);
    }

    plan
}

fn extract_price(price: Option<Decimal>, stats: &mut MergeStats) -> Decimal {
    price.unwrap_or_else(|| {
        stats.defaulted_prices += 1;
        Decimal::ZERO
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quote::PriceLevel;
    use test_case::test_case;

    const T1: &str = "2024-03-15T14:30:00.000Z";
    const T2: &str = "2024-03-15T14:30:00.100Z";

    fn decimal(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn tick(stock: &str, ts: &str, ask: &str, bid: &str) -> QuoteTick {
        QuoteTick::new(stock, ts, decimal(ask), decimal(bid))
    }

    fn key_of(stock: &str, ts: &str) -> TickKey {
        TickKey::new(stock, parse_timestamp(ts).unwrap())
    }

    #[test]
    fn admits_fresh_records_in_input_order() {
        let records = vec![tick("AAPL", T1, "100", "99"), tick("MSFT", T1, "50", "49")];
        let plan = plan_update(&records, &HashSet::new(), Utc::now());

        assert_eq!(plan.batch.len(), 2);
        assert!(plan.batch.is_aligned());
        assert_eq!(plan.batch.stock, vec!["AAPL", "MSFT"]);
        assert_eq!(plan.batch.top_ask_price, vec![decimal("100"), decimal("50")]);
        assert_eq!(plan.admitted.len(), 2);
        assert_eq!(plan.stats, MergeStats::default());
    }

    #[test]
    fn filters_records_already_seen() {
        let seen: HashSet<TickKey> = [key_of("AAPL", T1)].into();
        let records = vec![tick("AAPL", T1, "100", "99"), tick("AAPL", T2, "101", "100")];
        let plan = plan_update(&records, &seen, Utc::now());

        assert_eq!(plan.batch.len(), 1);
        assert_eq!(plan.admitted, vec![key_of("AAPL", T2)]);
        assert_eq!(plan.stats.deduplicated, 1);
    }

    #[test]
    fn dedup_compares_instants_not_strings() {
        let seen: HashSet<TickKey> = [key_of("AAPL", T1)].into();
        // Same instant as T1, different spelling.
        let records = vec![tick("AAPL", "2024-03-15T14:30:00+00:00", "100", "99")];
        let plan = plan_update(&records, &seen, Utc::now());

        assert!(plan.is_empty());
        assert_eq!(plan.stats.deduplicated, 1);
    }

    #[test]
    fn deduplicates_within_a_single_batch() {
        let records = vec![tick("AAPL", T1, "100", "99"), tick("AAPL", T1, "100", "99")];
        let plan = plan_update(&records, &HashSet::new(), Utc::now());

        assert_eq!(plan.batch.len(), 1);
        assert_eq!(plan.stats.deduplicated, 1);
    }

    #[test]
    fn drops_empty_stock_and_counts_it() {
        let records = vec![tick("", T1, "100", "99"), tick("AAPL", T1, "100", "99")];
        let plan = plan_update(&records, &HashSet::new(), Utc::now());

        assert_eq!(plan.batch.len(), 1);
        assert_eq!(plan.batch.stock, vec!["AAPL"]);
        assert_eq!(plan.stats.dropped, 1);
    }

    #[test_case(None, None => (Decimal::ZERO, Decimal::ZERO) ; "both sides absent")]
    #[test_case(Some("101.5"), None => (decimal("101.5"), Decimal::ZERO) ; "bid absent")]
    #[test_case(None, Some("99.5") => (Decimal::ZERO, decimal("99.5")) ; "ask absent")]
    fn absent_prices_default_to_zero(ask: Option<&str>, bid: Option<&str>) -> (Decimal, Decimal) {
        let record = QuoteTick {
            stock: "AAPL".to_string(),
            timestamp: T1.to_string(),
            top_ask: ask.map(|p| PriceLevel::new(decimal(p))),
            top_bid: bid.map(|p| PriceLevel::new(decimal(p))),
        };
        let plan = plan_update(&[record], &HashSet::new(), Utc::now());

        assert_eq!(plan.batch.len(), 1);
        (plan.batch.top_ask_price[0], plan.batch.top_bid_price[0])
    }

    #[test]
    fn counts_each_defaulted_side() {
        let record = QuoteTick {
            stock: "AAPL".to_string(),
            timestamp: T1.to_string(),
            top_ask: None,
            top_bid: Some(PriceLevel { price: None }),
        };
        let plan = plan_update(&[record], &HashSet::new(), Utc::now());

        assert_eq!(plan.stats.defaulted_prices, 2);
    }

    #[test]
    fn unparseable_timestamp_is_repaired_not_rejected() {
        let now = Utc::now();
        let records = vec![tick("AAPL", "definitely not a date", "100", "99")];
        let plan = plan_update(&records, &HashSet::new(), now);

        assert_eq!(plan.batch.len(), 1);
        assert_eq!(plan.batch.timestamp, vec![now]);
        assert_eq!(plan.stats.repaired_timestamps, 1);
    }

    #[test]
    fn replay_of_admitted_plan_is_empty() {
        let records = vec![tick("AAPL", T1, "100", "99"), tick("MSFT", T2, "50", "49")];
        let mut seen = HashSet::new();

        let first = plan_update(&records, &seen, Utc::now());
        assert_eq!(first.batch.len(), 2);
        seen.extend(first.admitted);

        let second = plan_update(&records, &seen, Utc::now());
        assert!(second.is_empty());
        assert_eq!(second.stats.deduplicated, 2);
    }

    #[test]
    fn empty_input_produces_empty_plan() {
        let plan = plan_update(&[], &HashSet::new(), Utc::now());
        assert!(plan.is_empty());
        assert!(plan.admitted.is_empty());
        assert_eq!(plan.stats, MergeStats::default());
    }
}
