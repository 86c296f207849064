//! Batch Source Adapters
//!
//! Concrete [`BatchSource`](crate::application::ports::BatchSource)
//! implementations: an HTTP poller for a live quote endpoint and a fixture
//! replayer for simulated runs and tests. Both decode the same wire shape,
//! a JSON array of quote ticks.

use crate::application::ports::SourceError;
use crate::domain::quote::QuoteTick;

/// HTTP polling source.
pub mod http;

/// Fixture-file replay source.
pub mod fixture;

pub use fixture::FixtureSource;
pub use http::{HttpBatchSource, HttpSourceConfig};

/// Decode a JSON array payload into quote ticks.
///
/// Field-level problems (missing stock, non-numeric prices, odd timestamps)
/// survive decoding and are handled by the merge planner's repair rules;
/// only a structurally invalid payload fails here.
///
/// # Errors
///
/// Returns [`SourceError::Decode`] when the payload is not a JSON array of
/// objects.
pub fn decode_batch(payload: &str) -> Result<Vec<QuoteTick>, SourceError> {
    Ok(serde_json::from_str(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn decodes_a_well_formed_batch() {
        let payload = r#"[
            {"stock": "AAPL", "timestamp": "2024-03-15T14:30:00Z",
             "top_ask": {"price": 101.25}, "top_bid": {"price": 101.0}},
            {"stock": "MSFT", "timestamp": "2024-03-15T14:30:00.050Z",
             "top_ask": {"price": 55.0}, "top_bid": {"price": 54.5}}
        ]"#;
        let batch = decode_batch(payload).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].stock, "AAPL");
        assert_eq!(
            batch[1].top_bid.as_ref().unwrap().price,
            Some(Decimal::new(545, 1))
        );
    }

    #[test]
    fn decodes_the_empty_exhaustion_payload() {
        assert!(decode_batch("[]").unwrap().is_empty());
    }

    #[test]
    fn malformed_fields_survive_decoding_for_repair() {
        let payload = r#"[
            {"timestamp": 1710512345678, "top_ask": {"price": "oops"}},
            {"stock": "GOOG"}
        ]"#;
        let batch = decode_batch(payload).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch[0].stock.is_empty());
        assert_eq!(batch[0].top_ask.as_ref().unwrap().price, None);
        assert!(batch[1].timestamp.is_empty());
    }

    #[test]
    fn non_array_payload_is_a_decode_error() {
        let err = decode_batch(r#"{"stock": "AAPL"}"#).unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)));
    }
}
