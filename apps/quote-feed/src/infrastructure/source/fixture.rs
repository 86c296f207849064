//! Fixture Replay Source
//!
//! Replays a recorded JSON tick array in fixed-size chunks, then signals
//! exhaustion. Drives simulated runs and the integration tests.

use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::decode_batch;
use crate::application::ports::{BatchSource, SourceError};
use crate::domain::quote::QuoteTick;

/// [`BatchSource`] replaying a fixed sequence of batches.
#[derive(Debug)]
pub struct FixtureSource {
    chunks: Mutex<VecDeque<Vec<QuoteTick>>>,
}

impl FixtureSource {
    /// Split `ticks` into batches of `chunk_size` (minimum 1), preserving
    /// order.
    #[must_use]
    pub fn from_ticks(ticks: Vec<QuoteTick>, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        let chunks = ticks
            .chunks(chunk_size)
            .map(<[QuoteTick]>::to_vec)
            .collect();
        Self {
            chunks: Mutex::new(chunks),
        }
    }

    /// Load a JSON tick array from `path` and replay it in chunks.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Transport`] when the file cannot be read and
    /// [`SourceError::Decode`] when it is not a valid tick array.
    pub fn from_file(path: &Path, chunk_size: usize) -> Result<Self, SourceError> {
        let payload = std::fs::read_to_string(path).map_err(|e| {
            SourceError::Transport(format!("failed to read fixture {}: {e}", path.display()))
        })?;
        Ok(Self::from_ticks(decode_batch(&payload)?, chunk_size))
    }

    /// Batches not yet served.
    #[must_use]
    pub fn remaining_batches(&self) -> usize {
        self.chunks.lock().len()
    }
}

#[async_trait]
impl BatchSource for FixtureSource {
    async fn fetch_batch(&self) -> Result<Vec<QuoteTick>, SourceError> {
        Ok(self.chunks.lock().pop_front().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::io::Write;

    fn tick(stock: &str) -> QuoteTick {
        QuoteTick::new(
            stock,
            "2024-03-15T14:30:00Z",
            Decimal::new(101, 0),
            Decimal::new(100, 0),
        )
    }

    #[tokio::test]
    async fn serves_chunks_then_exhausts() {
        let source = FixtureSource::from_ticks(
            vec![tick("A"), tick("B"), tick("C"), tick("D"), tick("E")],
            2,
        );
        assert_eq!(source.remaining_batches(), 3);

        assert_eq!(source.fetch_batch().await.unwrap().len(), 2);
        assert_eq!(source.fetch_batch().await.unwrap().len(), 2);
        assert_eq!(source.fetch_batch().await.unwrap().len(), 1);

        // Exhaustion sentinel, repeatedly.
        assert!(source.fetch_batch().await.unwrap().is_empty());
        assert!(source.fetch_batch().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_chunk_size_is_clamped() {
        let source = FixtureSource::from_ticks(vec![tick("A")], 0);
        assert_eq!(source.fetch_batch().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn loads_a_fixture_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"stock": "AAPL", "timestamp": "2024-03-15T14:30:00Z",
                 "top_ask": {{"price": 101.0}}, "top_bid": {{"price": 100.0}}}}]"#
        )
        .unwrap();

        let source = FixtureSource::from_file(file.path(), 10).unwrap();
        let batch = source.fetch_batch().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].stock, "AAPL");
    }

    #[test]
    fn missing_file_is_a_transport_error() {
        let err = FixtureSource::from_file(Path::new("/nonexistent/fixture.json"), 10).unwrap_err();
        assert!(matches!(err, SourceError::Transport(_)));
    }
}
