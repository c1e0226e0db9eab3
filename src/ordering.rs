use std::cmp::Ordering;

use crate::config::ReplayConfig;
use crate::error::{ReplayError, Result};
use crate::types::OrderBookUpdate;

/// Linearizes a partition's rows before they reach the book.
pub trait UpdateOrdering {
    fn order(&self, updates: Vec<OrderBookUpdate>) -> Result<Vec<OrderBookUpdate>>;
}

/// Sorts by `(ts_local_us, ingest_seq, file_line_number)` and optionally rejects rows that break
/// that order.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalOrdering {
    pub assume_sorted: bool,
    pub validate_monotonic: bool,
}

impl CanonicalOrdering {
    pub fn from_config(config: &ReplayConfig) -> Self {
        Self {
            assume_sorted: config.assume_sorted,
            validate_monotonic: config.validate_monotonic,
        }
    }
}

impl UpdateOrdering for CanonicalOrdering {
    fn order(&self, mut updates: Vec<OrderBookUpdate>) -> Result<Vec<OrderBookUpdate>> {
        if !self.assume_sorted {
            updates.sort_by(canonical_cmp);
        }
        if self.validate_monotonic {
            validate_monotonic(&updates)?;
        }
        Ok(updates)
    }
}

/// Canonical key first, then every remaining field so that rows sharing a key still land in the
/// same order whatever order they arrived in.
pub fn canonical_cmp(a: &OrderBookUpdate, b: &OrderBookUpdate) -> Ordering {
    a.canonical_key()
        .cmp(&b.canonical_key())
        .then_with(|| a.file_id.cmp(&b.file_id))
        .then_with(|| a.partition.cmp(&b.partition))
        .then_with(|| a.is_snapshot.cmp(&b.is_snapshot))
        .then_with(|| a.side.cmp(&b.side))
        .then_with(|| a.price_int.cmp(&b.price_int))
        .then_with(|| a.size_int.cmp(&b.size_int))
}

/// Requires the canonical key to be strictly increasing. An equal key means the same source line
/// was ingested twice under one sequence number.
pub fn validate_monotonic(updates: &[OrderBookUpdate]) -> Result<()> {
    for (index, pair) in updates.windows(2).enumerate() {
        let previous = pair[0].canonical_key();
        let current = pair[1].canonical_key();
        if current <= previous {
            return Err(ReplayError::NonMonotonicInput {
                index: index + 1,
                previous,
                current,
            });
        }
    }
    Ok(())
}
