use std::collections::BTreeMap;

use crate::config::SnapshotMode;
use crate::types::{Checkpoint, OrderBookUpdate, Side};

/// Price-level book for one partition: `price_int -> size_int` per side.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BookState {
    pub bids: BTreeMap<i64, i64>,
    pub asks: BTreeMap<i64, i64>,
}

impl BookState {
    pub fn from_checkpoint(checkpoint: &Checkpoint) -> Self {
        Self {
            bids: checkpoint
                .bids
                .iter()
                .map(|level| (level.price_int, level.size_int))
                .collect(),
            asks: checkpoint
                .asks
                .iter()
                .map(|level| (level.price_int, level.size_int))
                .collect(),
        }
    }

    pub fn reset(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Overwrites the level with `size_int`, or removes it when `size_int == 0`.
    pub fn apply_update(&mut self, update: &OrderBookUpdate) {
        let side_map = match update.side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };

        if update.size_int == 0 {
            side_map.remove(&update.price_int);
        } else {
            side_map.insert(update.price_int, update.size_int);
        }
    }
}

/// Applies updates under a [`SnapshotMode`].
///
/// With `ResetOnSnapshotBurst`, a burst is a run of snapshot rows sharing
/// `(ts_local_us, file_id)`; the book is cleared before the first row of each burst.
#[derive(Debug, Default)]
pub struct SnapshotReset {
    mode: SnapshotMode,
    snapshot_key: Option<(i64, i64)>,
}

impl SnapshotReset {
    pub fn new(mode: SnapshotMode) -> Self {
        Self {
            mode,
            snapshot_key: None,
        }
    }

    /// Treats `checkpoint` as lying inside the burst keyed by its `(ts_local_us, file_id)`, so a
    /// replay resumed from it does not clear the levels it carries.
    pub fn resume_from(&mut self, checkpoint: &Checkpoint) {
        if self.mode == SnapshotMode::ResetOnSnapshotBurst {
            self.snapshot_key = Some((checkpoint.ts_local_us, checkpoint.file_id));
        }
    }

    /// Tracks burst boundaries without touching a book. Returns true when `update` opens a new
    /// burst.
    pub fn observe(&mut self, update: &OrderBookUpdate) -> bool {
        if self.mode != SnapshotMode::ResetOnSnapshotBurst {
            return false;
        }
        if !update.is_snapshot {
            self.snapshot_key = None;
            return false;
        }
        let key = (update.ts_local_us, update.file_id);
        let opens_burst = self.snapshot_key != Some(key);
        self.snapshot_key = Some(key);
        opens_burst
    }

    pub fn apply(&mut self, book: &mut BookState, update: &OrderBookUpdate) {
        if self.observe(update) {
            book.reset();
        }
        book.apply_update(update);
    }
}
