use crate::error::{ReplayError, Result};

/// How `is_snapshot` rows interact with the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotMode {
    /// Snapshot rows are ordinary upserts/deletes.
    #[default]
    Upsert,
    /// The first row of each snapshot burst clears both sides before it is applied.
    ResetOnSnapshotBurst,
}

/// Anchoring of the time cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeAnchor {
    /// Anchor and advances are floored to a multiple of `checkpoint_every_us`, so a checkpoint
    /// fires on the first update landing in a later cadence bucket than the previous one.
    #[default]
    Grid,
    /// Anchor is the first update's raw timestamp and advances to each emitting update's timestamp.
    FirstUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayConfig {
    pub checkpoint_every_us: Option<i64>,
    pub checkpoint_every_updates: Option<u64>,
    pub validate_monotonic: bool,
    /// Skip the canonical sort; the caller guarantees the rows are already ordered.
    pub assume_sorted: bool,
    /// Emit one trailing checkpoint after the last update unless that update already emitted one.
    pub emit_final_checkpoint: bool,
    pub snapshot_mode: SnapshotMode,
    pub time_anchor: TimeAnchor,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            checkpoint_every_us: None,
            checkpoint_every_updates: None,
            validate_monotonic: false,
            assume_sorted: false,
            emit_final_checkpoint: false,
            snapshot_mode: SnapshotMode::Upsert,
            time_anchor: TimeAnchor::Grid,
        }
    }
}

impl ReplayConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(every_us) = self.checkpoint_every_us {
            if every_us <= 0 {
                return Err(ReplayError::InvalidConfiguration(format!(
                    "checkpoint_every_us must be > 0, got {}",
                    every_us
                )));
            }
        }
        if self.checkpoint_every_updates == Some(0) {
            return Err(ReplayError::InvalidConfiguration(
                "checkpoint_every_updates must be > 0, got 0".to_string(),
            ));
        }
        if self.checkpoint_every_us.is_none()
            && self.checkpoint_every_updates.is_none()
            && !self.emit_final_checkpoint
        {
            return Err(ReplayError::InvalidConfiguration(
                "set checkpoint_every_us, checkpoint_every_updates or emit_final_checkpoint"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Sizing of the multi-partition worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    pub max_concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(ReplayError::InvalidConfiguration(
                "max_concurrency must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
