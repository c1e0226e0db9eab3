use std::time::Instant;

use tracing::{debug, info, info_span};

use crate::book::{BookState, SnapshotReset};
use crate::config::ReplayConfig;
use crate::error::{ReplayError, Result};
use crate::materializer::{LevelMaterializer, SnapshotMaterializer};
use crate::ordering::{CanonicalOrdering, UpdateOrdering};
use crate::scheduler::{CadenceScheduler, CheckpointScheduler};
use crate::types::{Checkpoint, CheckpointKind, OrderBookUpdate, PartitionKey, StreamPos};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Initializing,
    Replaying,
    Finalizing,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub partition: PartitionKey,
    pub updates_applied: u64,
    pub checkpoints_emitted: u64,
    pub last_pos: Option<StreamPos>,
}

/// Replays one partition: orders its rows, applies them to a fresh book and emits checkpoints.
///
/// The driver owns its scheduler and materializer; nothing is shared across partitions.
pub struct PartitionDriver<
    O = CanonicalOrdering,
    S = CadenceScheduler,
    M = LevelMaterializer,
> {
    partition: PartitionKey,
    config: ReplayConfig,
    ordering: O,
    scheduler: S,
    materializer: M,
}

impl PartitionDriver {
    pub fn new(partition: PartitionKey, config: ReplayConfig) -> Result<Self> {
        Self::with_components(
            partition,
            config,
            CanonicalOrdering::from_config(&config),
            CadenceScheduler::from_config(&config),
            LevelMaterializer,
        )
    }
}

impl<O, S, M> PartitionDriver<O, S, M>
where
    O: UpdateOrdering,
    S: CheckpointScheduler,
    M: SnapshotMaterializer,
{
    pub fn with_components(
        partition: PartitionKey,
        config: ReplayConfig,
        ordering: O,
        scheduler: S,
        materializer: M,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            partition,
            config,
            ordering,
            scheduler,
            materializer,
        })
    }

    pub fn partition(&self) -> PartitionKey {
        self.partition
    }

    /// Orders `updates` and returns a pull-based checkpoint stream over them.
    pub fn checkpoints(self, updates: Vec<OrderBookUpdate>) -> Result<CheckpointStream<S, M>> {
        let t0 = Instant::now();
        let rows = updates.len();
        let ordered = self.ordering.order(updates)?;
        debug!(partition = %self.partition, rows, elapsed = ?t0.elapsed(), "ordered updates");

        Ok(CheckpointStream {
            partition: self.partition,
            emit_final_checkpoint: self.config.emit_final_checkpoint,
            book: BookState::default(),
            reset: SnapshotReset::new(self.config.snapshot_mode),
            scheduler: self.scheduler,
            materializer: self.materializer,
            updates: ordered.into_iter(),
            state: DriverState::Initializing,
            last_pos: None,
            last_emitted: false,
            updates_applied: 0,
            checkpoints_emitted: 0,
        })
    }

    /// Push-based replay: hands every checkpoint to `on_checkpoint` in emission order.
    pub fn run<F>(self, updates: Vec<OrderBookUpdate>, mut on_checkpoint: F) -> Result<ReplaySummary>
    where
        F: FnMut(Checkpoint) -> Result<()>,
    {
        let span = info_span!("replay_partition", partition = %self.partition);
        let _enter = span.enter();
        let t0 = Instant::now();

        let mut stream = self.checkpoints(updates)?;
        for checkpoint in stream.by_ref() {
            on_checkpoint(checkpoint?)?;
        }

        let summary = stream.summary();
        info!(
            updates = summary.updates_applied,
            checkpoints = summary.checkpoints_emitted,
            elapsed = ?t0.elapsed(),
            "partition replayed"
        );
        Ok(summary)
    }

    /// Replays the whole partition; any error discards every checkpoint produced so far.
    pub fn collect(self, updates: Vec<OrderBookUpdate>) -> Result<Vec<Checkpoint>> {
        let mut checkpoints = Vec::new();
        self.run(updates, |checkpoint| {
            checkpoints.push(checkpoint);
            Ok(())
        })?;
        Ok(checkpoints)
    }
}

/// Iterator over a partition's checkpoints. Yields at most one error, after which it is exhausted.
pub struct CheckpointStream<S = CadenceScheduler, M = LevelMaterializer> {
    partition: PartitionKey,
    emit_final_checkpoint: bool,
    book: BookState,
    reset: SnapshotReset,
    scheduler: S,
    materializer: M,
    updates: std::vec::IntoIter<OrderBookUpdate>,
    state: DriverState,
    last_pos: Option<StreamPos>,
    last_emitted: bool,
    updates_applied: u64,
    checkpoints_emitted: u64,
}

impl<S, M> CheckpointStream<S, M>
where
    S: CheckpointScheduler,
    M: SnapshotMaterializer,
{
    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn book(&self) -> &BookState {
        &self.book
    }

    pub fn summary(&self) -> ReplaySummary {
        ReplaySummary {
            partition: self.partition,
            updates_applied: self.updates_applied,
            checkpoints_emitted: self.checkpoints_emitted,
            last_pos: self.last_pos,
        }
    }

    fn emit(&mut self, pos: StreamPos, kind: CheckpointKind) -> Checkpoint {
        let checkpoint = self.materializer.render(&self.book, self.partition, pos, kind);
        self.checkpoints_emitted += 1;
        debug!(
            partition = %self.partition,
            ts_local_us = pos.ts_local_us,
            kind = kind.as_str(),
            bids = checkpoint.bids.len(),
            asks = checkpoint.asks.len(),
            "checkpoint"
        );
        checkpoint
    }
}

impl<S, M> Iterator for CheckpointStream<S, M>
where
    S: CheckpointScheduler,
    M: SnapshotMaterializer,
{
    type Item = Result<Checkpoint>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                DriverState::Initializing => {
                    self.book.reset();
                    self.scheduler.reset();
                    self.state = DriverState::Replaying;
                }
                DriverState::Replaying => {
                    let Some(update) = self.updates.next() else {
                        self.state = DriverState::Finalizing;
                        continue;
                    };

                    if update.partition != self.partition {
                        self.state = DriverState::Failed;
                        return Some(Err(ReplayError::PartitionIntegrity {
                            expected: self.partition,
                            found: update.partition,
                        }));
                    }

                    self.reset.apply(&mut self.book, &update);
                    self.updates_applied += 1;

                    let pos = update.pos();
                    self.last_pos = Some(pos);
                    self.last_emitted = self.scheduler.on_update(update.ts_local_us);
                    if self.last_emitted {
                        return Some(Ok(self.emit(pos, CheckpointKind::Periodic)));
                    }
                }
                DriverState::Finalizing => {
                    self.state = DriverState::Done;
                    if self.emit_final_checkpoint && !self.last_emitted {
                        if let Some(pos) = self.last_pos {
                            return Some(Ok(self.emit(pos, CheckpointKind::Final)));
                        }
                    }
                }
                DriverState::Done | DriverState::Failed => return None,
            }
        }
    }
}
