//! Order-book replay and checkpoint engine.
//!
//! Rebuilds a price-level book from a partition's L2 update rows and emits fully materialized
//! checkpoints on a count and/or time cadence. Replay of one partition is sequential; distinct
//! partitions are independent and can be replayed concurrently with [`ops::replay_partitions`].

pub mod arrow_utils;
pub mod book;
pub mod config;
pub mod error;
pub mod io;
pub mod materializer;
pub mod ops;
pub mod ordering;
pub mod replay;
pub mod scheduler;
pub mod types;
pub mod utils;

pub use book::{BookState, SnapshotReset};
pub use config::{ReplayConfig, SnapshotMode, TimeAnchor, WorkerConfig};
pub use error::{ReplayError, Result};
pub use materializer::{LevelMaterializer, SnapshotMaterializer};
pub use ops::{replay_partition, replay_partitions, snapshot_at, PartitionOutcome};
pub use ordering::{CanonicalOrdering, UpdateOrdering};
pub use replay::{CheckpointStream, DriverState, PartitionDriver, ReplaySummary};
pub use scheduler::{CadenceScheduler, CheckpointScheduler};
pub use types::{
    Checkpoint, CheckpointKind, OrderBookUpdate, PartitionKey, PriceLevel, Side, Snapshot,
    StreamPos,
};
