use arrow::error::ArrowError;
use thiserror::Error;

use crate::types::{CanonicalKey, PartitionKey};

/// Errors raised while decoding or replaying a partition.
///
/// Every variant is scoped to the partition being processed; sibling partitions are unaffected.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// A required column is missing, mistyped, null, or holds a value outside its domain.
    #[error("schema error: {0}")]
    Schema(String),

    /// Canonical order is violated after sorting, which indicates corrupted ingestion.
    #[error("non-monotonic input at row {index}: {current:?} does not follow {previous:?}")]
    NonMonotonicInput {
        index: usize,
        previous: CanonicalKey,
        current: CanonicalKey,
    },

    /// A row belongs to a different partition than the one being replayed.
    #[error("partition integrity violated: replaying {expected}, row carries {found}")]
    PartitionIntegrity {
        expected: PartitionKey,
        found: PartitionKey,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// The worker running a partition panicked or was cancelled.
    #[error("worker for partition {partition} failed: {reason}")]
    WorkerFailed {
        partition: PartitionKey,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, ReplayError>;
