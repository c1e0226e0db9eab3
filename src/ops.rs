use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::book::{BookState, SnapshotReset};
use crate::config::{ReplayConfig, WorkerConfig};
use crate::error::{ReplayError, Result};
use crate::materializer::book_levels;
use crate::ordering::{CanonicalOrdering, UpdateOrdering};
use crate::replay::PartitionDriver;
use crate::types::{Checkpoint, OrderBookUpdate, PartitionKey, Snapshot};

#[derive(Debug)]
pub struct PartitionOutcome {
    pub partition: PartitionKey,
    pub result: Result<Vec<Checkpoint>>,
}

pub fn replay_partition(
    partition: PartitionKey,
    updates: Vec<OrderBookUpdate>,
    config: ReplayConfig,
) -> Result<Vec<Checkpoint>> {
    PartitionDriver::new(partition, config)?.collect(updates)
}

pub fn group_by_partition(
    updates: Vec<OrderBookUpdate>,
) -> BTreeMap<PartitionKey, Vec<OrderBookUpdate>> {
    let mut groups: BTreeMap<PartitionKey, Vec<OrderBookUpdate>> = BTreeMap::new();
    for update in updates {
        groups.entry(update.partition).or_default().push(update);
    }
    groups
}

fn worker_failed(partition: PartitionKey, err: impl Display) -> ReplayError {
    ReplayError::WorkerFailed {
        partition,
        reason: err.to_string(),
    }
}

/// Replays every partition present in `updates` on blocking workers, at most
/// `workers.max_concurrency` at a time.
///
/// Configuration errors fail the call up front. After that each partition succeeds or fails on its
/// own; outcomes are returned in partition key order.
pub async fn replay_partitions(
    updates: Vec<OrderBookUpdate>,
    config: ReplayConfig,
    workers: WorkerConfig,
) -> Result<Vec<PartitionOutcome>> {
    config.validate()?;
    workers.validate()?;

    let t0 = Instant::now();
    let semaphore = Arc::new(Semaphore::new(workers.max_concurrency));
    let mut handles: Vec<(PartitionKey, JoinHandle<Result<Vec<Checkpoint>>>)> = Vec::new();

    for (partition, rows) in group_by_partition(updates) {
        let semaphore = Arc::clone(&semaphore);
        let handle = tokio::spawn(async move {
            let permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(err) => return Err(worker_failed(partition, err)),
            };
            let replayed = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                replay_partition(partition, rows, config)
            })
            .await;
            match replayed {
                Ok(result) => result,
                Err(err) => Err(worker_failed(partition, err)),
            }
        });
        handles.push((partition, handle));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    let mut failed = 0usize;
    for (partition, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(err) => Err(worker_failed(partition, err)),
        };
        if let Err(err) = &result {
            failed += 1;
            warn!(%partition, error = %err, "partition replay failed");
        }
        outcomes.push(PartitionOutcome { partition, result });
    }

    info!(
        partitions = outcomes.len(),
        failed,
        elapsed = ?t0.elapsed(),
        "replayed partitions"
    );
    Ok(outcomes)
}

/// Book of `partition` as of `ts_local_us`.
///
/// Starts from `seed` when given and applies only the updates strictly after the seed's stream
/// position and at or before `ts_local_us`.
pub fn snapshot_at(
    partition: PartitionKey,
    seed: Option<&Checkpoint>,
    updates: Vec<OrderBookUpdate>,
    ts_local_us: i64,
    config: &ReplayConfig,
) -> Result<Snapshot> {
    let mut book = BookState::default();
    let mut reset = SnapshotReset::new(config.snapshot_mode);
    let mut after = None;
    if let Some(seed) = seed {
        if seed.partition != partition {
            return Err(ReplayError::PartitionIntegrity {
                expected: partition,
                found: seed.partition,
            });
        }
        if seed.ts_local_us > ts_local_us {
            return Err(ReplayError::InvalidConfiguration(format!(
                "seed checkpoint at {} is after requested ts {}",
                seed.ts_local_us, ts_local_us
            )));
        }
        book = BookState::from_checkpoint(seed);
        reset.resume_from(seed);
        after = Some(seed.pos().canonical_key());
    }

    let ordered = CanonicalOrdering::from_config(config).order(updates)?;
    for update in ordered {
        if update.partition != partition {
            return Err(ReplayError::PartitionIntegrity {
                expected: partition,
                found: update.partition,
            });
        }
        if update.ts_local_us > ts_local_us {
            continue;
        }
        // Rows already folded into the seed still decide where the current burst started.
        if after.is_some_and(|key| update.canonical_key() <= key) {
            reset.observe(&update);
            continue;
        }
        reset.apply(&mut book, &update);
    }

    let (bids, asks) = book_levels(&book);
    Ok(Snapshot {
        partition,
        ts_local_us,
        bids,
        asks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SnapshotMode;
    use crate::test_support::{partition, update};
    use crate::types::{PriceLevel, Side};

    fn updates() -> Vec<OrderBookUpdate> {
        vec![
            update(1, 1, 1, true, Side::Bid, 100, 10),
            update(1, 2, 2, true, Side::Ask, 101, 5),
            update(2, 3, 3, false, Side::Bid, 100, 0),
            update(3, 4, 4, false, Side::Ask, 102, 3),
            update(4, 5, 5, false, Side::Bid, 99, 7),
        ]
    }

    #[test]
    fn snapshot_at_replays_up_to_ts() {
        let snapshot =
            snapshot_at(partition(), None, updates(), 3, &ReplayConfig::default()).unwrap();

        assert_eq!(snapshot.ts_local_us, 3);
        assert!(snapshot.bids.is_empty());
        assert_eq!(
            snapshot.asks,
            vec![PriceLevel::from((101, 5)), PriceLevel::from((102, 3))]
        );
    }

    #[test]
    fn snapshot_at_resumes_from_seed_checkpoint() {
        let config = ReplayConfig {
            checkpoint_every_updates: Some(2),
            ..ReplayConfig::default()
        };
        let checkpoints = replay_partition(partition(), updates(), config).unwrap();
        let seed = &checkpoints[0];

        // Rows at or before the seed position are already folded into the seed.
        let tail: Vec<_> = updates().into_iter().skip(1).collect();
        let from_seed = snapshot_at(partition(), Some(seed), tail, 4, &config).unwrap();
        let from_scratch = snapshot_at(partition(), None, updates(), 4, &config).unwrap();

        assert_eq!(from_seed, from_scratch);
    }

    #[test]
    fn snapshot_at_resumes_inside_snapshot_burst() {
        let config = ReplayConfig {
            checkpoint_every_updates: Some(1),
            snapshot_mode: SnapshotMode::ResetOnSnapshotBurst,
            ..ReplayConfig::default()
        };
        let rows = vec![
            update(1, 1, 1, true, Side::Bid, 100, 10),
            update(1, 2, 2, true, Side::Ask, 101, 5),
            update(2, 3, 3, false, Side::Bid, 99, 7),
        ];
        let checkpoints = replay_partition(partition(), rows.clone(), config).unwrap();
        let seed = &checkpoints[0];

        let from_scratch = snapshot_at(partition(), None, rows.clone(), 2, &config).unwrap();
        assert_eq!(
            from_scratch.bids,
            vec![PriceLevel::from((100, 10)), PriceLevel::from((99, 7))]
        );
        assert_eq!(from_scratch.asks, vec![PriceLevel::from((101, 5))]);

        let from_seed = snapshot_at(partition(), Some(seed), rows.clone(), 2, &config).unwrap();
        assert_eq!(from_seed, from_scratch);

        let tail: Vec<_> = rows.into_iter().skip(1).collect();
        let from_seed_tail = snapshot_at(partition(), Some(seed), tail, 2, &config).unwrap();
        assert_eq!(from_seed_tail, from_scratch);
    }

    #[test]
    fn snapshot_at_rejects_seed_from_other_partition() {
        let config = ReplayConfig {
            emit_final_checkpoint: true,
            ..ReplayConfig::default()
        };
        let mut seed = replay_partition(partition(), updates(), config).unwrap()[0].clone();
        seed.partition.symbol_id = 99;

        assert!(matches!(
            snapshot_at(partition(), Some(&seed), Vec::new(), 10, &config),
            Err(ReplayError::PartitionIntegrity { .. })
        ));
    }

    #[test]
    fn group_by_partition_splits_rows() {
        let mut other = update(1, 1, 1, false, Side::Bid, 100, 1);
        other.partition.symbol_id = 2;
        let mut rows = updates();
        rows.push(other);

        let groups = group_by_partition(rows);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&partition()].len(), 5);
        assert_eq!(groups[&other.partition].len(), 1);
    }
}
