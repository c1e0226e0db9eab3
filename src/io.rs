use std::time::Instant;

use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use futures::{Stream, StreamExt};
use tracing::debug;

use crate::arrow_utils::{update_columns, update_from_columns};
use crate::config::ReplayConfig;
use crate::error::Result;
use crate::replay::PartitionDriver;
use crate::types::{Checkpoint, OrderBookUpdate, PartitionKey};

/// Decodes each batch of `stream` and hands the rows to `f` in arrival order.
pub async fn for_each_update<S, F>(mut stream: S, mut f: F) -> Result<()>
where
    S: Stream<Item = std::result::Result<RecordBatch, ArrowError>> + Unpin,
    F: FnMut(OrderBookUpdate) -> Result<()>,
{
    let t0 = Instant::now();
    let mut batches: u64 = 0;
    let mut rows: u64 = 0;
    while let Some(batch) = stream.next().await {
        let batch = batch?;
        let cols = update_columns(&batch)?;
        for row in 0..batch.num_rows() {
            f(update_from_columns(&cols, row)?)?;
        }
        batches = batches.saturating_add(1);
        rows = rows.saturating_add(batch.num_rows() as u64);
    }
    debug!(batches, rows, elapsed = ?t0.elapsed(), "decoded update stream");
    Ok(())
}

pub async fn collect_updates<S>(stream: S) -> Result<Vec<OrderBookUpdate>>
where
    S: Stream<Item = std::result::Result<RecordBatch, ArrowError>> + Unpin,
{
    let mut updates = Vec::new();
    for_each_update(stream, |update| {
        updates.push(update);
        Ok(())
    })
    .await?;
    Ok(updates)
}

/// Drains a single partition's batch stream, then replays it.
///
/// The canonical sort needs the whole partition, so rows are buffered before replay starts.
pub async fn replay_stream<S>(
    partition: PartitionKey,
    stream: S,
    config: ReplayConfig,
) -> Result<Vec<Checkpoint>>
where
    S: Stream<Item = std::result::Result<RecordBatch, ArrowError>> + Unpin,
{
    let driver = PartitionDriver::new(partition, config)?;
    let updates = collect_updates(stream).await?;
    driver.collect(updates)
}
