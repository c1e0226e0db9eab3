use crate::book::BookState;
use crate::types::{Checkpoint, CheckpointKind, PartitionKey, PriceLevel, StreamPos};

/// Renders the current book into a checkpoint row.
pub trait SnapshotMaterializer {
    fn render(
        &self,
        book: &BookState,
        partition: PartitionKey,
        pos: StreamPos,
        kind: CheckpointKind,
    ) -> Checkpoint;
}

/// Bids best-first (descending), asks best-first (ascending).
#[derive(Debug, Clone, Copy, Default)]
pub struct LevelMaterializer;

impl SnapshotMaterializer for LevelMaterializer {
    fn render(
        &self,
        book: &BookState,
        partition: PartitionKey,
        pos: StreamPos,
        kind: CheckpointKind,
    ) -> Checkpoint {
        let (bids, asks) = book_levels(book);
        Checkpoint {
            partition,
            ts_local_us: pos.ts_local_us,
            ingest_seq: pos.ingest_seq,
            file_id: pos.file_id,
            file_line_number: pos.file_line_number,
            kind,
            bids,
            asks,
        }
    }
}

pub fn book_levels(book: &BookState) -> (Vec<PriceLevel>, Vec<PriceLevel>) {
    let bids = book
        .bids
        .iter()
        .rev()
        .map(|(price, size)| PriceLevel::from((*price, *size)))
        .collect();
    let asks = book
        .asks
        .iter()
        .map(|(price, size)| PriceLevel::from((*price, *size)))
        .collect();
    (bids, asks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{partition, update};
    use crate::types::Side;

    #[test]
    fn render_orders_sides_and_stamps_trigger() {
        let mut book = BookState::default();
        for (side, price, size) in [
            (Side::Bid, 99, 1),
            (Side::Bid, 101, 2),
            (Side::Bid, 100, 3),
            (Side::Ask, 105, 4),
            (Side::Ask, 103, 5),
        ] {
            book.apply_update(&update(1, 1, 1, false, side, price, size));
        }
        let trigger = update(42, 7, 9, false, Side::Ask, 103, 5);

        let checkpoint =
            LevelMaterializer.render(&book, partition(), trigger.pos(), CheckpointKind::Periodic);

        let bid_prices: Vec<_> = checkpoint.bids.iter().map(|l| l.price_int).collect();
        let ask_prices: Vec<_> = checkpoint.asks.iter().map(|l| l.price_int).collect();
        assert_eq!(bid_prices, vec![101, 100, 99]);
        assert_eq!(ask_prices, vec![103, 105]);
        assert_eq!(checkpoint.ts_local_us, 42);
        assert_eq!(checkpoint.pos(), trigger.pos());
        assert_eq!(checkpoint.partition, partition());
    }

    #[test]
    fn render_does_not_mutate_book() {
        let mut book = BookState::default();
        book.apply_update(&update(1, 1, 1, false, Side::Bid, 100, 3));
        let before = book.clone();

        let _ = LevelMaterializer.render(
            &book,
            partition(),
            update(1, 1, 1, false, Side::Bid, 100, 3).pos(),
            CheckpointKind::Final,
        );
        assert_eq!(book, before);
    }
}
