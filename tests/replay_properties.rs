use std::collections::BTreeMap;

use chrono::NaiveDate;
use proptest::prelude::*;

use l2_checkpoint::{
    Checkpoint, OrderBookUpdate, PartitionDriver, PartitionKey, ReplayConfig, Side, TimeAnchor,
};

fn partition() -> PartitionKey {
    PartitionKey::new(21, 7, NaiveDate::from_ymd_opt(2025, 1, 1).expect("date"))
}

/// Rows in canonical order: non-decreasing timestamps, `ingest_seq` and line equal to position.
fn arb_updates() -> impl Strategy<Value = Vec<OrderBookUpdate>> {
    prop::collection::vec((0i64..5, any::<bool>(), 95i64..105, 0i64..20), 1..80).prop_map(
        |rows| {
            let mut ts = 1_000;
            rows.into_iter()
                .enumerate()
                .map(|(idx, (delta, is_bid, price_int, size_int))| {
                    ts += delta;
                    OrderBookUpdate {
                        partition: partition(),
                        ts_local_us: ts,
                        ingest_seq: idx as i64 + 1,
                        file_id: 1,
                        file_line_number: idx as i64 + 1,
                        is_snapshot: false,
                        side: if is_bid { Side::Bid } else { Side::Ask },
                        price_int,
                        size_int,
                    }
                })
                .collect()
        },
    )
}

fn replay(updates: Vec<OrderBookUpdate>, config: ReplayConfig) -> Vec<Checkpoint> {
    PartitionDriver::new(partition(), config)
        .expect("valid config")
        .collect(updates)
        .expect("replay")
}

fn expected_time_checkpoints(ts: &[i64], every_us: i64, anchor: TimeAnchor) -> Vec<i64> {
    let align = |value: i64| match anchor {
        TimeAnchor::Grid => value.saturating_sub(value.rem_euclid(every_us)),
        TimeAnchor::FirstUpdate => value,
    };
    let mut last = align(ts[0]);
    let mut fired = Vec::new();
    for value in &ts[1..] {
        if value - last >= every_us {
            fired.push(*value);
            last = align(*value);
        }
    }
    fired
}

proptest! {
    #[test]
    fn prop_permutations_replay_identically(
        (rows, shuffled) in arb_updates().prop_flat_map(|rows| {
            (Just(rows.clone()), Just(rows).prop_shuffle())
        }),
        every_updates in 1u64..6,
        every_us in 1i64..10,
    ) {
        let config = ReplayConfig {
            checkpoint_every_updates: Some(every_updates),
            checkpoint_every_us: Some(every_us),
            emit_final_checkpoint: true,
            ..ReplayConfig::default()
        };
        prop_assert_eq!(replay(rows, config), replay(shuffled, config));
    }

    #[test]
    fn prop_count_cadence_fires_every_nth_update(
        rows in arb_updates(),
        every_updates in 1u64..10,
    ) {
        let config = ReplayConfig {
            checkpoint_every_updates: Some(every_updates),
            ..ReplayConfig::default()
        };
        let total = rows.len() as u64;
        let checkpoints = replay(rows, config);

        prop_assert_eq!(checkpoints.len() as u64, total / every_updates);
        for (idx, checkpoint) in checkpoints.iter().enumerate() {
            prop_assert_eq!(checkpoint.ingest_seq as u64, (idx as u64 + 1) * every_updates);
        }
    }

    #[test]
    fn prop_time_cadence_matches_elapsed_model(
        rows in arb_updates(),
        every_us in 1i64..12,
        grid in any::<bool>(),
    ) {
        let anchor = if grid { TimeAnchor::Grid } else { TimeAnchor::FirstUpdate };
        let config = ReplayConfig {
            checkpoint_every_us: Some(every_us),
            time_anchor: anchor,
            ..ReplayConfig::default()
        };
        let ts: Vec<i64> = rows.iter().map(|row| row.ts_local_us).collect();
        let checkpoints = replay(rows, config);

        let actual: Vec<i64> = checkpoints.iter().map(|c| c.ts_local_us).collect();
        prop_assert_eq!(actual, expected_time_checkpoints(&ts, every_us, anchor));
    }

    #[test]
    fn prop_checkpoints_are_sorted_and_match_book_model(
        rows in arb_updates(),
        every_updates in 1u64..4,
    ) {
        let config = ReplayConfig {
            checkpoint_every_updates: Some(every_updates),
            emit_final_checkpoint: true,
            ..ReplayConfig::default()
        };
        let checkpoints = replay(rows.clone(), config);

        let mut previous_ts = i64::MIN;
        for checkpoint in &checkpoints {
            prop_assert!(checkpoint.ts_local_us >= previous_ts);
            previous_ts = checkpoint.ts_local_us;
            prop_assert!(checkpoint.bids.windows(2).all(|w| w[0].price_int > w[1].price_int));
            prop_assert!(checkpoint.asks.windows(2).all(|w| w[0].price_int < w[1].price_int));
            prop_assert!(checkpoint.bids.iter().chain(&checkpoint.asks).all(|l| l.size_int > 0));
        }

        let mut bids = BTreeMap::new();
        let mut asks = BTreeMap::new();
        for row in &rows {
            let side = if row.side == Side::Bid { &mut bids } else { &mut asks };
            if row.size_int == 0 {
                side.remove(&row.price_int);
            } else {
                side.insert(row.price_int, row.size_int);
            }
        }
        let last = checkpoints.last().expect("final checkpoint");
        let last_bids: Vec<(i64, i64)> =
            last.bids.iter().map(|l| (l.price_int, l.size_int)).collect();
        let last_asks: Vec<(i64, i64)> =
            last.asks.iter().map(|l| (l.price_int, l.size_int)).collect();
        prop_assert_eq!(last_bids, bids.into_iter().rev().collect::<Vec<_>>());
        prop_assert_eq!(last_asks, asks.into_iter().collect::<Vec<_>>());
    }
}
