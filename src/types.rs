use std::fmt;

use chrono::NaiveDate;

use crate::error::Result;
use crate::utils::ts_to_date;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Side {
    Bid = 0,
    Ask = 1,
}

impl TryFrom<u8> for Side {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Side::Bid),
            1 => Ok(Side::Ask),
            other => Err(other),
        }
    }
}

/// The unit of independent replay: one exchange, one symbol, one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    pub exchange_id: i32,
    pub symbol_id: i64,
    pub date: NaiveDate,
}

impl PartitionKey {
    pub fn new(exchange_id: i32, symbol_id: i64, date: NaiveDate) -> Self {
        Self {
            exchange_id,
            symbol_id,
            date,
        }
    }

    /// Partition of the UTC date containing `ts_local_us`.
    pub fn for_ts(exchange_id: i32, symbol_id: i64, ts_local_us: i64) -> Result<Self> {
        Ok(Self::new(exchange_id, symbol_id, ts_to_date(ts_local_us)?))
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "exchange_id={}/symbol_id={}/date={}",
            self.exchange_id, self.symbol_id, self.date
        )
    }
}

/// Sort key used to linearize updates: `(ts_local_us, ingest_seq, file_line_number)`.
pub type CanonicalKey = (i64, i64, i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBookUpdate {
    pub partition: PartitionKey,
    pub ts_local_us: i64,
    pub ingest_seq: i64,
    pub file_id: i64,
    pub file_line_number: i64,
    pub is_snapshot: bool,
    pub side: Side,
    pub price_int: i64,
    pub size_int: i64, // 0 = remove level
}

impl OrderBookUpdate {
    pub fn canonical_key(&self) -> CanonicalKey {
        (self.ts_local_us, self.ingest_seq, self.file_line_number)
    }

    pub fn pos(&self) -> StreamPos {
        StreamPos {
            ts_local_us: self.ts_local_us,
            ingest_seq: self.ingest_seq,
            file_id: self.file_id,
            file_line_number: self.file_line_number,
        }
    }
}

/// Position of an update in the ingestion stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamPos {
    pub ts_local_us: i64,
    pub ingest_seq: i64,
    pub file_id: i64,
    pub file_line_number: i64,
}

impl StreamPos {
    pub fn canonical_key(&self) -> CanonicalKey {
        (self.ts_local_us, self.ingest_seq, self.file_line_number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PriceLevel {
    pub price_int: i64,
    pub size_int: i64,
}

impl From<(i64, i64)> for PriceLevel {
    fn from((price_int, size_int): (i64, i64)) -> Self {
        Self {
            price_int,
            size_int,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckpointKind {
    Periodic,
    Final,
}

impl CheckpointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointKind::Periodic => "periodic",
            CheckpointKind::Final => "final",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "periodic" => Some(CheckpointKind::Periodic),
            "final" => Some(CheckpointKind::Final),
            _ => None,
        }
    }
}

/// Fully materialized book emitted by a partition replay.
///
/// `bids` are strictly descending and `asks` strictly ascending by `price_int`. The stream position
/// fields identify the update that triggered the checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub partition: PartitionKey,
    pub ts_local_us: i64,
    pub ingest_seq: i64,
    pub file_id: i64,
    pub file_line_number: i64,
    pub kind: CheckpointKind,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

impl Checkpoint {
    pub fn pos(&self) -> StreamPos {
        StreamPos {
            ts_local_us: self.ts_local_us,
            ingest_seq: self.ingest_seq,
            file_id: self.file_id,
            file_line_number: self.file_line_number,
        }
    }
}

/// Book rendered at an arbitrary point in time rather than at a triggering update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub partition: PartitionKey,
    pub ts_local_us: i64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}
