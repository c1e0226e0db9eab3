use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Date32Builder, Int32Array, Int32Builder,
    Int64Array, Int64Builder, Int8Array, LargeListArray, ListArray, ListBuilder, StringArray,
    StringBuilder, StructArray, StructBuilder, UInt8Array,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Fields, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;

use crate::error::{ReplayError, Result};
use crate::types::{Checkpoint, CheckpointKind, OrderBookUpdate, PartitionKey, PriceLevel, Side};
use crate::utils::{date_to_days, days_to_date};

/// Input row schema in its canonical (widest) types.
pub fn update_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("exchange_id", DataType::Int32, false),
        Field::new("symbol_id", DataType::Int64, false),
        Field::new("date", DataType::Date32, false),
        Field::new("ts_local_us", DataType::Int64, false),
        Field::new("ingest_seq", DataType::Int64, false),
        Field::new("file_id", DataType::Int64, false),
        Field::new("file_line_number", DataType::Int64, false),
        Field::new("is_snapshot", DataType::Boolean, false),
        Field::new("side", DataType::UInt8, false),
        Field::new("price_int", DataType::Int64, false),
        Field::new("size_int", DataType::Int64, false),
    ]))
}

fn level_fields() -> Fields {
    Fields::from(vec![
        Field::new("price_int", DataType::Int64, false),
        Field::new("size_int", DataType::Int64, false),
    ])
}

pub fn checkpoint_schema() -> SchemaRef {
    let level_struct = DataType::Struct(level_fields());
    let list_field = Arc::new(Field::new("item", level_struct, true));

    Arc::new(Schema::new(vec![
        Field::new("exchange_id", DataType::Int32, false),
        Field::new("symbol_id", DataType::Int64, false),
        Field::new("date", DataType::Date32, false),
        Field::new("ts_local_us", DataType::Int64, false),
        Field::new("bids", DataType::List(list_field.clone()), true),
        Field::new("asks", DataType::List(list_field), true),
        Field::new("file_id", DataType::Int64, false),
        Field::new("ingest_seq", DataType::Int64, false),
        Field::new("file_line_number", DataType::Int64, false),
        Field::new("checkpoint_kind", DataType::Utf8, false),
    ]))
}

fn schema_error(message: String) -> ReplayError {
    ReplayError::Schema(message)
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    let idx = batch
        .schema()
        .index_of(name)
        .map_err(|_| schema_error(format!("missing column {}", name)))?;
    let array = batch.column(idx);
    if array.null_count() > 0 {
        return Err(schema_error(format!(
            "column {} has {} null values",
            name,
            array.null_count()
        )));
    }
    Ok(array)
}

fn signed_width(data_type: &DataType) -> Option<u8> {
    match data_type {
        DataType::Int8 => Some(8),
        DataType::Int16 => Some(16),
        DataType::Int32 => Some(32),
        DataType::Int64 => Some(64),
        _ => None,
    }
}

/// Casts a signed integer column to `target` when that is a lossless widening.
fn widen(array: &ArrayRef, name: &str, target: &DataType) -> Result<ArrayRef> {
    match (signed_width(array.data_type()), signed_width(target)) {
        (Some(from), Some(to)) if from <= to => Ok(cast(array.as_ref(), target)?),
        _ => Err(schema_error(format!(
            "column {} has unexpected type {:?}, expected {:?}",
            name,
            array.data_type(),
            target
        ))),
    }
}

fn downcast<T: Array + Clone + 'static>(array: &ArrayRef, name: &str) -> Result<T> {
    array
        .as_any()
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| {
            schema_error(format!(
                "column {} has unexpected type {:?}",
                name,
                array.data_type()
            ))
        })
}

fn i64_column(batch: &RecordBatch, name: &str) -> Result<Int64Array> {
    let array = widen(column(batch, name)?, name, &DataType::Int64)?;
    downcast(&array, name)
}

fn i32_column(batch: &RecordBatch, name: &str) -> Result<Int32Array> {
    let array = widen(column(batch, name)?, name, &DataType::Int32)?;
    downcast(&array, name)
}

fn get_side(array: &ArrayRef, row: usize) -> Result<Side> {
    let raw = if let Some(values) = array.as_any().downcast_ref::<UInt8Array>() {
        i16::from(values.value(row))
    } else if let Some(values) = array.as_any().downcast_ref::<Int8Array>() {
        i16::from(values.value(row))
    } else {
        return Err(schema_error(format!(
            "column side has unexpected type {:?}",
            array.data_type()
        )));
    };

    u8::try_from(raw)
        .ok()
        .and_then(|value| Side::try_from(value).ok())
        .ok_or_else(|| schema_error(format!("column side has invalid value {} at row {}", raw, row)))
}

pub struct UpdateColumns {
    exchange_id: Int32Array,
    symbol_id: Int64Array,
    date: Date32Array,
    ts_local_us: Int64Array,
    ingest_seq: Int64Array,
    file_id: Int64Array,
    file_line_number: Int64Array,
    is_snapshot: BooleanArray,
    side: ArrayRef,
    price_int: Int64Array,
    size_int: Int64Array,
}

pub fn update_columns(batch: &RecordBatch) -> Result<UpdateColumns> {
    Ok(UpdateColumns {
        exchange_id: i32_column(batch, "exchange_id")?,
        symbol_id: i64_column(batch, "symbol_id")?,
        date: downcast(column(batch, "date")?, "date")?,
        ts_local_us: i64_column(batch, "ts_local_us")?,
        ingest_seq: i64_column(batch, "ingest_seq")?,
        file_id: i64_column(batch, "file_id")?,
        file_line_number: i64_column(batch, "file_line_number")?,
        is_snapshot: downcast(column(batch, "is_snapshot")?, "is_snapshot")?,
        side: column(batch, "side")?.clone(),
        price_int: i64_column(batch, "price_int")?,
        size_int: i64_column(batch, "size_int")?,
    })
}

pub fn update_from_columns(cols: &UpdateColumns, row: usize) -> Result<OrderBookUpdate> {
    let size_int = cols.size_int.value(row);
    if size_int < 0 {
        return Err(schema_error(format!(
            "column size_int has negative value {} at row {}",
            size_int, row
        )));
    }

    Ok(OrderBookUpdate {
        partition: PartitionKey {
            exchange_id: cols.exchange_id.value(row),
            symbol_id: cols.symbol_id.value(row),
            date: days_to_date(cols.date.value(row))?,
        },
        ts_local_us: cols.ts_local_us.value(row),
        ingest_seq: cols.ingest_seq.value(row),
        file_id: cols.file_id.value(row),
        file_line_number: cols.file_line_number.value(row),
        is_snapshot: cols.is_snapshot.value(row),
        side: get_side(&cols.side, row)?,
        price_int: cols.price_int.value(row),
        size_int,
    })
}

/// Decodes every row of `batch`, failing the whole batch on the first malformed row.
pub fn updates_from_batch(batch: &RecordBatch) -> Result<Vec<OrderBookUpdate>> {
    let cols = update_columns(batch)?;
    (0..batch.num_rows())
        .map(|row| update_from_columns(&cols, row))
        .collect()
}

fn append_levels(builder: &mut ListBuilder<StructBuilder>, levels: &[PriceLevel]) {
    let struct_builder = builder.values();
    for level in levels {
        struct_builder
            .field_builder::<Int64Builder>(0)
            .expect("price builder")
            .append_value(level.price_int);
        struct_builder
            .field_builder::<Int64Builder>(1)
            .expect("size builder")
            .append_value(level.size_int);
        struct_builder.append(true);
    }
    builder.append(true);
}

fn levels_builder() -> ListBuilder<StructBuilder> {
    ListBuilder::new(StructBuilder::new(
        level_fields(),
        vec![Box::new(Int64Builder::new()), Box::new(Int64Builder::new())],
    ))
}

/// Encodes checkpoints with [`checkpoint_schema`], one row per checkpoint.
pub fn build_checkpoint_batch(checkpoints: &[Checkpoint]) -> Result<RecordBatch> {
    let mut exchange_id_builder = Int32Builder::new();
    let mut symbol_id_builder = Int64Builder::new();
    let mut date_builder = Date32Builder::new();
    let mut ts_builder = Int64Builder::new();
    let mut bids_builder = levels_builder();
    let mut asks_builder = levels_builder();
    let mut file_id_builder = Int64Builder::new();
    let mut ingest_seq_builder = Int64Builder::new();
    let mut file_line_builder = Int64Builder::new();
    let mut checkpoint_kind_builder = StringBuilder::new();

    for checkpoint in checkpoints {
        exchange_id_builder.append_value(checkpoint.partition.exchange_id);
        symbol_id_builder.append_value(checkpoint.partition.symbol_id);
        date_builder.append_value(date_to_days(checkpoint.partition.date));
        ts_builder.append_value(checkpoint.ts_local_us);
        append_levels(&mut bids_builder, &checkpoint.bids);
        append_levels(&mut asks_builder, &checkpoint.asks);
        file_id_builder.append_value(checkpoint.file_id);
        ingest_seq_builder.append_value(checkpoint.ingest_seq);
        file_line_builder.append_value(checkpoint.file_line_number);
        checkpoint_kind_builder.append_value(checkpoint.kind.as_str());
    }

    let arrays: Vec<ArrayRef> = vec![
        Arc::new(exchange_id_builder.finish()),
        Arc::new(symbol_id_builder.finish()),
        Arc::new(date_builder.finish()),
        Arc::new(ts_builder.finish()),
        Arc::new(bids_builder.finish()),
        Arc::new(asks_builder.finish()),
        Arc::new(file_id_builder.finish()),
        Arc::new(ingest_seq_builder.finish()),
        Arc::new(file_line_builder.finish()),
        Arc::new(checkpoint_kind_builder.finish()),
    ];

    Ok(RecordBatch::try_new(checkpoint_schema(), arrays)?)
}

fn struct_levels(struct_array: &StructArray) -> Result<Vec<PriceLevel>> {
    let prices = struct_array
        .column_by_name("price_int")
        .ok_or_else(|| schema_error("levels missing price_int".to_string()))?;
    let prices: Int64Array = downcast(prices, "price_int")?;
    let sizes = struct_array
        .column_by_name("size_int")
        .ok_or_else(|| schema_error("levels missing size_int".to_string()))?;
    let sizes: Int64Array = downcast(sizes, "size_int")?;

    let mut levels = Vec::with_capacity(struct_array.len());
    for row in 0..struct_array.len() {
        if struct_array.is_null(row) {
            continue;
        }
        levels.push(PriceLevel::from((prices.value(row), sizes.value(row))));
    }
    Ok(levels)
}

fn list_values_levels(values: ArrayRef) -> Result<Vec<PriceLevel>> {
    let struct_array = values
        .as_any()
        .downcast_ref::<StructArray>()
        .ok_or_else(|| schema_error("list values are not struct array".to_string()))?;
    struct_levels(struct_array)
}

fn get_levels(batch: &RecordBatch, name: &str, row: usize) -> Result<Vec<PriceLevel>> {
    let idx = batch
        .schema()
        .index_of(name)
        .map_err(|_| schema_error(format!("missing column {}", name)))?;
    let array = batch.column(idx);
    if array.is_null(row) {
        return Ok(Vec::new());
    }
    if let Some(list) = array.as_any().downcast_ref::<ListArray>() {
        return list_values_levels(list.value(row));
    }
    if let Some(list) = array.as_any().downcast_ref::<LargeListArray>() {
        return list_values_levels(list.value(row));
    }
    Err(schema_error(format!("column {} has unexpected list type", name)))
}

/// Decodes a batch written by [`build_checkpoint_batch`].
pub fn checkpoints_from_batch(batch: &RecordBatch) -> Result<Vec<Checkpoint>> {
    let exchange_id = i32_column(batch, "exchange_id")?;
    let symbol_id = i64_column(batch, "symbol_id")?;
    let date: Date32Array = downcast(column(batch, "date")?, "date")?;
    let ts_local_us = i64_column(batch, "ts_local_us")?;
    let file_id = i64_column(batch, "file_id")?;
    let ingest_seq = i64_column(batch, "ingest_seq")?;
    let file_line_number = i64_column(batch, "file_line_number")?;
    let kind: StringArray = downcast(column(batch, "checkpoint_kind")?, "checkpoint_kind")?;

    let mut checkpoints = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let kind = CheckpointKind::parse(kind.value(row)).ok_or_else(|| {
            schema_error(format!("unknown checkpoint_kind {:?}", kind.value(row)))
        })?;
        checkpoints.push(Checkpoint {
            partition: PartitionKey {
                exchange_id: exchange_id.value(row),
                symbol_id: symbol_id.value(row),
                date: days_to_date(date.value(row))?,
            },
            ts_local_us: ts_local_us.value(row),
            ingest_seq: ingest_seq.value(row),
            file_id: file_id.value(row),
            file_line_number: file_line_number.value(row),
            kind,
            bids: get_levels(batch, "bids", row)?,
            asks: get_levels(batch, "asks", row)?,
        });
    }
    Ok(checkpoints)
}
