//! Type conversion between Arrow/DataFusion and engine values.

use crate::{MetricResult, ValidationError};
use arrow_array::array::*;
use arrow_array::RecordBatch;
use arrow_schema::{DataType, TimeUnit};
use datafusion::common::ScalarValue;
use datafusion::logical_expr::{Expr, lit};
use expectations_core::{DataRow, DataValue};
use tracing::warn;

fn downcast<'a, T: 'static>(array: &'a ArrayRef, name: &str) -> MetricResult<&'a T> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| ValidationError::backend(format!("Failed to downcast to {name}")))
}

fn timestamp_to_value(seconds: i64, nanos: u32) -> MetricResult<DataValue> {
    let datetime = chrono::DateTime::from_timestamp(seconds, nanos)
        .ok_or_else(|| ValidationError::backend("Invalid timestamp value"))?;
    Ok(DataValue::Timestamp(datetime.to_rfc3339()))
}

/// Converts one Arrow cell to a [`DataValue`].
///
/// Used for every value read back from the DataFusion-backed engines, so that
/// results compare equal to the in-process engine's.
pub fn arrow_value_to_data_value(array: &ArrayRef, row_idx: usize) -> MetricResult<DataValue> {
    if array.is_null(row_idx) {
        return Ok(DataValue::Null);
    }

    match array.data_type() {
        DataType::Null => Ok(DataValue::Null),
        DataType::Boolean => Ok(DataValue::Bool(
            downcast::<BooleanArray>(array, "BooleanArray")?.value(row_idx),
        )),
        DataType::Int8 => Ok(DataValue::Int(
            downcast::<Int8Array>(array, "Int8Array")?.value(row_idx) as i64,
        )),
        DataType::Int16 => Ok(DataValue::Int(
            downcast::<Int16Array>(array, "Int16Array")?.value(row_idx) as i64,
        )),
        DataType::Int32 => Ok(DataValue::Int(
            downcast::<Int32Array>(array, "Int32Array")?.value(row_idx) as i64,
        )),
        DataType::Int64 => Ok(DataValue::Int(
            downcast::<Int64Array>(array, "Int64Array")?.value(row_idx),
        )),
        DataType::UInt32 => Ok(DataValue::Int(
            downcast::<UInt32Array>(array, "UInt32Array")?.value(row_idx) as i64,
        )),
        DataType::UInt64 => {
            let value = downcast::<UInt64Array>(array, "UInt64Array")?.value(row_idx);
            Ok(i64::try_from(value)
                .map(DataValue::Int)
                .unwrap_or(DataValue::Float(value as f64)))
        }
        DataType::Float32 => Ok(DataValue::Float(
            downcast::<Float32Array>(array, "Float32Array")?.value(row_idx) as f64,
        )),
        DataType::Float64 => Ok(DataValue::Float(
            downcast::<Float64Array>(array, "Float64Array")?.value(row_idx),
        )),
        DataType::Utf8 => Ok(DataValue::String(
            downcast::<StringArray>(array, "StringArray")?
                .value(row_idx)
                .to_string(),
        )),
        DataType::LargeUtf8 => Ok(DataValue::String(
            downcast::<LargeStringArray>(array, "LargeStringArray")?
                .value(row_idx)
                .to_string(),
        )),
        DataType::Utf8View => Ok(DataValue::String(
            downcast::<StringViewArray>(array, "StringViewArray")?
                .value(row_idx)
                .to_string(),
        )),
        DataType::Date32 => {
            let days = downcast::<Date32Array>(array, "Date32Array")?.value(row_idx);
            let date = chrono::DateTime::from_timestamp(days as i64 * 86_400, 0)
                .ok_or_else(|| ValidationError::backend("Invalid date value"))?;
            Ok(DataValue::String(date.format("%Y-%m-%d").to_string()))
        }
        DataType::Timestamp(unit, _) => {
            let (seconds, nanos) = match unit {
                TimeUnit::Second => {
                    let v = downcast::<TimestampSecondArray>(array, "TimestampSecondArray")?
                        .value(row_idx);
                    (v, 0)
                }
                TimeUnit::Millisecond => {
                    let v = downcast::<TimestampMillisecondArray>(array, "TimestampMillisecondArray")?
                        .value(row_idx);
                    (v.div_euclid(1_000), (v.rem_euclid(1_000) * 1_000_000) as u32)
                }
                TimeUnit::Microsecond => {
                    let v = downcast::<TimestampMicrosecondArray>(array, "TimestampMicrosecondArray")?
                        .value(row_idx);
                    (v.div_euclid(1_000_000), (v.rem_euclid(1_000_000) * 1_000) as u32)
                }
                TimeUnit::Nanosecond => {
                    let v = downcast::<TimestampNanosecondArray>(array, "TimestampNanosecondArray")?
                        .value(row_idx);
                    (v.div_euclid(1_000_000_000), v.rem_euclid(1_000_000_000) as u32)
                }
            };
            timestamp_to_value(seconds, nanos)
        }
        other => {
            warn!("Unsupported Arrow type for conversion: {:?}", other);
            Ok(DataValue::Null)
        }
    }
}

/// Converts every value of the first column of `batches`, in order.
pub fn first_column_values(batches: &[RecordBatch]) -> MetricResult<Vec<DataValue>> {
    let mut values = Vec::new();
    for batch in batches {
        if batch.num_columns() == 0 {
            continue;
        }
        let array = batch.column(0);
        for row in 0..batch.num_rows() {
            values.push(arrow_value_to_data_value(array, row)?);
        }
    }
    Ok(values)
}

/// Converts `batches` into rows keyed by column name, in order.
pub fn record_batches_to_rows(batches: &[RecordBatch]) -> MetricResult<Vec<DataRow>> {
    let mut rows = Vec::new();
    for batch in batches {
        let schema = batch.schema();
        for row in 0..batch.num_rows() {
            let mut record = DataRow::new();
            for (field, array) in schema.fields().iter().zip(batch.columns()) {
                record.insert(field.name().clone(), arrow_value_to_data_value(array, row)?);
            }
            rows.push(record);
        }
    }
    Ok(rows)
}

/// Reads the single-row result of an aggregate query as one value per column.
pub fn single_row_values(batches: &[RecordBatch]) -> MetricResult<Vec<DataValue>> {
    let batch = batches
        .iter()
        .find(|b| b.num_rows() > 0)
        .ok_or_else(|| ValidationError::backend("aggregate query returned no rows"))?;
    batch
        .columns()
        .iter()
        .map(|array| arrow_value_to_data_value(array, 0))
        .collect()
}

/// Converts a [`DataValue`] into a DataFusion literal.
///
/// Timestamps are passed as text and coerced by DataFusion against the column type.
pub fn data_value_to_scalar(value: &DataValue) -> MetricResult<ScalarValue> {
    match value {
        DataValue::Null => Ok(ScalarValue::Null),
        DataValue::Bool(b) => Ok(ScalarValue::Boolean(Some(*b))),
        DataValue::Int(i) => Ok(ScalarValue::Int64(Some(*i))),
        DataValue::Float(f) => Ok(ScalarValue::Float64(Some(*f))),
        DataValue::String(s) | DataValue::Timestamp(s) => Ok(ScalarValue::Utf8(Some(s.clone()))),
        DataValue::List(_) | DataValue::Map(_) => Err(ValidationError::backend(format!(
            "cannot use a {} value as a literal",
            value.type_name()
        ))),
    }
}

/// Converts a [`DataValue`] into a DataFusion literal expression.
pub fn data_value_to_lit(value: &DataValue) -> MetricResult<Expr> {
    Ok(lit(data_value_to_scalar(value)?))
}
