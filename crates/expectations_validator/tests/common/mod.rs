//! Shared fixtures: the `animal_names` batch on every backend.

#![allow(dead_code)]

use arrow_array::{Float64Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use expectations_core::{
    DataRow, DataValue, DetailedResultFormat, ExpectationBuilder, ExpectationConfiguration,
    UnexpectedIndexEntry,
};
use expectations_validator::{
    Batch, DataFrameEngine, InProcessEngine, SqlDialect, SqlEngine, Table, Validator,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub const ANIMALS: [&str; 6] = ["cat", "fish", "dog", "giraffe", "lion", "zebra"];
pub const PK_2: [&str; 6] = ["zero", "one", "two", "three", "four", "five"];
pub const TABLE_NAME: &str = "animal_names";

/// Routes engine logs to the test output; `RUST_LOG=debug` shows every query.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn animal_record_batch() -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("animals", DataType::Utf8, true),
        Field::new("pk_1", DataType::Int64, false),
        Field::new("pk_2", DataType::Utf8, false),
    ]));
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(ANIMALS.to_vec())),
            Arc::new(Int64Array::from((0..6).collect::<Vec<i64>>())),
            Arc::new(StringArray::from(PK_2.to_vec())),
        ],
    )
    .expect("fixture record batch")
}

/// In-process batch, with `index` moved into the named row index.
pub fn in_process(index: &[&str]) -> anyhow::Result<(Validator, Batch)> {
    let mut table = Table::from_record_batch(&animal_record_batch())?;
    if !index.is_empty() {
        table = table.set_index(index)?;
    }
    Ok((
        Validator::new(InProcessEngine::new()),
        Batch::in_process(TABLE_NAME, table),
    ))
}

pub fn dataframe() -> anyhow::Result<(Validator, Batch)> {
    let engine = DataFrameEngine::new()?;
    let df = engine.read_batch(animal_record_batch())?;
    Ok((Validator::new(engine), Batch::dataframe(TABLE_NAME, df)))
}

/// Relational batch over an in-memory database; the engine handle shares the pool.
pub fn relational(dialect: SqlDialect) -> anyhow::Result<(Validator, Batch, SqlEngine)> {
    let engine = SqlEngine::in_memory(dialect)?;
    engine.register_batch(TABLE_NAME, animal_record_batch())?;
    Ok((
        Validator::new(engine.clone()),
        Batch::relational_table(TABLE_NAME, None, TABLE_NAME),
        engine,
    ))
}

/// Every backend over the `animal_names` batch, each with a label for assertion
/// messages.
pub fn all_backends() -> anyhow::Result<Vec<(&'static str, Validator, Batch)>> {
    backends_over(animal_record_batch())
}

/// Every backend over `record_batch`, registered as `animal_names`.
pub fn backends_over(
    record_batch: RecordBatch,
) -> anyhow::Result<Vec<(&'static str, Validator, Batch)>> {
    init_tracing();
    let table = Table::from_record_batch(&record_batch)?;

    let dataframe_engine = DataFrameEngine::new()?;
    let df = dataframe_engine.read_batch(record_batch.clone())?;

    let sql_engine = SqlEngine::in_memory(SqlDialect::Sqlite)?;
    sql_engine.register_batch(TABLE_NAME, record_batch)?;

    Ok(vec![
        (
            "in-process",
            Validator::new(InProcessEngine::new()),
            Batch::in_process(TABLE_NAME, table),
        ),
        (
            "dataframe",
            Validator::new(dataframe_engine),
            Batch::dataframe(TABLE_NAME, df),
        ),
        (
            "relational",
            Validator::new(sql_engine),
            Batch::relational_table(TABLE_NAME, None, TABLE_NAME),
        ),
    ])
}

/// `x = [1.0, NaN, 3.0, 50.0, null]`.
pub fn float_record_batch() -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Float64, true)]));
    RecordBatch::try_new(
        schema,
        vec![Arc::new(Float64Array::from(vec![
            Some(1.0),
            Some(f64::NAN),
            Some(3.0),
            Some(50.0),
            None,
        ]))],
    )
    .expect("fixture record batch")
}

/// `id = 0..rows` in `batches` equal record batches.
pub fn numbered_batches(rows: i64, batches: i64) -> Vec<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
    let per_batch = rows / batches;
    (0..batches)
        .map(|b| {
            let ids: Vec<i64> = (b * per_batch..(b + 1) * per_batch).collect();
            RecordBatch::try_new(Arc::clone(&schema), vec![Arc::new(Int64Array::from(ids))])
                .expect("fixture record batch")
        })
        .collect()
}

/// Integer ids in ascending order, with nothing skipped or repeated.
pub fn is_natural_order(values: &[DataValue], first: i64) -> bool {
    values
        .iter()
        .enumerate()
        .all(|(offset, value)| value == &DataValue::Int(first + offset as i64))
}

pub fn format(level: &str, identifiers: &[&str]) -> DetailedResultFormat {
    DetailedResultFormat {
        result_format: Some(level.to_string()),
        unexpected_index_column_names: (!identifiers.is_empty())
            .then(|| identifiers.iter().map(|s| s.to_string()).collect()),
        ..Default::default()
    }
}

/// `animals` in `{cat, fish, dog}`: giraffe, lion and zebra (pk 3, 4, 5) are unexpected.
pub fn animals_in_set(result_format: DetailedResultFormat) -> ExpectationConfiguration {
    ExpectationBuilder::in_set("animals", vec!["cat", "fish", "dog"])
        .detailed_result_format(result_format)
        .build()
}

pub fn record(fields: &[(&str, DataValue)]) -> UnexpectedIndexEntry {
    let row: DataRow = fields
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect();
    UnexpectedIndexEntry::Record(row)
}

/// `{animals, pk_1}` records of the three unexpected rows.
pub fn pk_1_records() -> Vec<UnexpectedIndexEntry> {
    [("giraffe", 3), ("lion", 4), ("zebra", 5)]
        .into_iter()
        .map(|(animal, pk)| {
            record(&[
                ("animals", DataValue::from(animal)),
                ("pk_1", DataValue::Int(pk)),
            ])
        })
        .collect()
}

pub fn unexpected_animals() -> Vec<DataValue> {
    vec!["giraffe".into(), "lion".into(), "zebra".into()]
}
