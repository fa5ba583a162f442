//! In-process columnar table.
//!
//! [`Table`] is the data structure behind the in-process backend: ordered columns of
//! [`DataValue`]s plus zero or more *named row indices*. A named index is a labelled
//! per-row value that is not an ordinary column, in the same way a dataframe index
//! is; [`Table::set_index`] moves ordinary columns into the index.

use crate::convert::arrow_value_to_data_value;
use crate::{MetricResult, ValidationError};
use arrow_array::RecordBatch;
use expectations_core::{DataRow, DataValue};

/// A named row index.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedIndex {
    /// Index name
    pub name: String,
    /// One value per row
    pub values: Vec<DataValue>,
}

/// An in-memory table with ordered columns and optional named row indices.
///
/// # Example
///
/// ```rust
/// use expectations_validator::Table;
/// use expectations_core::DataValue;
///
/// let table = Table::from_rows(
///     &["animals", "pk_1"],
///     vec![
///         vec!["cat".into(), DataValue::Int(0)],
///         vec!["giraffe".into(), DataValue::Int(1)],
///     ],
/// )
/// .unwrap()
/// .set_index(&["pk_1"])
/// .unwrap();
///
/// assert_eq!(table.column_names(), &["animals".to_string()]);
/// assert_eq!(table.index_names(), vec!["pk_1"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    data: Vec<Vec<DataValue>>,
    index: Vec<NamedIndex>,
    len: usize,
}

impl Table {
    /// Creates a new empty table.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a table from `(name, values)` pairs.
    ///
    /// # Errors
    ///
    /// Fails if column lengths differ or a name repeats.
    pub fn new(columns: Vec<(String, Vec<DataValue>)>) -> MetricResult<Self> {
        let len = columns.first().map(|(_, values)| values.len()).unwrap_or(0);
        let mut table = Self {
            len,
            ..Self::default()
        };
        for (name, values) in columns {
            table.push_column(name, values)?;
        }
        Ok(table)
    }

    /// Creates a table from row-major data.
    ///
    /// # Errors
    ///
    /// Fails if a row does not have exactly one value per column.
    pub fn from_rows(columns: &[&str], rows: Vec<Vec<DataValue>>) -> MetricResult<Self> {
        let mut data: Vec<Vec<DataValue>> = vec![Vec::with_capacity(rows.len()); columns.len()];
        for (row_idx, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() {
                return Err(ValidationError::backend(format!(
                    "row {row_idx} has {} values, expected {}",
                    row.len(),
                    columns.len()
                )));
            }
            for (column, value) in data.iter_mut().zip(row) {
                column.push(value);
            }
        }
        Self::new(
            columns
                .iter()
                .map(|name| name.to_string())
                .zip(data)
                .collect(),
        )
    }

    /// Creates a table from an Arrow record batch.
    pub fn from_record_batch(batch: &RecordBatch) -> MetricResult<Self> {
        let schema = batch.schema();
        let mut columns = Vec::with_capacity(batch.num_columns());
        for (field, array) in schema.fields().iter().zip(batch.columns()) {
            let values = (0..batch.num_rows())
                .map(|row| arrow_value_to_data_value(array, row))
                .collect::<MetricResult<Vec<_>>>()?;
            columns.push((field.name().clone(), values));
        }
        let mut table = Self::new(columns)?;
        table.len = batch.num_rows();
        Ok(table)
    }

    fn push_column(&mut self, name: String, values: Vec<DataValue>) -> MetricResult<()> {
        if values.len() != self.len {
            return Err(ValidationError::backend(format!(
                "column '{name}' has {} values, expected {}",
                values.len(),
                self.len
            )));
        }
        if self.columns.contains(&name) || self.index.iter().any(|i| i.name == name) {
            return Err(ValidationError::backend(format!("duplicate column '{name}'")));
        }
        self.columns.push(name);
        self.data.push(values);
        Ok(())
    }

    /// Moves the named ordinary columns into the named row index, replacing any
    /// existing index.
    ///
    /// # Errors
    ///
    /// Fails if a name is not an ordinary column.
    pub fn set_index(mut self, names: &[&str]) -> MetricResult<Self> {
        let mut index = Vec::with_capacity(names.len());
        for name in names {
            let position = self
                .columns
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| ValidationError::backend(format!("cannot index by unknown column '{name}'")))?;
            self.columns.remove(position);
            let values = self.data.remove(position);
            index.push(NamedIndex {
                name: name.to_string(),
                values,
            });
        }
        self.index = index;
        Ok(self)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Ordinary column names, in order.
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Named row index names, in order.
    pub fn index_names(&self) -> Vec<&str> {
        self.index.iter().map(|i| i.name.as_str()).collect()
    }

    /// Returns true if the table has at least one named row index.
    pub fn has_named_index(&self) -> bool {
        !self.index.is_empty()
    }

    /// Values of an ordinary column.
    pub fn column(&self, name: &str) -> Option<&[DataValue]> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| self.data[i].as_slice())
    }

    /// Values of a named row index.
    pub fn index_column(&self, name: &str) -> Option<&[DataValue]> {
        self.index
            .iter()
            .find(|i| i.name == name)
            .map(|i| i.values.as_slice())
    }

    /// Values of an ordinary column or, failing that, of a named row index.
    pub fn lookup(&self, name: &str) -> Option<&[DataValue]> {
        self.column(name).or_else(|| self.index_column(name))
    }

    /// Row label: the single index value, a list of index values for multiple
    /// indices, or the row position when there is no named index.
    pub fn row_label(&self, row: usize) -> DataValue {
        match self.index.as_slice() {
            [] => DataValue::from(row),
            [single] => single.values[row].clone(),
            many => DataValue::List(many.iter().map(|i| i.values[row].clone()).collect()),
        }
    }

    /// Full row, named indices included.
    pub fn row(&self, row: usize) -> DataRow {
        let mut record = DataRow::new();
        for index in &self.index {
            record.insert(index.name.clone(), index.values[row].clone());
        }
        for (name, values) in self.columns.iter().zip(&self.data) {
            record.insert(name.clone(), values[row].clone());
        }
        record
    }

    /// Type name of each ordinary column, inferred from its first non-null value.
    pub fn column_types(&self) -> Vec<(String, Option<String>)> {
        self.columns
            .iter()
            .zip(&self.data)
            .map(|(name, values)| {
                let data_type = values
                    .iter()
                    .find(|v| !v.is_null())
                    .map(|v| v.type_name().to_string());
                (name.clone(), data_type)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::{Int64Array, StringArray};
    use arrow_schema::{DataType, Field, Schema};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn animals() -> Table {
        Table::from_rows(
            &["animals", "pk_1", "pk_2"],
            vec![
                vec!["cat".into(), DataValue::Int(0), "zero".into()],
                vec!["giraffe".into(), DataValue::Int(1), "one".into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_from_rows_rejects_ragged_rows() {
        let result = Table::from_rows(&["a", "b"], vec![vec![DataValue::Int(1)]]);
        assert!(result.is_err());
    }

    #[test]
    fn test_row_labels() {
        let table = animals();
        assert_eq!(table.row_label(1), DataValue::Int(1));

        let single = table.clone().set_index(&["pk_2"]).unwrap();
        assert_eq!(single.row_label(1), DataValue::from("one"));

        let multi = table.set_index(&["pk_1", "pk_2"]).unwrap();
        assert_eq!(
            multi.row_label(0),
            DataValue::List(vec![DataValue::Int(0), DataValue::from("zero")])
        );
    }

    #[test]
    fn test_set_index_moves_columns() {
        let table = animals().set_index(&["pk_1"]).unwrap();
        assert_eq!(table.column_names(), &["animals".to_string(), "pk_2".to_string()]);
        assert!(table.column("pk_1").is_none());
        assert_eq!(table.lookup("pk_1"), Some(&[DataValue::Int(0), DataValue::Int(1)][..]));
        assert!(animals().set_index(&["nope"]).is_err());
    }

    #[test]
    fn test_row_includes_index() {
        let table = animals().set_index(&["pk_1"]).unwrap();
        let row = table.row(1);
        assert_eq!(row.get("pk_1"), Some(&DataValue::Int(1)));
        assert_eq!(row.get("animals"), Some(&DataValue::from("giraffe")));
        assert_eq!(row.len(), 3);
    }

    #[test]
    fn test_from_record_batch() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec![Some("a"), None])),
            ],
        )
        .unwrap();

        let table = Table::from_record_batch(&batch).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.column("name").unwrap()[1], DataValue::Null);
        assert_eq!(
            table.column_types(),
            vec![
                ("id".to_string(), Some("int64".to_string())),
                ("name".to_string(), Some("string".to_string())),
            ]
        );
    }
}
