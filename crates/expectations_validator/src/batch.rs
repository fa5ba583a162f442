//! Batches: the data slice one validation run operates on.

use crate::execution::BackendKind;
use crate::sql::SqlFrom;
use crate::table::Table;
use datafusion::dataframe::DataFrame;
use std::fmt;
use std::sync::Arc;

/// Backing data of a batch.
#[derive(Clone)]
pub enum BatchData {
    /// In-process table
    InProcess(Arc<Table>),
    /// Lazy DataFusion dataframe
    DataFrame(DataFrame),
    /// Relational table, view or query
    Relational(SqlFrom),
}

impl fmt::Debug for BatchData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchData::InProcess(table) => f
                .debug_struct("InProcess")
                .field("columns", &table.column_names())
                .field("index", &table.index_names())
                .field("rows", &table.len())
                .finish(),
            BatchData::DataFrame(df) => f
                .debug_struct("DataFrame")
                .field("schema", df.schema())
                .finish(),
            BatchData::Relational(from) => f.debug_tuple("Relational").field(from).finish(),
        }
    }
}

/// An immutable reference to one slice of data.
///
/// # Example
///
/// ```rust
/// use expectations_validator::{Batch, BackendKind, Table};
///
/// let batch = Batch::in_process("animals", Table::empty());
/// assert_eq!(batch.id(), "animals");
/// assert_eq!(batch.kind(), BackendKind::InProcessTable);
/// ```
#[derive(Debug, Clone)]
pub struct Batch {
    id: String,
    data: BatchData,
}

impl Batch {
    /// Wraps an in-process table.
    pub fn in_process(id: impl Into<String>, table: Table) -> Self {
        Self {
            id: id.into(),
            data: BatchData::InProcess(Arc::new(table)),
        }
    }

    /// Wraps a DataFusion dataframe.
    pub fn dataframe(id: impl Into<String>, df: DataFrame) -> Self {
        Self {
            id: id.into(),
            data: BatchData::DataFrame(df),
        }
    }

    /// Points at a relational table or view.
    pub fn relational_table(
        id: impl Into<String>,
        schema: Option<&str>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            data: BatchData::Relational(SqlFrom::Table {
                schema: schema.map(str::to_string),
                name: name.into(),
            }),
        }
    }

    /// Uses an arbitrary query as the batch.
    pub fn relational_query(id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: BatchData::Relational(SqlFrom::Query(query.into())),
        }
    }

    /// Batch id, recorded in every domain over this batch.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Backing data.
    pub fn data(&self) -> &BatchData {
        &self.data
    }

    /// Backend kind that can read this batch.
    pub fn kind(&self) -> BackendKind {
        match self.data {
            BatchData::InProcess(_) => BackendKind::InProcessTable,
            BatchData::DataFrame(_) => BackendKind::DistributedTable,
            BatchData::Relational(_) => BackendKind::Relational,
        }
    }

    /// Named row indices. Only in-process tables have them.
    pub fn named_indices(&self) -> Vec<String> {
        match &self.data {
            BatchData::InProcess(table) => {
                table.index_names().into_iter().map(str::to_string).collect()
            }
            _ => Vec::new(),
        }
    }
}
