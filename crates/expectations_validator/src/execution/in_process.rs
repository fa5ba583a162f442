//! In-process table engine.

use super::{BackendKind, ColumnMetadata, ComputeDomain, ExecutionBackend, split_domain_kwargs};
use crate::{Batch, BatchData, MetricResult, Table, ValidationError};
use expectations_core::Kwargs;
use std::sync::Arc;

/// Engine for batches held in memory as a [`Table`].
///
/// Values are computed directly; there is nothing to fuse.
#[derive(Debug, Clone, Default)]
pub struct InProcessEngine;

impl InProcessEngine {
    /// Creates a new in-process engine.
    pub fn new() -> Self {
        Self
    }

    /// The table behind `batch`.
    pub fn table<'a>(&self, batch: &'a Batch) -> MetricResult<&'a Arc<Table>> {
        match batch.data() {
            BatchData::InProcess(table) => Ok(table),
            _ => Err(ValidationError::backend(format!(
                "batch '{}' is not an in-process table",
                batch.id()
            ))),
        }
    }
}

impl ExecutionBackend for InProcessEngine {
    type Selectable = Arc<Table>;

    fn kind(&self) -> BackendKind {
        BackendKind::InProcessTable
    }

    fn get_compute_domain(
        &self,
        batch: &Batch,
        domain_kwargs: &Kwargs,
    ) -> MetricResult<ComputeDomain<Arc<Table>>> {
        let (compute_kwargs, accessor_kwargs) = split_domain_kwargs(batch, domain_kwargs)?;
        Ok(ComputeDomain {
            selectable: Arc::clone(self.table(batch)?),
            compute_kwargs,
            accessor_kwargs,
        })
    }

    fn column_metadata(&self, batch: &Batch) -> MetricResult<Vec<ColumnMetadata>> {
        let table = self.table(batch)?;
        Ok(table
            .column_types()
            .into_iter()
            .map(|(name, data_type)| ColumnMetadata {
                name,
                data_type,
                nullable: None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expectations_core::DataValue;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_column_metadata_excludes_named_index() {
        let table = Table::from_rows(
            &["animals", "pk_1"],
            vec![vec!["cat".into(), DataValue::Int(0)]],
        )
        .unwrap()
        .set_index(&["pk_1"])
        .unwrap();
        let batch = Batch::in_process("b1", table);

        let columns = InProcessEngine::new().column_metadata(&batch).unwrap();
        assert_eq!(
            columns,
            vec![ColumnMetadata {
                name: "animals".into(),
                data_type: Some("string".into()),
                nullable: None,
            }]
        );
    }

    #[test]
    fn test_compute_domain_keeps_column_in_accessor() {
        let batch = Batch::in_process("b1", Table::empty());
        let domain = InProcessEngine::new()
            .get_compute_domain(&batch, &Kwargs::new().with("column", "animals"))
            .unwrap();
        assert_eq!(domain.column(), Some("animals"));
        assert!(domain.compute_kwargs.is_empty());
    }
}
