//! # Expectations Validator
//!
//! Metric dependency graph resolver and map-metric validation engine.
//!
//! Expectations are checked by computing *metrics* against a batch held by one of
//! three execution backends:
//!
//! - **In-process**: an in-memory [`Table`] with optional named row indices
//! - **Distributed dataframe**: a lazy DataFusion [`DataFrame`](datafusion::dataframe::DataFrame)
//! - **Relational**: a table, view or query behind a [`SqlEngine`], rendered in a
//!   registered [`SqlDialect`]
//!
//! Metrics are served by providers registered per backend in a [`MetricRegistry`].
//! A column map metric such as `column_values.in_set` contributes a row condition
//! plus derived metrics (`unexpected_count`, `unexpected_values`,
//! `unexpected_index_list`, ...). The [`GraphResolver`] expands requested metrics
//! into their dependency closure and computes each node once per resolution, fusing
//! aggregates into bundles.
//!
//! ## Example
//!
//! ```rust
//! use expectations_core::{DetailedResultFormat, ExpectationBuilder, ValidationContext};
//! use expectations_validator::{Batch, InProcessEngine, Table, Validator};
//!
//! let table = Table::from_rows(
//!     &["animals", "pk_1"],
//!     vec![
//!         vec!["cat".into(), 0i64.into()],
//!         vec!["giraffe".into(), 1i64.into()],
//!     ],
//! )
//! .unwrap();
//! let batch = Batch::in_process("animal_names", table);
//!
//! let expectation = ExpectationBuilder::in_set("animals", vec!["cat", "fish", "dog"])
//!     .detailed_result_format(DetailedResultFormat {
//!         result_format: Some("COMPLETE".into()),
//!         unexpected_index_column_names: Some(vec!["pk_1".into()]),
//!         ..Default::default()
//!     })
//!     .build();
//!
//! let validator = Validator::new(InProcessEngine::new());
//! let result = validator
//!     .validate_expectation(&batch, &expectation, &ValidationContext::new())
//!     .unwrap();
//!
//! assert!(!result.success);
//! assert_eq!(result.result.unexpected_count, Some(1));
//! ```

mod batch;
pub mod convert;
mod engine;
mod error;
mod execution;
mod expectations;
mod policy;
pub mod providers;
mod registry;
mod resolver;
pub mod sql;
mod table;

pub use batch::*;
pub use engine::*;
pub use error::*;
pub use execution::*;
pub use expectations::*;
pub use policy::*;
pub use registry::*;
pub use resolver::*;
pub use sql::{CompareOp, DialectRegistry, SelectStatement, SqlDialect, SqlExpr, SqlFrom};
pub use table::*;
