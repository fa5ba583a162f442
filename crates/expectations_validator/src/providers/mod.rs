//! Built-in metric providers.

mod conditions;
pub(crate) mod map;
mod table;

pub use conditions::{
    BETWEEN, IN_SET, MATCH_REGEX, NONNULL, NOT_IN_SET, NULL, builtin_column_map_metrics,
};
pub use map::{
    CONDITION, ColumnMapMetric, DataFrameConditionFn, INDEX_COLUMNS_KWARG, LIMIT_KWARG, RowTest,
    RowTestFn, SqlConditionFn, UNEXPECTED_COUNT, UNEXPECTED_INDEX_LIST, UNEXPECTED_INDEX_QUERY,
    UNEXPECTED_ROWS, UNEXPECTED_VALUE_COUNTS, UNEXPECTED_VALUES, condition_value_kwargs,
    map_metric_name,
};
pub use table::{TABLE_COLUMN_TYPES, TABLE_COLUMNS, TABLE_IDENTIFIER_COLUMNS, TABLE_ROW_COUNT};

use crate::MetricRegistry;

/// Suffix of aggregate partial providers.
pub const AGGREGATE_FN_SUFFIX: &str = ".aggregate_fn";

pub(crate) fn register_defaults(registry: &mut MetricRegistry) {
    table::register(registry);
    for metric in builtin_column_map_metrics() {
        registry.register_column_map_metric(metric);
    }
}
