//! Built-in column map metrics.

use super::map::{ColumnMapMetric, RowTest};
use crate::MetricResult;
use crate::convert::data_value_to_lit;
use crate::sql::{CompareOp, SqlExpr};
use datafusion::logical_expr::{Expr, Operator, binary_expr, lit};
use expectations_core::{ConfigurationError, DataValue, Kwargs};
use regex::Regex;
use std::cmp::Ordering;

pub const IN_SET: &str = "column_values.in_set";
pub const NOT_IN_SET: &str = "column_values.not_in_set";
pub const NONNULL: &str = "column_values.nonnull";
pub const NULL: &str = "column_values.null";
pub const BETWEEN: &str = "column_values.between";
pub const MATCH_REGEX: &str = "column_values.match_regex";

fn value_set(kwargs: &Kwargs) -> MetricResult<Vec<DataValue>> {
    match kwargs.get("value_set") {
        None | Some(DataValue::Null) => Err(ConfigurationError::missing_kwarg("value_set").into()),
        Some(value) => value.as_list().map(<[DataValue]>::to_vec).ok_or_else(|| {
            ConfigurationError::invalid_kwarg("value_set", "must be a list").into()
        }),
    }
}

fn dataframe_in_list(column: Expr, kwargs: &Kwargs, negated: bool) -> MetricResult<Expr> {
    let values = value_set(kwargs)?;
    if values.is_empty() {
        return Ok(lit(negated));
    }
    let list = values
        .iter()
        .map(data_value_to_lit)
        .collect::<MetricResult<Vec<_>>>()?;
    Ok(column.in_list(list, negated))
}

fn set_test(kwargs: &Kwargs, negated: bool) -> MetricResult<RowTest> {
    let values = value_set(kwargs)?;
    Ok(Box::new(move |value: &DataValue| {
        values.iter().any(|v| v.loosely_equals(value)) != negated
    }) as RowTest)
}

/// Bounds of `column_values.between`.
#[derive(Debug, Clone)]
struct Bounds {
    min: Option<DataValue>,
    max: Option<DataValue>,
    strict_min: bool,
    strict_max: bool,
}

impl Bounds {
    fn from_kwargs(kwargs: &Kwargs) -> MetricResult<Self> {
        let bound = |key: &str| match kwargs.get(key) {
            None | Some(DataValue::Null) => None,
            Some(value) => Some(value.clone()),
        };
        let flag = |key: &str| -> MetricResult<bool> {
            match kwargs.get(key) {
                None | Some(DataValue::Null) => Ok(false),
                Some(value) => value
                    .as_bool()
                    .ok_or_else(|| ConfigurationError::invalid_kwarg(key, "must be a boolean").into()),
            }
        };
        let bounds = Self {
            min: bound("min_value"),
            max: bound("max_value"),
            strict_min: flag("strict_min")?,
            strict_max: flag("strict_max")?,
        };
        if bounds.min.is_none() && bounds.max.is_none() {
            return Err(ConfigurationError::invalid_kwarg(
                "min_value",
                "min_value and max_value cannot both be null",
            )
            .into());
        }
        if let (Some(min), Some(max)) = (&bounds.min, &bounds.max) {
            if min.partial_cmp_value(max) == Some(Ordering::Greater) {
                return Err(ConfigurationError::invalid_kwarg(
                    "min_value",
                    "min_value cannot be greater than max_value",
                )
                .into());
            }
        }
        Ok(bounds)
    }

    fn contains(&self, value: &DataValue) -> bool {
        let above_min = match &self.min {
            None => true,
            Some(min) => match value.partial_cmp_value(min) {
                Some(Ordering::Greater) => true,
                Some(Ordering::Equal) => !self.strict_min,
                _ => false,
            },
        };
        let below_max = match &self.max {
            None => true,
            Some(max) => match value.partial_cmp_value(max) {
                Some(Ordering::Less) => true,
                Some(Ordering::Equal) => !self.strict_max,
                _ => false,
            },
        };
        above_min && below_max
    }

    fn min_op(&self) -> CompareOp {
        if self.strict_min { CompareOp::Gt } else { CompareOp::GtEq }
    }

    fn max_op(&self) -> CompareOp {
        if self.strict_max { CompareOp::Lt } else { CompareOp::LtEq }
    }
}

fn between_dataframe(column: Expr, kwargs: &Kwargs) -> MetricResult<Expr> {
    let bounds = Bounds::from_kwargs(kwargs)?;
    let mut terms = Vec::new();
    if let Some(min) = &bounds.min {
        let min = data_value_to_lit(min)?;
        terms.push(if bounds.strict_min {
            column.clone().gt(min)
        } else {
            column.clone().gt_eq(min)
        });
    }
    if let Some(max) = &bounds.max {
        let max = data_value_to_lit(max)?;
        terms.push(if bounds.strict_max {
            column.clone().lt(max)
        } else {
            column.clone().lt_eq(max)
        });
    }
    Ok(terms
        .into_iter()
        .reduce(Expr::and)
        .unwrap_or_else(|| lit(true)))
}

fn between_sql(column: SqlExpr, kwargs: &Kwargs) -> MetricResult<SqlExpr> {
    let bounds = Bounds::from_kwargs(kwargs)?;
    let mut terms = Vec::new();
    if let Some(min) = &bounds.min {
        terms.push(column.clone().compare(bounds.min_op(), min.clone()));
    }
    if let Some(max) = &bounds.max {
        terms.push(column.clone().compare(bounds.max_op(), max.clone()));
    }
    Ok(match terms.len() {
        1 => terms.remove(0),
        _ => SqlExpr::And(terms),
    })
}

fn pattern(kwargs: &Kwargs) -> MetricResult<String> {
    Ok(kwargs.require_str("regex")?.to_string())
}

/// The column map metrics every registry starts with.
pub fn builtin_column_map_metrics() -> Vec<ColumnMapMetric> {
    vec![
        ColumnMapMetric::new(
            IN_SET,
            |kwargs: &Kwargs| set_test(kwargs, false),
            |column, kwargs: &Kwargs| dataframe_in_list(column, kwargs, false),
            |column: SqlExpr, kwargs: &Kwargs| Ok(column.in_list(value_set(kwargs)?, false)),
        ),
        ColumnMapMetric::new(
            NOT_IN_SET,
            |kwargs: &Kwargs| set_test(kwargs, true),
            |column, kwargs: &Kwargs| dataframe_in_list(column, kwargs, true),
            |column: SqlExpr, kwargs: &Kwargs| Ok(column.in_list(value_set(kwargs)?, true)),
        ),
        ColumnMapMetric::new(
            NONNULL,
            |_: &Kwargs| Ok(Box::new(|value: &DataValue| !value.is_null()) as RowTest),
            |column: Expr, _: &Kwargs| Ok(column.is_not_null()),
            |column: SqlExpr, _: &Kwargs| Ok(column.is_not_null()),
        )
        .with_filter_column_isnull(false),
        ColumnMapMetric::new(
            NULL,
            |_: &Kwargs| Ok(Box::new(|value: &DataValue| value.is_null()) as RowTest),
            |column: Expr, _: &Kwargs| Ok(column.is_null()),
            |column: SqlExpr, _: &Kwargs| Ok(column.is_null()),
        )
        .with_filter_column_isnull(false),
        ColumnMapMetric::new(
            BETWEEN,
            |kwargs: &Kwargs| {
                let bounds = Bounds::from_kwargs(kwargs)?;
                Ok(Box::new(move |value: &DataValue| bounds.contains(value)) as RowTest)
            },
            between_dataframe,
            between_sql,
        ),
        ColumnMapMetric::new(
            MATCH_REGEX,
            |kwargs: &Kwargs| {
                let regex = Regex::new(&pattern(kwargs)?)?;
                Ok(Box::new(move |value: &DataValue| {
                    value.as_str().is_some_and(|text| regex.is_match(text))
                }) as RowTest)
            },
            |column: Expr, kwargs: &Kwargs| {
                let pattern = pattern(kwargs)?;
                Regex::new(&pattern)?;
                Ok(binary_expr(column, Operator::RegexMatch, lit(pattern)))
            },
            |column: SqlExpr, kwargs: &Kwargs| {
                let pattern = pattern(kwargs)?;
                Regex::new(&pattern)?;
                Ok(column.regex(pattern))
            },
        )
        .with_requires_text(true),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::SqlDialect;
    use pretty_assertions::assert_eq;

    fn kwargs() -> Kwargs {
        Kwargs::new()
    }

    #[test]
    fn test_between_bounds() {
        let bounds = Bounds::from_kwargs(
            &kwargs()
                .with("min_value", 1)
                .with("max_value", 5)
                .with("strict_max", true),
        )
        .unwrap();
        assert!(bounds.contains(&DataValue::Int(1)));
        assert!(bounds.contains(&DataValue::Float(4.5)));
        assert!(!bounds.contains(&DataValue::Int(5)));
        assert!(!bounds.contains(&"three".into()));
    }

    #[test]
    fn test_between_requires_a_bound() {
        let err = Bounds::from_kwargs(&kwargs()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_between_sql_rendering() {
        let expr = between_sql(
            SqlExpr::column("age"),
            &kwargs().with("min_value", 18).with("max_value", 65),
        )
        .unwrap();
        assert_eq!(
            expr.render(SqlDialect::Postgresql).unwrap(),
            "age >= 18 AND age <= 65"
        );
    }

    #[test]
    fn test_set_test_is_loose_on_numbers() {
        let test = set_test(&kwargs().with("value_set", vec![1, 2]), false).unwrap();
        assert!(test(&DataValue::Float(2.0)));
        assert!(!test(&DataValue::Int(3)));
    }

    #[test]
    fn test_missing_value_set_is_configuration_error() {
        let err = value_set(&kwargs()).err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_builtins_and_kwarg_validation() {
        let metrics = builtin_column_map_metrics();
        assert_eq!(metrics.len(), 6);
        assert!(set_test(&kwargs().with("value_set", "cat"), false).is_err());
        assert!(pattern(&kwargs().with("regex", "^a")).is_ok());
        assert!(Regex::new("(").is_err());
    }
}
