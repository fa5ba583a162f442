//! End-to-end runs driven by parsed run configurations.

mod common;

use common::*;
use expectations_core::DataValue;
use expectations_parser::{parse_json, parse_yaml};
use pretty_assertions::assert_eq;

const ANIMAL_RUN: &str = r#"
name: animal_checks
result_format:
  result_format: SUMMARY
  unexpected_index_column_names: [pk_1]
  partial_unexpected_count: 2
expectations:
  - type: expect_column_values_to_be_in_set
    kwargs:
      column: animals
      value_set: [cat, fish, dog]
  - type: expect_column_values_to_be_in_set
    kwargs:
      column: animals
      value_set: [cat, fish, dog]
      mostly: 0.5
  - type: expect_column_values_to_be_between
    kwargs:
      column: pk_1
      min_value: 0
      max_value: 4
  - type: expect_column_values_to_not_be_null
    kwargs:
      column: pk_2
    result_format: BOOLEAN_ONLY
"#;

#[test]
fn test_yaml_run_on_every_backend() -> anyhow::Result<()> {
    let config = parse_yaml(ANIMAL_RUN)?;
    let context = config.context();

    for (backend, validator, batch) in all_backends()? {
        let report = validator.validate(&batch, &config.expectations, &context)?;
        let results = &report.results;

        assert_eq!(report.statistics.evaluated_expectations, 4, "{backend}");
        assert_eq!(report.meta.get("run_name").map(String::as_str), Some("animal_checks"));

        assert!(!results[0].success, "{backend}");
        assert_eq!(
            results[0].result.partial_unexpected_list,
            Some(vec!["giraffe".into(), "lion".into()]),
            "{backend}"
        );
        assert_eq!(
            results[0].result.partial_unexpected_index_list,
            Some(pk_1_records()[..2].to_vec()),
            "{backend}"
        );

        assert!(results[1].success, "{backend}: mostly 0.5 tolerates half");

        assert!(!results[2].success, "{backend}");
        assert_eq!(results[2].result.unexpected_count, Some(1), "{backend}");
        assert_eq!(
            results[2].result.partial_unexpected_list,
            Some(vec![DataValue::Int(5)]),
            "{backend}"
        );

        assert!(results[3].success, "{backend}");
        assert!(results[3].result.is_empty(), "{backend}");
        assert_eq!(report.statistics.successful_expectations, 2, "{backend}");
    }
    Ok(())
}

#[test]
fn test_shared_metrics_resolve_once_per_run() -> anyhow::Result<()> {
    let config = parse_yaml(ANIMAL_RUN)?;
    let (validator, batch) = in_process(&[])?;

    let both = validator.validate(&batch, &config.expectations[..2], &config.context())?;
    let first = validator.validate(&batch, &config.expectations[..1], &config.context())?;
    assert_eq!(both.statistics.metrics_resolved, first.statistics.metrics_resolved);
    Ok(())
}

#[test]
fn test_catch_exceptions_off_aborts_on_missing_column() -> anyhow::Result<()> {
    let config = parse_json(
        r#"{
            "catch_exceptions": false,
            "expectations": [
                {"type": "expect_column_values_to_not_be_null", "kwargs": {"column": "legs"}}
            ]
        }"#,
    )?;
    for (backend, validator, batch) in all_backends()? {
        let err = validator
            .validate(&batch, &config.expectations, &config.context())
            .unwrap_err();
        assert!(!err.is_configuration(), "{backend}: {err}");
        assert!(err.to_string().contains("legs"), "{backend}: {err}");
    }
    Ok(())
}

#[test]
fn test_catch_exceptions_keeps_healthy_results() -> anyhow::Result<()> {
    let config = parse_json(
        r#"{
            "expectations": [
                {"type": "expect_column_values_to_not_be_null", "kwargs": {"column": "legs"}},
                {"type": "expect_column_values_to_not_be_null", "kwargs": {"column": "animals"}}
            ]
        }"#,
    )?;
    for (backend, validator, batch) in all_backends()? {
        let report = validator.validate(&batch, &config.expectations, &config.context())?;
        assert!(report.results[0].exception_info.raised_exception, "{backend}");
        assert!(report.results[1].success, "{backend}");
        assert!(!report.results[1].exception_info.raised_exception, "{backend}");
    }
    Ok(())
}
