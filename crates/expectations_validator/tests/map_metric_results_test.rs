//! Column map expectation results across the in-process, dataframe and relational
//! backends.
//!
//! Every backend validates the same `animal_names` batch, so counts, partial lists
//! and identifier records must agree; only the row identity and the audit query
//! differ per backend.

mod common;

use common::*;
use expectations_core::{
    DataValue, DetailedResultFormat, ExpectationBuilder, PartialUnexpectedCount,
    UnexpectedIndexEntry, UnexpectedIndexQuery, ValidationContext,
};
use datafusion::datasource::MemTable;
use datafusion::prelude::{SessionConfig, SessionContext};
use expectations_validator::{
    Batch, DataFrameEngine, InProcessEngine, SqlDialect, Table, Validator,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[test]
fn test_counts_agree_across_backends() -> anyhow::Result<()> {
    for (backend, validator, batch) in all_backends()? {
        let result = validator.validate_expectation(
            &batch,
            &animals_in_set(format("BASIC", &[])),
            &ValidationContext::new(),
        )?;

        assert!(!result.success, "{backend}");
        let payload = &result.result;
        assert_eq!(payload.element_count, Some(6), "{backend}");
        assert_eq!(payload.missing_count, Some(0), "{backend}");
        assert_eq!(payload.missing_percent, Some(Some(0.0)), "{backend}");
        assert_eq!(payload.unexpected_count, Some(3), "{backend}");
        assert_eq!(payload.unexpected_percent, Some(Some(50.0)), "{backend}");
        assert_eq!(payload.unexpected_percent_total, Some(Some(50.0)), "{backend}");
        assert_eq!(payload.partial_unexpected_list, Some(unexpected_animals()), "{backend}");
    }
    Ok(())
}

#[test]
fn test_complete_with_identifiers_on_every_backend() -> anyhow::Result<()> {
    for (backend, validator, batch) in all_backends()? {
        let result = validator.validate_expectation(
            &batch,
            &animals_in_set(format("COMPLETE", &["pk_1"])),
            &ValidationContext::new(),
        )?;
        let payload = &result.result;

        assert_eq!(payload.unexpected_list, Some(unexpected_animals()), "{backend}");
        assert_eq!(payload.unexpected_index_list, Some(pk_1_records()), "{backend}");
        assert_eq!(payload.partial_unexpected_index_list, Some(pk_1_records()), "{backend}");
        assert_eq!(
            payload.unexpected_index_column_names,
            Some(vec!["pk_1".to_string()]),
            "{backend}"
        );
        assert!(payload.unexpected_index_query.is_some(), "{backend}");
    }
    Ok(())
}

#[test]
fn test_value_counts_keep_first_seen_order_on_ties() -> anyhow::Result<()> {
    for (backend, validator, batch) in all_backends()? {
        let result = validator.validate_expectation(
            &batch,
            &animals_in_set(format("SUMMARY", &[])),
            &ValidationContext::new(),
        )?;
        let expected: Vec<PartialUnexpectedCount> = unexpected_animals()
            .into_iter()
            .map(|value| PartialUnexpectedCount { value, count: 1 })
            .collect();
        assert_eq!(result.result.partial_unexpected_counts, Some(expected), "{backend}");
    }
    Ok(())
}

#[test]
fn test_partial_unexpected_count_caps_partial_lists_only() -> anyhow::Result<()> {
    for (backend, validator, batch) in all_backends()? {
        let result_format = DetailedResultFormat {
            partial_unexpected_count: Some(1),
            ..format("COMPLETE", &["pk_1"])
        };
        let result = validator.validate_expectation(
            &batch,
            &animals_in_set(result_format),
            &ValidationContext::new(),
        )?;
        let payload = &result.result;

        assert_eq!(payload.partial_unexpected_list, Some(vec!["giraffe".into()]), "{backend}");
        assert_eq!(
            payload.partial_unexpected_index_list,
            Some(pk_1_records()[..1].to_vec()),
            "{backend}"
        );
        assert_eq!(payload.partial_unexpected_counts.as_ref().map(Vec::len), Some(1), "{backend}");
        assert_eq!(payload.unexpected_list.as_ref().map(Vec::len), Some(3), "{backend}");
        assert_eq!(payload.unexpected_index_list, Some(pk_1_records()), "{backend}");
    }
    Ok(())
}

#[test]
fn test_unknown_identifier_column_is_a_configuration_error() -> anyhow::Result<()> {
    for (backend, validator, batch) in all_backends()? {
        let err = validator
            .validate(
                &batch,
                &[animals_in_set(format("SUMMARY", &["i_dont_exist"]))],
                &ValidationContext::new(),
            )
            .unwrap_err();
        assert!(err.is_configuration(), "{backend}: {err}");
        assert!(err.to_string().contains("i_dont_exist"), "{backend}: {err}");
    }
    Ok(())
}

#[test]
fn test_unknown_identifier_column_is_rejected_at_every_level() -> anyhow::Result<()> {
    for (backend, validator, batch) in all_backends()? {
        for level in ["BOOLEAN_ONLY", "BASIC", "SUMMARY", "COMPLETE"] {
            let err = validator
                .validate(
                    &batch,
                    &[animals_in_set(format(level, &["pk_1", "i_dont_exist"]))],
                    &ValidationContext::new(),
                )
                .unwrap_err();
            assert!(err.is_configuration(), "{backend} at {level}: {err}");
            assert!(err.to_string().contains("i_dont_exist"), "{backend} at {level}: {err}");
        }
    }
    Ok(())
}

#[test]
fn test_named_index_is_a_valid_identifier_at_basic() -> anyhow::Result<()> {
    let (validator, batch) = in_process(&["pk_2"])?;
    let result = validator.validate_expectation(
        &batch,
        &animals_in_set(format("BASIC", &["pk_2"])),
        &ValidationContext::new(),
    )?;
    assert_eq!(
        result.result.unexpected_index_column_names,
        Some(vec!["pk_2".to_string()])
    );
    Ok(())
}

#[test]
fn test_nan_is_a_value_on_every_backend() -> anyhow::Result<()> {
    for (backend, validator, batch) in backends_over(float_record_batch())? {
        let bounded = validator.validate_expectation(
            &batch,
            &ExpectationBuilder::between("x", 0i64, 10i64)
                .result_format("COMPLETE")
                .build(),
            &ValidationContext::new(),
        )?;
        let payload = &bounded.result;
        assert_eq!(payload.element_count, Some(5), "{backend}");
        assert_eq!(payload.missing_count, Some(1), "{backend}");
        assert_eq!(payload.unexpected_count, Some(2), "{backend}");
        let unexpected = payload.unexpected_list.clone().unwrap_or_default();
        assert_eq!(unexpected.len(), 2, "{backend}");
        assert!(
            matches!(unexpected[0], DataValue::Float(f) if f.is_nan()),
            "{backend}: {unexpected:?}"
        );
        assert_eq!(unexpected[1], DataValue::Float(50.0), "{backend}");

        let lower_bound_only = validator.validate_expectation(
            &batch,
            &ExpectationBuilder::between("x", 0i64, DataValue::Null)
                .result_format("BASIC")
                .build(),
            &ValidationContext::new(),
        )?;
        assert!(lower_bound_only.success, "{backend}: NaN sorts above every number");
        assert_eq!(lower_bound_only.result.unexpected_count, Some(0), "{backend}");

        let not_null = validator.validate_expectation(
            &batch,
            &ExpectationBuilder::not_null("x").result_format("BASIC").build(),
            &ValidationContext::new(),
        )?;
        assert_eq!(not_null.result.unexpected_count, Some(1), "{backend}");
    }
    Ok(())
}

#[test]
fn test_regex_on_a_non_text_column_fails_on_every_backend() -> anyhow::Result<()> {
    for (backend, validator, batch) in all_backends()? {
        let report = validator.validate(
            &batch,
            &[
                ExpectationBuilder::match_regex("pk_1", "^[0-9]+$").build(),
                ExpectationBuilder::match_regex("animals", "^[a-z]+$").build(),
            ],
            &ValidationContext::new(),
        )?;

        let numeric = &report.results[0];
        assert!(!numeric.success, "{backend}");
        assert!(numeric.exception_info.raised_exception, "{backend}");
        assert!(
            numeric
                .exception_info
                .failed_metrics
                .iter()
                .any(|name| name.contains("match_regex")),
            "{backend}: {:?}",
            numeric.exception_info.failed_metrics
        );
        let message = numeric.exception_info.exception_message.clone().unwrap_or_default();
        assert!(message.contains("only text columns"), "{backend}: {message}");
        assert!(!report.results[1].exception_info.raised_exception, "{backend}");
        assert_eq!(report.results[1].result.element_count, Some(6), "{backend}");
    }
    Ok(())
}

#[test]
fn test_dataframe_from_another_session_keeps_row_order() -> anyhow::Result<()> {
    init_tracing();
    let ctx = SessionContext::new_with_config(SessionConfig::new().with_target_partitions(8));
    let batches = numbered_batches(200_000, 20);
    let schema = batches[0].schema();
    let single = MemTable::try_new(Arc::clone(&schema), vec![batches.clone()])?;
    let split = MemTable::try_new(
        schema,
        batches.chunks(5).map(<[_]>::to_vec).collect(),
    )?;

    let validator = Validator::new(DataFrameEngine::new()?);
    for (label, table) in [("one partition", single), ("four partitions", split)] {
        let batch = Batch::dataframe("numbers", ctx.read_table(Arc::new(table))?);
        let result = validator.validate_expectation(
            &batch,
            &ExpectationBuilder::between("id", 0i64, 99i64)
                .result_format("COMPLETE")
                .build(),
            &ValidationContext::new(),
        )?;
        let payload = &result.result;
        assert_eq!(payload.unexpected_count, Some(199_900), "{label}");
        let partial = payload.partial_unexpected_list.clone().unwrap_or_default();
        assert_eq!(partial.len(), 20, "{label}");
        assert!(is_natural_order(&partial, 100), "{label}: {partial:?}");
        let full = payload.unexpected_list.clone().unwrap_or_default();
        assert_eq!(full.len(), 199_900, "{label}");
        assert!(is_natural_order(&full, 100), "{label}");
    }
    Ok(())
}

#[test]
fn test_levels_only_add_fields() -> anyhow::Result<()> {
    for (backend, validator, batch) in all_backends()? {
        let mut previous: Vec<String> = Vec::new();
        for level in ["BOOLEAN_ONLY", "BASIC", "SUMMARY", "COMPLETE"] {
            let result = validator.validate_expectation(
                &batch,
                &animals_in_set(format(level, &["pk_1"])),
                &ValidationContext::new(),
            )?;
            let keys = result.result.keys();
            for key in &previous {
                assert!(keys.contains(key), "{backend}: {level} dropped {key}");
            }
            previous = keys;
        }
    }
    Ok(())
}

#[test]
fn test_boolean_only_and_basic_exclusions() -> anyhow::Result<()> {
    for (backend, validator, batch) in all_backends()? {
        let boolean_only = validator.validate_expectation(
            &batch,
            &animals_in_set(format("BOOLEAN_ONLY", &["pk_1"])),
            &ValidationContext::new(),
        )?;
        assert!(!boolean_only.success, "{backend}");
        assert!(boolean_only.result.is_empty(), "{backend}");

        let basic = validator.validate_expectation(
            &batch,
            &animals_in_set(format("BASIC", &["pk_1"])),
            &ValidationContext::new(),
        )?;
        let keys = basic.result.keys();
        for excluded in [
            "partial_unexpected_counts",
            "partial_unexpected_index_list",
            "unexpected_list",
            "unexpected_index_list",
            "unexpected_index_query",
            "unexpected_rows",
        ] {
            assert!(!keys.contains(&excluded.to_string()), "{backend}: BASIC has {excluded}");
        }
        assert!(keys.contains(&"unexpected_index_column_names".to_string()), "{backend}");
    }
    Ok(())
}

#[test]
fn test_validation_is_idempotent() -> anyhow::Result<()> {
    for (backend, validator, batch) in all_backends()? {
        let expectations = [
            animals_in_set(format("COMPLETE", &["pk_1"])),
            ExpectationBuilder::not_null("animals").build(),
        ];
        let first = validator.validate(&batch, &expectations, &ValidationContext::new())?;
        let second = validator.validate(&batch, &expectations, &ValidationContext::new())?;
        assert_eq!(first.results, second.results, "{backend}");
        assert_eq!(
            first.statistics.metrics_resolved,
            second.statistics.metrics_resolved,
            "{backend}"
        );
    }
    Ok(())
}

#[test]
fn test_unexpected_rows_are_opt_in() -> anyhow::Result<()> {
    for (backend, validator, batch) in all_backends()? {
        let without = validator.validate_expectation(
            &batch,
            &animals_in_set(format("COMPLETE", &[])),
            &ValidationContext::new(),
        )?;
        assert_eq!(without.result.unexpected_rows, None, "{backend}");

        let result_format = DetailedResultFormat {
            include_unexpected_rows: Some(true),
            ..format("COMPLETE", &[])
        };
        let with = validator.validate_expectation(
            &batch,
            &animals_in_set(result_format),
            &ValidationContext::new(),
        )?;
        let rows = with.result.unexpected_rows.unwrap_or_default();
        assert_eq!(rows.len(), 3, "{backend}");
        assert_eq!(rows[0].get("animals"), Some(&DataValue::from("giraffe")), "{backend}");
        assert_eq!(rows[0].get("pk_2"), Some(&DataValue::from("three")), "{backend}");
    }
    Ok(())
}

#[test]
fn test_audit_query_disabled() -> anyhow::Result<()> {
    for (backend, validator, batch) in all_backends()? {
        let result_format = DetailedResultFormat {
            return_unexpected_index_query: Some(false),
            ..format("COMPLETE", &["pk_1"])
        };
        let result = validator.validate_expectation(
            &batch,
            &animals_in_set(result_format),
            &ValidationContext::new(),
        )?;
        assert_eq!(result.result.unexpected_index_query, None, "{backend}");
        assert_eq!(result.result.unexpected_index_list, Some(pk_1_records()), "{backend}");
    }
    Ok(())
}

#[test]
fn test_relational_audit_query() -> anyhow::Result<()> {
    let (validator, batch, _) = relational(SqlDialect::Sqlite)?;
    let result = validator.validate_expectation(
        &batch,
        &animals_in_set(format("COMPLETE", &["pk_1"])),
        &ValidationContext::new(),
    )?;
    assert_eq!(
        result.result.unexpected_index_query,
        Some(UnexpectedIndexQuery::Text(
            "SELECT animals, pk_1 \nFROM animal_names \nWHERE animals IS NOT NULL AND (animals NOT IN ('cat', 'fish', 'dog'));"
                .to_string()
        ))
    );
    Ok(())
}

#[test]
fn test_relational_audit_query_without_identifiers() -> anyhow::Result<()> {
    let (validator, batch, _) = relational(SqlDialect::Postgresql)?;
    let result = validator.validate_expectation(
        &batch,
        &animals_in_set(format("COMPLETE", &[])),
        &ValidationContext::new(),
    )?;
    assert_eq!(result.result.unexpected_index_list, None);
    assert_eq!(
        result.result.unexpected_index_query,
        Some(UnexpectedIndexQuery::Text(
            "SELECT animals \nFROM animal_names \nWHERE animals IS NOT NULL AND (animals NOT IN ('cat', 'fish', 'dog'));"
                .to_string()
        ))
    );
    Ok(())
}

#[test]
fn test_dataframe_audit_query_is_a_filter() -> anyhow::Result<()> {
    let (validator, batch) = dataframe()?;
    let result = validator.validate_expectation(
        &batch,
        &animals_in_set(format("COMPLETE", &[])),
        &ValidationContext::new(),
    )?;
    assert_eq!(result.result.unexpected_index_list, None);
    let query = result.result.unexpected_index_query.unwrap();
    let text = query.as_text().unwrap_or_default();
    assert!(text.starts_with("df.filter("), "{text}");
    assert!(text.contains("animals"), "{text}");
    Ok(())
}

#[test]
fn test_in_process_positions_without_index() -> anyhow::Result<()> {
    let (validator, batch) = in_process(&[])?;
    let result = validator.validate_expectation(
        &batch,
        &animals_in_set(format("COMPLETE", &[])),
        &ValidationContext::new(),
    )?;
    assert_eq!(
        result.result.unexpected_index_list,
        Some(vec![
            UnexpectedIndexEntry::Position(3),
            UnexpectedIndexEntry::Position(4),
            UnexpectedIndexEntry::Position(5),
        ])
    );
    assert_eq!(
        result.result.unexpected_index_query,
        Some(UnexpectedIndexQuery::Indices(vec![
            DataValue::Int(3),
            DataValue::Int(4),
            DataValue::Int(5),
        ]))
    );
    Ok(())
}

#[test]
fn test_named_index_matches_configured_identifier() -> anyhow::Result<()> {
    let (validator, batch) = in_process(&["pk_1"])?;
    let implicit = validator.validate_expectation(
        &batch,
        &animals_in_set(format("SUMMARY", &[])),
        &ValidationContext::new(),
    )?;
    let explicit = validator.validate_expectation(
        &batch,
        &animals_in_set(format("SUMMARY", &["pk_1"])),
        &ValidationContext::new(),
    )?;

    assert_eq!(implicit.result.partial_unexpected_index_list, Some(pk_1_records()));
    assert_eq!(
        implicit.result.partial_unexpected_index_list,
        explicit.result.partial_unexpected_index_list
    );
    Ok(())
}

#[test]
fn test_multiple_named_indices() -> anyhow::Result<()> {
    let (validator, batch) = in_process(&["pk_1", "pk_2"])?;
    let result = validator.validate_expectation(
        &batch,
        &animals_in_set(format("COMPLETE", &[])),
        &ValidationContext::new(),
    )?;

    let expected: Vec<UnexpectedIndexEntry> = [("giraffe", 3, "three"), ("lion", 4, "four"), ("zebra", 5, "five")]
        .into_iter()
        .map(|(animal, pk_1, pk_2)| {
            record(&[
                ("animals", DataValue::from(animal)),
                ("pk_1", DataValue::Int(pk_1)),
                ("pk_2", DataValue::from(pk_2)),
            ])
        })
        .collect();
    assert_eq!(result.result.unexpected_index_list, Some(expected));
    assert_eq!(
        result.result.unexpected_index_query,
        Some(UnexpectedIndexQuery::Indices(vec![
            DataValue::List(vec![DataValue::Int(3), "three".into()]),
            DataValue::List(vec![DataValue::Int(4), "four".into()]),
            DataValue::List(vec![DataValue::Int(5), "five".into()]),
        ]))
    );
    Ok(())
}

#[test]
fn test_single_named_index_labels_rows() -> anyhow::Result<()> {
    let (validator, batch) = in_process(&["pk_2"])?;
    let result = validator.validate_expectation(
        &batch,
        &animals_in_set(format("COMPLETE", &[])),
        &ValidationContext::new(),
    )?;
    assert_eq!(
        result.result.unexpected_index_query,
        Some(UnexpectedIndexQuery::Indices(vec![
            "three".into(),
            "four".into(),
            "five".into(),
        ]))
    );
    Ok(())
}

#[test]
fn test_passing_expectation() -> anyhow::Result<()> {
    for (backend, validator, batch) in all_backends()? {
        let expectation = ExpectationBuilder::not_in_set("animals", vec!["unicorn"]).build();
        let report = validator.validate(&batch, &[expectation], &ValidationContext::new())?;
        assert!(report.success, "{backend}");
        assert_eq!(report.results[0].result.unexpected_count, Some(0), "{backend}");
        assert_eq!(report.results[0].result.partial_unexpected_list, Some(Vec::new()), "{backend}");
    }
    Ok(())
}

#[test]
fn test_empty_batch_has_null_percentages() -> anyhow::Result<()> {
    let table = Table::new(vec![("animals".to_string(), Vec::new())])?;
    let batch = Batch::in_process("empty", table);
    let validator = Validator::new(InProcessEngine::new());
    let result = validator.validate_expectation(
        &batch,
        &animals_in_set(format("BASIC", &[])),
        &ValidationContext::new(),
    )?;

    assert!(result.success);
    let payload = serde_json::to_value(&result.result)?;
    assert_eq!(payload["element_count"], serde_json::json!(0));
    assert_eq!(payload["unexpected_percent"], serde_json::Value::Null);
    assert_eq!(payload["missing_percent"], serde_json::Value::Null);
    assert!(payload.as_object().unwrap().contains_key("unexpected_percent"));
    Ok(())
}
