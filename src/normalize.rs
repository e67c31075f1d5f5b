//! Rescaling of rate metrics to a 0–100 percentage scale.
//!
//! The Scorecard API reports rates as fractions (`0.42`), but the exported
//! data is easier to read as percentages (`42.0`). Whether a column needs
//! scaling is decided by looking at its values: if every present value lies
//! in `[0, 1]` the column is treated as fractional. This is a heuristic: a
//! percentage column whose values all happen to be at most 1 would be scaled
//! too.

use serde_json::Value;

use crate::metrics::{Metric, MetricRow};

/// Metrics reported by the API as fractions.
pub const DEFAULT_PERCENTAGE_FIELDS: &[Metric] = &[
    Metric::AdmissionRate,
    Metric::RetentionRateFt,
    Metric::GradRate150,
];

/// Coerces a JSON value to a number. Numbers pass through, numeric strings
/// are parsed, and anything else (null, text, objects) becomes missing.
pub fn coerce_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Rounds to two decimal places, ties away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Returns a copy of `rows` with each of `fields` rescaled.
///
/// For each field independently: if all present values are within `[0, 1]`
/// they are multiplied by 100, then every present value is rounded to two
/// decimals. Fields with no present values are left untouched.
pub fn normalize_percentages(rows: &[MetricRow], fields: &[Metric]) -> Vec<MetricRow> {
    let mut out = rows.to_vec();

    for &field in fields {
        let present: Vec<f64> = out.iter().filter_map(|r| r.get(field)).collect();
        if present.is_empty() {
            continue;
        }

        let fractional = present.iter().all(|v| (0.0..=1.0).contains(v));
        let scale = if fractional { 100.0 } else { 1.0 };

        for row in &mut out {
            let value = row.get(field).map(|v| round2(v * scale));
            row.set(field, value);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rates(values: &[Option<f64>]) -> Vec<MetricRow> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut row = MetricRow::new("School", i as i64 + 1, 2020);
                row.admission_rate = *v;
                row
            })
            .collect()
    }

    fn admission(rows: &[MetricRow]) -> Vec<Option<f64>> {
        rows.iter().map(|r| r.admission_rate).collect()
    }

    #[test]
    fn test_converts_fractions_to_percentages() {
        let mut rows = rates(&[Some(0.5), Some(0.25), Some(0.1)]);
        rows[0].retention_rate_ft = Some(0.9);
        rows[1].retention_rate_ft = Some(0.85);
        rows[2].retention_rate_ft = Some(0.95);

        let out = normalize_percentages(&rows, DEFAULT_PERCENTAGE_FIELDS);

        assert_eq!(admission(&out), vec![Some(50.0), Some(25.0), Some(10.0)]);
        let retention: Vec<_> = out.iter().map(|r| r.retention_rate_ft).collect();
        assert_eq!(retention, vec![Some(90.0), Some(85.0), Some(95.0)]);
    }

    #[test]
    fn test_rounds_to_two_decimal_places() {
        let rows = rates(&[Some(0.12344), Some(0.98766), Some(0.33333)]);
        let out = normalize_percentages(&rows, DEFAULT_PERCENTAGE_FIELDS);
        assert_eq!(admission(&out), vec![Some(12.34), Some(98.77), Some(33.33)]);
    }

    #[test]
    fn test_values_outside_unit_range_are_only_rounded() {
        let rows = rates(&[Some(50.123), Some(25.456), Some(-1.0)]);
        let out = normalize_percentages(&rows, DEFAULT_PERCENTAGE_FIELDS);
        assert_eq!(admission(&out), vec![Some(50.12), Some(25.46), Some(-1.0)]);
    }

    #[test]
    fn test_missing_values_stay_missing() {
        let rows = rates(&[Some(0.5), None, Some(0.3)]);
        let out = normalize_percentages(&rows, DEFAULT_PERCENTAGE_FIELDS);
        assert_eq!(admission(&out), vec![Some(50.0), None, Some(30.0)]);
    }

    #[test]
    fn test_boundary_values_count_as_fractions() {
        let rows = rates(&[Some(0.0), Some(1.0), Some(0.5)]);
        let out = normalize_percentages(&rows, DEFAULT_PERCENTAGE_FIELDS);
        assert_eq!(admission(&out), vec![Some(0.0), Some(100.0), Some(50.0)]);
    }

    #[test]
    fn test_input_is_not_modified() {
        let rows = rates(&[Some(0.5), Some(0.25)]);
        let _ = normalize_percentages(&rows, DEFAULT_PERCENTAGE_FIELDS);
        assert_eq!(admission(&rows), vec![Some(0.5), Some(0.25)]);
    }

    #[test]
    fn test_only_designated_fields_are_touched() {
        let mut rows = rates(&[Some(0.9), Some(0.8)]);
        rows[0].tuition_fees = Some(0.5);
        rows[1].tuition_fees = Some(0.25);

        let out = normalize_percentages(&rows, &[Metric::TuitionFees]);

        let tuition: Vec<_> = out.iter().map(|r| r.tuition_fees).collect();
        assert_eq!(tuition, vec![Some(50.0), Some(25.0)]);
        assert_eq!(admission(&out), vec![Some(0.9), Some(0.8)]);
    }

    #[test]
    fn test_all_missing_field_is_skipped() {
        let rows = rates(&[Some(0.5), Some(0.25)]);
        let out = normalize_percentages(&rows, DEFAULT_PERCENTAGE_FIELDS);
        assert!(out.iter().all(|r| r.grad_rate_150.is_none()));
    }

    #[test]
    fn test_empty_table() {
        let out = normalize_percentages(&[], DEFAULT_PERCENTAGE_FIELDS);
        assert!(out.is_empty());
    }

    #[test]
    fn test_coerce_numeric() {
        assert_eq!(coerce_numeric(&json!(0.5)), Some(0.5));
        assert_eq!(coerce_numeric(&json!(1234)), Some(1234.0));
        assert_eq!(coerce_numeric(&json!("0.3")), Some(0.3));
        assert_eq!(coerce_numeric(&json!("bad")), None);
        assert_eq!(coerce_numeric(&json!(null)), None);
        assert_eq!(coerce_numeric(&json!({"a": 1})), None);
    }
}
