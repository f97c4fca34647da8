//! Shared utilities for the preparation pipeline.
//!
//! Stages work one column at a time: a column is pulled out as
//! `Vec<Option<f64>>` (missing = `None`), transformed in plain Rust, and
//! written back. These helpers keep that round trip in one place.

use crate::error::{PrepError, Result};
use polars::prelude::*;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

// =============================================================================
// Column Access
// =============================================================================

/// Names of all columns, owned.
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|s| s.to_string()).collect()
}

/// Check whether a column exists.
pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.column(name).is_ok()
}

/// Fail with a schema error naming the first absent column.
pub fn require_columns(df: &DataFrame, names: &[&str]) -> Result<()> {
    match names.iter().find(|name| !has_column(df, name)) {
        Some(missing) => Err(PrepError::ColumnNotFound(missing.to_string())),
        None => Ok(()),
    }
}

/// Read a column as optional floats. Non-numeric text becomes missing.
pub fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|_| PrepError::ColumnNotFound(name.to_string()))?;
    let series = column.as_materialized_series().cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}

/// Read a column as optional strings.
pub fn string_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df
        .column(name)
        .map_err(|_| PrepError::ColumnNotFound(name.to_string()))?;
    let series = column.as_materialized_series().cast(&DataType::String)?;
    Ok(series
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Add or replace a Float64 column.
pub fn set_numeric(df: &mut DataFrame, name: &str, values: Vec<Option<f64>>) -> Result<()> {
    df.with_column(Series::new(name.into(), values))?;
    Ok(())
}

/// Add or replace a String column.
pub fn set_string(df: &mut DataFrame, name: &str, values: Vec<Option<String>>) -> Result<()> {
    df.with_column(Series::new(name.into(), values))?;
    Ok(())
}

/// Keep the rows whose mask entry is true, preserving order.
pub fn filter_rows(df: &DataFrame, keep: Vec<bool>) -> Result<DataFrame> {
    let mask = Series::new("keep".into(), keep);
    Ok(df.filter(mask.bool()?)?)
}

/// Gather rows by position, in the given order.
pub fn take_rows(df: &DataFrame, rows: &[usize]) -> Result<DataFrame> {
    let idx = IdxCa::from_vec(
        "idx".into(),
        rows.iter().map(|&row| row as IdxSize).collect(),
    );
    Ok(df.take(&idx)?)
}

/// Drop the named columns that exist; absent names are ignored.
pub fn drop_existing(df: DataFrame, names: &[String]) -> DataFrame {
    let present: Vec<PlSmallStr> = names
        .iter()
        .filter(|name| has_column(&df, name))
        .map(|name| name.as_str().into())
        .collect();
    if present.is_empty() {
        df
    } else {
        df.drop_many(present)
    }
}

// =============================================================================
// Code Comparisons
// =============================================================================

/// `value == code`; missing never matches.
#[inline]
pub fn equals(value: Option<f64>, code: f64) -> bool {
    value == Some(code)
}

/// `value != code`; missing always differs.
#[inline]
pub fn differs(value: Option<f64>, code: f64) -> bool {
    value != Some(code)
}

/// `value ∈ codes`; missing is never a member.
#[inline]
pub fn is_in(value: Option<f64>, codes: &[f64]) -> bool {
    value.is_some_and(|v| codes.contains(&v))
}

/// Render a code for labels: integral values print without a fraction.
pub fn format_code(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_comparisons() {
        assert!(equals(Some(1.0), 1.0));
        assert!(!equals(None, 1.0));
        assert!(differs(None, 1.0));
        assert!(!differs(Some(1.0), 1.0));
        assert!(is_in(Some(2.0), &[2.0, 3.0]));
        assert!(!is_in(None, &[2.0, 3.0]));
    }

    #[test]
    fn test_format_code() {
        assert_eq!(format_code(3.0), "3");
        assert_eq!(format_code(-4.0), "-4");
        assert_eq!(format_code(1.5), "1.5");
    }

    #[test]
    fn test_numeric_round_trip_and_require() {
        let mut df = df![
            "A" => [Some(1i64), None, Some(3)],
            "B" => ["x", "y", "z"],
        ]
        .unwrap();

        assert_eq!(numeric_values(&df, "A").unwrap(), vec![Some(1.0), None, Some(3.0)]);
        // Text that cannot be parsed is treated as missing
        assert_eq!(numeric_values(&df, "B").unwrap(), vec![None, None, None]);

        set_numeric(&mut df, "C", vec![Some(0.5), Some(1.5), None]).unwrap();
        assert_eq!(df.width(), 3);

        assert!(require_columns(&df, &["A", "C"]).is_ok());
        let err = require_columns(&df, &["A", "MISSING"]).unwrap_err();
        assert!(matches!(err, PrepError::ColumnNotFound(ref c) if c == "MISSING"));
    }

    #[test]
    fn test_filter_and_take_rows() {
        let df = df!["A" => [1.0, 2.0, 3.0, 4.0]].unwrap();

        let filtered = filter_rows(&df, vec![true, false, true, false]).unwrap();
        assert_eq!(numeric_values(&filtered, "A").unwrap(), vec![Some(1.0), Some(3.0)]);

        let taken = take_rows(&df, &[3, 0]).unwrap();
        assert_eq!(numeric_values(&taken, "A").unwrap(), vec![Some(4.0), Some(1.0)]);
    }
}
