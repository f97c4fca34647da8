//! One-hot encoding for nominal variables.

use crate::error::{PrepError, Result};
use crate::utils::{format_code, is_numeric_dtype, numeric_values, string_values};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Category used for missing raw values.
pub const MISSING_CATEGORY: &str = "0";

/// Read a nominal column as category labels, missing coded as "0".
fn category_labels(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let column = df
        .column(name)
        .map_err(|_| PrepError::ColumnNotFound(name.to_string()))?;
    if is_numeric_dtype(column.dtype()) {
        Ok(numeric_values(df, name)?
            .into_iter()
            .map(|v| v.map(format_code).unwrap_or_else(|| MISSING_CATEGORY.to_string()))
            .collect())
    } else {
        Ok(string_values(df, name)?
            .into_iter()
            .map(|v| v.unwrap_or_else(|| MISSING_CATEGORY.to_string()))
            .collect())
    }
}

/// Numeric labels sort by value, anything else after them by text.
fn compare_labels(a: &String, b: &String) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Categories learned for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedColumn {
    pub name: String,
    pub categories: Vec<String>,
}

impl EncodedColumn {
    /// Output column names, `<VAR>_<category>`.
    pub fn output_names(&self) -> Vec<String> {
        self.categories
            .iter()
            .map(|category| format!("{}_{}", self.name, category))
            .collect()
    }
}

/// One-hot encoder. Categories are learned at fit time; a category not
/// seen then encodes as an all-zero row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OneHotEncoder {
    columns: Vec<EncodedColumn>,
}

impl OneHotEncoder {
    /// Learn the sorted categories of each named column.
    pub fn fit(df: &DataFrame, names: &[String]) -> Result<Self> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let distinct: BTreeSet<String> = category_labels(df, name)?.into_iter().collect();
            let mut categories: Vec<String> = distinct.into_iter().collect();
            categories.sort_by(compare_labels);
            columns.push(EncodedColumn {
                name: name.clone(),
                categories,
            });
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[EncodedColumn] {
        &self.columns
    }

    /// Number of output columns for `name`.
    pub fn cardinality(&self, name: &str) -> usize {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map_or(0, |c| c.categories.len())
    }

    /// Total number of output columns.
    pub fn width(&self) -> usize {
        self.columns.iter().map(|c| c.categories.len()).sum()
    }

    /// Encode the fitted columns of `df` into 0/1 `f64` columns.
    pub fn transform(&self, df: &DataFrame) -> Result<Vec<Column>> {
        let mut output = Vec::with_capacity(self.width());
        for encoded in &self.columns {
            let labels = category_labels(df, &encoded.name)?;
            for (category, name) in encoded.categories.iter().zip(encoded.output_names()) {
                let values: Vec<f64> = labels
                    .iter()
                    .map(|label| if label == category { 1.0 } else { 0.0 })
                    .collect();
                output.push(Column::new(name.into(), values));
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fit_sorts_categories_and_codes_missing_as_zero() {
        let df = df![
            "RACE" => [Some(2.0), Some(10.0), None, Some(2.0), Some(1.0)],
        ]
        .unwrap();
        let encoder = OneHotEncoder::fit(&df, &["RACE".to_string()]).unwrap();

        assert_eq!(encoder.columns()[0].categories, vec!["0", "1", "2", "10"]);
        assert_eq!(
            encoder.columns()[0].output_names(),
            vec!["RACE_0", "RACE_1", "RACE_2", "RACE_10"]
        );
        assert_eq!(encoder.width(), 4);
    }

    #[test]
    fn test_transform_rows_have_exactly_one_hot() {
        let df = df![
            "RACEX" => [Some("latino"), None, Some("chamorro")],
        ]
        .unwrap();
        let encoder = OneHotEncoder::fit(&df, &["RACEX".to_string()]).unwrap();
        let columns = encoder.transform(&df).unwrap();
        let encoded = DataFrame::new(columns).unwrap();

        assert_eq!(
            crate::utils::column_names(&encoded),
            vec!["RACEX_0", "RACEX_chamorro", "RACEX_latino"]
        );
        let row_sums: Vec<f64> = (0..encoded.height())
            .map(|row| {
                encoded
                    .get_columns()
                    .iter()
                    .map(|c| c.get(row).unwrap().try_extract::<f64>().unwrap())
                    .sum()
            })
            .collect();
        assert_eq!(row_sums, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_unseen_category_encodes_as_zeros() {
        let train = df!["SEX" => [1.0, 2.0]].unwrap();
        let other = df!["SEX" => [3.0]].unwrap();
        let encoder = OneHotEncoder::fit(&train, &["SEX".to_string()]).unwrap();

        let encoded = DataFrame::new(encoder.transform(&other).unwrap()).unwrap();
        assert_eq!(encoded.width(), 2);
        assert_eq!(numeric_values(&encoded, "SEX_1").unwrap(), vec![Some(0.0)]);
        assert_eq!(numeric_values(&encoded, "SEX_2").unwrap(), vec![Some(0.0)]);
    }
}
