//! Statistical imputation methods.
//!
//! Provides mean, median and constant imputation for numeric columns.

use crate::error::{PrepError, Result};
use crate::types::{ActionType, PipelineAction, StageLog};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// How a column's missing values are filled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ImputeStrategy {
    Mean,
    Median,
    Constant(f64),
}

impl ImputeStrategy {
    fn name(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Constant(_) => "constant",
        }
    }
}

/// Statistical imputation methods for filling missing values.
pub struct StatisticalImputer;

impl StatisticalImputer {
    /// Compute the fill value of `series`. `None` when the statistic is
    /// undefined (every value missing).
    pub fn fit(series: &Series, strategy: ImputeStrategy) -> Result<Option<f64>> {
        let values = series.cast(&DataType::Float64)?;
        Ok(match strategy {
            ImputeStrategy::Mean => values.mean(),
            ImputeStrategy::Median => values.median(),
            ImputeStrategy::Constant(value) => Some(value),
        })
    }

    /// Fill the missing values of `col_name` in place and return the value used.
    ///
    /// A column with no observed values falls back to 0 with a warning.
    pub fn apply(
        df: &mut DataFrame,
        col_name: &str,
        strategy: ImputeStrategy,
        log: &mut StageLog,
    ) -> Result<f64> {
        let series = df
            .column(col_name)
            .map_err(|_| PrepError::ColumnNotFound(col_name.to_string()))?
            .as_materialized_series()
            .clone();

        let fill_value = match Self::fit(&series, strategy)? {
            Some(value) if value.is_finite() => value,
            Some(value) => {
                return Err(PrepError::ImputationFailed {
                    column: col_name.to_string(),
                    reason: format!("{} is not finite ({})", strategy.name(), value),
                });
            }
            None => {
                log.warn(format!(
                    "{}: no observed values for {} imputation, filled with 0",
                    col_name,
                    strategy.name()
                ));
                0.0
            }
        };

        let missing = series.null_count();
        Self::fill_with_value(df, col_name, fill_value, &series)?;

        if missing > 0 {
            log.record(
                PipelineAction::new(
                    ActionType::ValueImputed,
                    col_name,
                    format!("Filled with {}: {:.4}", strategy.name(), fill_value),
                )
                .with_details(format!("{} values imputed", missing)),
            );
        }
        Ok(fill_value)
    }

    /// Fill numeric column with a specific value.
    fn fill_with_value(df: &mut DataFrame, col_name: &str, fill_value: f64, series: &Series) -> Result<()> {
        let values = series.cast(&DataType::Float64)?;
        let result: Vec<f64> = values
            .f64()?
            .into_iter()
            .map(|v| v.unwrap_or(fill_value))
            .collect();
        df.with_column(Series::new(col_name.into(), result))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::numeric_values;

    #[test]
    fn test_mean_imputation() {
        let mut df = df![
            "values" => [Some(10.0), None, Some(20.0)],
        ]
        .unwrap();
        let mut log = StageLog::new();

        let fill = StatisticalImputer::apply(&mut df, "values", ImputeStrategy::Mean, &mut log).unwrap();

        assert_eq!(fill, 15.0);
        assert_eq!(
            numeric_values(&df, "values").unwrap(),
            vec![Some(10.0), Some(15.0), Some(20.0)]
        );
        assert!(log.actions[0].description.contains("mean"));
    }

    #[test]
    fn test_median_imputation() {
        let mut df = df![
            "values" => [Some(1.0), None, Some(3.0), None, Some(5.0), Some(100.0)],
        ]
        .unwrap();
        let mut log = StageLog::new();

        let fill = StatisticalImputer::apply(&mut df, "values", ImputeStrategy::Median, &mut log).unwrap();

        // Median of [1, 3, 5, 100] = 4
        assert_eq!(fill, 4.0);
        assert_eq!(df.column("values").unwrap().null_count(), 0);
    }

    #[test]
    fn test_constant_imputation_on_integers() {
        let mut df = df![
            "flag" => [Some(1i32), None, Some(0)],
        ]
        .unwrap();
        let mut log = StageLog::new();

        StatisticalImputer::apply(&mut df, "flag", ImputeStrategy::Constant(0.0), &mut log).unwrap();

        let flag = df.column("flag").unwrap();
        assert!(matches!(flag.dtype(), DataType::Float64));
        assert_eq!(
            numeric_values(&df, "flag").unwrap(),
            vec![Some(1.0), Some(0.0), Some(0.0)]
        );
    }

    #[test]
    fn test_all_missing_falls_back_to_zero() {
        let mut df = df![
            "values" => [Option::<f64>::None, None],
        ]
        .unwrap();
        let mut log = StageLog::new();

        let fill = StatisticalImputer::apply(&mut df, "values", ImputeStrategy::Mean, &mut log).unwrap();

        assert_eq!(fill, 0.0);
        assert_eq!(log.warnings.len(), 1);
    }

    #[test]
    fn test_no_missing_values_records_nothing() {
        let mut df = df!["values" => [1.0, 2.0]].unwrap();
        let mut log = StageLog::new();

        StatisticalImputer::apply(&mut df, "values", ImputeStrategy::Median, &mut log).unwrap();
        assert!(log.actions.is_empty());
    }

    #[test]
    fn test_nonexistent_column() {
        let mut df = df!["other" => [1.0]].unwrap();
        let err = StatisticalImputer::apply(&mut df, "values", ImputeStrategy::Mean, &mut StageLog::new())
            .unwrap_err();
        assert!(err.is_schema_error());
    }
}
