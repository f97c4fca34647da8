//! Cohort selection.
//!
//! Keeps autopsied subjects and removes those with an exclusion diagnosis.
//! A missing value never triggers an exclusion.

use crate::error::{PrepError, Result};
use crate::utils::{equals, filter_rows, is_in, numeric_values, require_columns};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Autopsy-performed flag; rows must equal 1.
pub const AUTOPSY_FLAG: &str = "NACCAUTP";

/// Exclusion flags where the code 1 means present.
pub const PRESENT_EXCLUSIONS: [&str; 3] = ["DOWNS", "HUNT", "PRION"];

/// Exclusion flags where 1/2/3 mean present, probable or possible.
pub const GRADED_EXCLUSIONS: [&str; 3] = ["MSAIF", "NEOPIF", "SCHIZOIF"];

const GRADED_CODES: [f64; 3] = [1.0, 2.0, 3.0];

/// Row counts removed by each criterion, in evaluation order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CohortStats {
    pub rows_in: usize,
    pub rows_out: usize,
    /// (criterion, rows removed), counting each row once at the first
    /// criterion that removed it.
    pub removed: Vec<(String, usize)>,
}

/// Selects eligible records.
pub struct CohortFilter;

impl CohortFilter {
    /// Every column the filter reads.
    pub fn required_columns() -> Vec<&'static str> {
        let mut columns = vec![AUTOPSY_FLAG];
        columns.extend(PRESENT_EXCLUSIONS);
        columns.extend(GRADED_EXCLUSIONS);
        columns
    }

    /// Filter `df`, preserving row order.
    ///
    /// Fails with a schema error when a criterion column is absent and with
    /// an empty-cohort error when nothing survives.
    pub fn apply(df: &DataFrame) -> Result<(DataFrame, CohortStats)> {
        require_columns(df, &Self::required_columns())?;

        let height = df.height();
        let mut keep = vec![true; height];
        let mut stats = CohortStats {
            rows_in: height,
            ..Default::default()
        };

        let autopsy = numeric_values(df, AUTOPSY_FLAG)?;
        let removed = Self::exclude(&mut keep, &autopsy, |v| !equals(v, 1.0));
        stats.removed.push((format!("{} != 1", AUTOPSY_FLAG), removed));

        for name in PRESENT_EXCLUSIONS {
            let values = numeric_values(df, name)?;
            let removed = Self::exclude(&mut keep, &values, |v| equals(v, 1.0));
            stats.removed.push((format!("{} == 1", name), removed));
        }

        for name in GRADED_EXCLUSIONS {
            let values = numeric_values(df, name)?;
            let removed = Self::exclude(&mut keep, &values, |v| is_in(v, &GRADED_CODES));
            stats.removed.push((format!("{} in (1, 2, 3)", name), removed));
        }

        for (criterion, count) in &stats.removed {
            debug!("Cohort criterion {}: removed {} rows", criterion, count);
        }

        let filtered = filter_rows(df, keep)?;
        stats.rows_out = filtered.height();
        if filtered.height() == 0 {
            return Err(PrepError::empty_cohort("cohort filter"));
        }

        info!(
            "Cohort filter kept {} of {} records",
            stats.rows_out, stats.rows_in
        );
        Ok((filtered, stats))
    }

    fn exclude(keep: &mut [bool], values: &[Option<f64>], excluded: impl Fn(Option<f64>) -> bool) -> usize {
        let mut removed = 0;
        for (flag, value) in keep.iter_mut().zip(values) {
            if *flag && excluded(*value) {
                *flag = false;
                removed += 1;
            }
        }
        removed
    }
}
