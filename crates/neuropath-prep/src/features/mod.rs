//! Type-directed feature assembly.
//!
//! Kept predictors are partitioned by registry type tag and transformed per
//! group: Numeric is mean-imputed, Ordinal median-imputed, Boolean filled
//! with 0 and Nominal one-hot expanded. Identifier columns ride along in a
//! separate frame aligned by row.

pub mod encoding;

pub use encoding::OneHotEncoder;

use crate::error::Result;
use crate::imputers::{ImputeStrategy, StatisticalImputer};
use crate::pathology::{CLASS_COLUMN, NEUROPATH_VARIABLES, indicator_columns};
use crate::reconcile::derived::{SUBJECT_ID, VISIT_DATE};
use crate::registry::{VariableRegistry, VariableType};
use crate::types::{ActionType, PipelineAction, StageLog};
use crate::utils::{column_names, require_columns};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Columns carried in the identifier frame.
pub const IDENTIFIER_COLUMNS: [&str; 2] = [SUBJECT_ID, VISIT_DATE];

/// Predictors grouped by type, each in table column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictorSet {
    pub numeric: Vec<String>,
    pub ordinal: Vec<String>,
    pub boolean: Vec<String>,
    pub nominal: Vec<String>,
}

impl PredictorSet {
    pub fn len(&self) -> usize {
        self.numeric.len() + self.ordinal.len() + self.boolean.len() + self.nominal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numeric, Ordinal and Boolean predictors in table column order.
    pub fn numeric_like(&self, df: &DataFrame) -> Vec<String> {
        column_names(df)
            .into_iter()
            .filter(|name| {
                self.numeric.contains(name) || self.ordinal.contains(name) || self.boolean.contains(name)
            })
            .collect()
    }

    /// Every predictor, group by group.
    pub fn names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.len());
        for group in [&self.numeric, &self.ordinal, &self.boolean, &self.nominal] {
            names.extend(group.iter().cloned());
        }
        names
    }

    fn retain(&mut self, keep: impl Fn(&str) -> bool) {
        for group in [&mut self.numeric, &mut self.ordinal, &mut self.boolean, &mut self.nominal] {
            group.retain(|name| keep(name));
        }
    }
}

/// Output widths per group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupWidths {
    pub numeric: usize,
    pub ordinal: usize,
    pub boolean: usize,
    /// Sum of nominal cardinalities.
    pub nominal: usize,
}

impl GroupWidths {
    pub fn total(&self) -> usize {
        self.numeric + self.ordinal + self.boolean + self.nominal
    }
}

/// Final design matrix.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    /// `NACCID` and `VISITDATE`, row-aligned with `features`.
    pub identifiers: DataFrame,
    /// All-`f64`, no missing values.
    pub features: DataFrame,
    pub widths: GroupWidths,
    pub encoder: OneHotEncoder,
    /// Fill value per imputed column.
    pub fill_values: BTreeMap<String, f64>,
}

impl FeatureMatrix {
    /// Remove feature columns chosen outside the pipeline. Returns the
    /// names that were present and removed.
    pub fn drop_columns(&mut self, names: &[String]) -> Result<Vec<String>> {
        let present: Vec<String> = names
            .iter()
            .filter(|name| self.features.column(name.as_str()).is_ok())
            .cloned()
            .collect();
        for name in &present {
            self.features = self.features.drop(name)?;
        }
        Ok(present)
    }

    /// Identifiers followed by features, as one frame.
    pub fn combined(&self) -> Result<DataFrame> {
        let mut columns: Vec<Column> = self.identifiers.get_columns().to_vec();
        columns.extend(self.features.get_columns().iter().cloned());
        Ok(DataFrame::new(columns)?)
    }
}

/// Builds the feature matrix from the normalized table.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    min_observations: usize,
}

impl FeatureBuilder {
    pub fn new(min_observations: usize) -> Self {
        Self { min_observations }
    }

    /// Kept, typed predictor columns of `df`.
    ///
    /// Identifier-typed variables, neuropathology variables and the label
    /// columns never become predictors. A kept column without a type tag
    /// is left out with a warning.
    pub fn select_predictors(&self, df: &DataFrame, registry: &VariableRegistry, log: &mut StageLog) -> PredictorSet {
        let indicators = indicator_columns();
        let mut predictors = PredictorSet::default();
        for name in column_names(df) {
            let is_label = name == CLASS_COLUMN
                || indicators.contains(&name.as_str())
                || NEUROPATH_VARIABLES.contains(&name.as_str());
            if is_label || !registry.is_kept(&name) {
                continue;
            }
            match registry.type_of(&name) {
                Some(VariableType::Numeric) => predictors.numeric.push(name),
                Some(VariableType::Ordinal) => predictors.ordinal.push(name),
                Some(VariableType::Boolean) => predictors.boolean.push(name),
                Some(VariableType::Nominal) => predictors.nominal.push(name),
                Some(VariableType::Id) => {}
                None => log.warn(format!("{}: kept but has no type tag, not used as a feature", name)),
            }
        }
        debug!(
            "Predictors: {} numeric, {} ordinal, {} boolean, {} nominal",
            predictors.numeric.len(),
            predictors.ordinal.len(),
            predictors.boolean.len(),
            predictors.nominal.len()
        );
        predictors
    }

    /// Drop predictors with fewer than `min_observations` non-missing values.
    pub fn drop_sparse(&self, df: &DataFrame, predictors: &mut PredictorSet, log: &mut StageLog) -> Vec<String> {
        let sparse: Vec<String> = predictors
            .names()
            .into_iter()
            .filter(|name| {
                df.column(name)
                    .map(|column| column.len() - column.null_count() < self.min_observations)
                    .unwrap_or(true)
            })
            .collect();
        predictors.retain(|name| !sparse.iter().any(|s| s == name));

        if !sparse.is_empty() {
            log.record(
                PipelineAction::new(
                    ActionType::ColumnRemoved,
                    "predictors",
                    format!(
                        "Dropped {} predictors with fewer than {} observations",
                        sparse.len(),
                        self.min_observations
                    ),
                )
                .with_details(sparse.join(", ")),
            );
        }
        sparse
    }

    /// Impute and encode `predictors` into a feature matrix.
    pub fn build(&self, df: &DataFrame, predictors: &PredictorSet, log: &mut StageLog) -> Result<FeatureMatrix> {
        require_columns(df, &IDENTIFIER_COLUMNS)?;
        let identifiers = df.select(IDENTIFIER_COLUMNS)?;

        let mut working = df.clone();
        let mut fill_values = BTreeMap::new();
        let groups = [
            (&predictors.boolean, ImputeStrategy::Constant(0.0)),
            (&predictors.numeric, ImputeStrategy::Mean),
            (&predictors.ordinal, ImputeStrategy::Median),
        ];
        let mut columns: Vec<Column> = Vec::with_capacity(predictors.len());
        for (group, strategy) in groups {
            for name in group.iter() {
                let fill = StatisticalImputer::apply(&mut working, name, strategy, log)?;
                fill_values.insert(name.clone(), fill);
                columns.push(working.column(name)?.clone());
            }
        }

        let encoder = OneHotEncoder::fit(&working, &predictors.nominal)?;
        columns.extend(encoder.transform(&working)?);
        if !predictors.nominal.is_empty() {
            log.record(PipelineAction::new(
                ActionType::CategoriesEncoded,
                "predictors",
                format!(
                    "One-hot encoded {} nominal variables into {} columns",
                    predictors.nominal.len(),
                    encoder.width()
                ),
            ));
        }

        let widths = GroupWidths {
            numeric: predictors.numeric.len(),
            ordinal: predictors.ordinal.len(),
            boolean: predictors.boolean.len(),
            nominal: encoder.width(),
        };
        let features = if columns.is_empty() {
            DataFrame::empty_with_height(df.height())
        } else {
            DataFrame::new(columns)?
        };

        info!(
            "Feature matrix: {} rows x {} columns",
            features.height(),
            features.width()
        );
        Ok(FeatureMatrix {
            identifiers,
            features,
            widths,
            encoder,
            fill_values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::VariableSpec;
    use crate::utils::{has_column, numeric_values};
    use pretty_assertions::assert_eq;

    fn registry() -> VariableRegistry {
        VariableRegistry::from_specs(vec![
            VariableSpec::new("NACCID", VariableType::Id),
            VariableSpec::new("VISITDATE", VariableType::Id),
            VariableSpec::new("NACCAGE", VariableType::Numeric),
            VariableSpec::new("CDRGLOB", VariableType::Ordinal),
            VariableSpec::new("TOBAC30", VariableType::Boolean),
            VariableSpec::new("RACE", VariableType::Nominal),
            VariableSpec::new("SEX", VariableType::Nominal),
            VariableSpec::new("SPARSE", VariableType::Numeric),
            VariableSpec::new("NPTHAL", VariableType::Ordinal),
            VariableSpec {
                var_type: None,
                ..VariableSpec::new("UNTYPED", VariableType::Numeric)
            },
        ])
        .unwrap()
    }

    fn frame() -> DataFrame {
        df![
            "NACCID" => ["A", "B", "C", "D"],
            "VISITDATE" => ["2001-01-01", "2002-01-01", "2003-01-01", "2004-01-01"],
            "NACCAGE" => [Some(70.0), None, Some(80.0), Some(90.0)],
            "CDRGLOB" => [Some(0.5), Some(1.0), None, Some(3.0)],
            "TOBAC30" => [Some(1.0), None, Some(0.0), None],
            "RACE" => [Some(1.0), Some(2.0), None, Some(1.0)],
            "SEX" => [1.0, 2.0, 2.0, 1.0],
            "SPARSE" => [Some(1.0), None, None, None],
            "NPTHAL" => [1.0, 2.0, 3.0, 4.0],
            "UNTYPED" => [1.0, 2.0, 3.0, 4.0],
            "Class" => [1, 2, 3, 5],
            "ADPath" => [1, 0, 0, 0],
        ]
        .unwrap()
    }

    #[test]
    fn test_select_excludes_ids_labels_and_untyped() {
        let mut log = StageLog::new();
        let predictors = FeatureBuilder::new(2).select_predictors(&frame(), &registry(), &mut log);

        assert_eq!(predictors.numeric, vec!["NACCAGE", "SPARSE"]);
        assert_eq!(predictors.ordinal, vec!["CDRGLOB"]);
        assert_eq!(predictors.boolean, vec!["TOBAC30"]);
        assert_eq!(predictors.nominal, vec!["RACE", "SEX"]);
        assert_eq!(log.warnings.len(), 1);
    }

    #[test]
    fn test_drop_sparse() {
        let builder = FeatureBuilder::new(2);
        let df = frame();
        let mut log = StageLog::new();
        let mut predictors = builder.select_predictors(&df, &registry(), &mut log);

        builder.drop_sparse(&df, &mut predictors, &mut log);
        assert_eq!(predictors.numeric, vec!["NACCAGE"]);
        assert_eq!(predictors.boolean, vec!["TOBAC30"]);
    }

    #[test]
    fn test_width_is_sum_of_group_widths() {
        let builder = FeatureBuilder::new(2);
        let df = frame();
        let mut log = StageLog::new();
        let mut predictors = builder.select_predictors(&df, &registry(), &mut log);
        builder.drop_sparse(&df, &mut predictors, &mut log);

        let matrix = builder.build(&df, &predictors, &mut log).unwrap();

        // 1 numeric + 1 ordinal + 1 boolean + RACE {0,1,2} + SEX {1,2}
        assert_eq!(matrix.widths.nominal, 5);
        assert_eq!(matrix.features.width(), matrix.widths.total());
        assert_eq!(matrix.features.width(), 8);
        assert_eq!(matrix.identifiers.width(), 2);
        assert_eq!(matrix.features.height(), 4);
        assert!(!has_column(&matrix.features, "Class"));
        assert!(!has_column(&matrix.features, "NPTHAL"));
    }

    #[test]
    fn test_imputation_by_type() {
        let builder = FeatureBuilder::new(2);
        let df = frame();
        let mut log = StageLog::new();
        let mut predictors = builder.select_predictors(&df, &registry(), &mut log);
        builder.drop_sparse(&df, &mut predictors, &mut log);

        let matrix = builder.build(&df, &predictors, &mut log).unwrap();

        assert_eq!(
            numeric_values(&matrix.features, "NACCAGE").unwrap(),
            vec![Some(70.0), Some(80.0), Some(80.0), Some(90.0)]
        );
        assert_eq!(
            numeric_values(&matrix.features, "CDRGLOB").unwrap(),
            vec![Some(0.5), Some(1.0), Some(1.0), Some(3.0)]
        );
        assert_eq!(
            numeric_values(&matrix.features, "TOBAC30").unwrap(),
            vec![Some(1.0), Some(0.0), Some(0.0), Some(0.0)]
        );
        assert_eq!(
            numeric_values(&matrix.features, "RACE_0").unwrap(),
            vec![Some(0.0), Some(0.0), Some(1.0), Some(0.0)]
        );
    }

    #[test]
    fn test_manual_drops_and_combined() {
        let builder = FeatureBuilder::new(2);
        let df = frame();
        let mut log = StageLog::new();
        let mut predictors = builder.select_predictors(&df, &registry(), &mut log);
        builder.drop_sparse(&df, &mut predictors, &mut log);
        let mut matrix = builder.build(&df, &predictors, &mut log).unwrap();

        let dropped = matrix
            .drop_columns(&["NACCAGE".to_string(), "ABSENT".to_string()])
            .unwrap();
        assert_eq!(dropped, vec!["NACCAGE"]);

        let combined = matrix.combined().unwrap();
        assert_eq!(column_names(&combined)[..2], ["NACCID", "VISITDATE"]);
        assert_eq!(combined.width(), 9);
    }
}
