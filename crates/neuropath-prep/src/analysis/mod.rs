//! Post-hoc error analysis of classifier predictions.
//!
//! Predictions are attached to their feature rows by position, joined 1:1
//! to the annotated pathology table on (`NACCID`, `VISITDATE`), and the
//! misclassified groups are cross-tabulated against recomputed ABC stages
//! and raw pathology indicators.

mod crosstab;

pub use crosstab::CrossTab;

use crate::config::SuppressionSemantics;
use crate::error::{PrepError, Result};
use crate::pathology::{CLASS_COLUMN, Indicator, evaluate_cascades, inclusion_cascades};
use crate::reconcile::derived::{SUBJECT_ID, VISIT_DATE};
use crate::staging::StagingRecomputer;
use crate::types::PathologyClass;
use crate::utils::{numeric_values, require_columns, string_values, take_rows};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// Zero-based predicted label column added by the join.
pub const PREDICTED_COLUMN: &str = "Predicted";
/// Zero-based true label column added by the join.
pub const LABEL_COLUMN: &str = "Label";

const AD_LABEL: i64 = 0;
const VASCULAR_LABEL: i64 = 4;
const ABC_STAGES: [&str; 4] = ["0", "1", "2", "3"];
const NON_AD_CLASSES: [PathologyClass; 4] = [
    PathologyClass::Tau,
    PathologyClass::Tdp,
    PathologyClass::LewyBody,
    PathologyClass::Vascular,
];

/// Vascular variables inspected for vascular false alarms, with row labels.
const VASCULAR_VARIABLES: [(&str, &str); 5] = [
    ("NPPVASC", "Primary vascular"),
    ("NPINF", "Old infarcts"),
    ("NACCMICR", "Microinfarcts"),
    ("NACCHEM", "Hemorrhages"),
    ("NPPATH", "Other vascular pathology"),
];
const UNASSESSED_CODES: [f64; 3] = [-4.0, 8.0, 9.0];

/// Classifier output consumed by the analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionBundle {
    /// Zero-based labels aligned with train rows followed by validation rows.
    pub predictions: Vec<i64>,
    #[serde(default)]
    pub selected_features: Vec<String>,
}

impl PredictionBundle {
    /// Reject labels outside `0..=4`.
    pub fn validate(&self) -> Result<()> {
        match self
            .predictions
            .iter()
            .position(|&label| PathologyClass::from_model_label(label).is_none())
        {
            Some(row) => Err(PrepError::InvalidPredictions(format!(
                "prediction {} at row {} is not a class label in 0..=4",
                self.predictions[row], row
            ))),
            None => Ok(()),
        }
    }
}

/// Tables produced by [`ErrorAnalyzer::analyze`].
#[derive(Debug, Clone, Serialize)]
pub struct ErrorAnalysis {
    pub rows: usize,
    pub confusion: CrossTab,
    /// Predicted AD, true non-AD: class x ABC stage.
    pub ad_false_alarms: CrossTab,
    /// Predicted non-AD, true AD: ABC stage distribution.
    pub non_ad_false_alarms: CrossTab,
    /// Predicted non-AD, true AD: other pathologies present by inclusion.
    pub non_ad_indicators: CrossTab,
    /// Predicted vascular, true non-vascular: raw vascular findings.
    pub vascular_false_alarms: CrossTab,
}

fn join_keys(df: &DataFrame) -> Result<Vec<(String, String)>> {
    require_columns(df, &[SUBJECT_ID, VISIT_DATE])?;
    let ids = string_values(df, SUBJECT_ID)?;
    let dates = string_values(df, VISIT_DATE)?;
    Ok(ids
        .into_iter()
        .zip(dates)
        .map(|(id, date)| (id.unwrap_or_default(), date.unwrap_or_default()))
        .collect())
}

fn labels(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    Ok(numeric_values(df, name)?
        .into_iter()
        .map(|v| v.map(|x| x as i64))
        .collect())
}

fn rows_where(predicted: &[Option<i64>], truth: &[Option<i64>], keep: impl Fn(i64, i64) -> bool) -> Vec<usize> {
    predicted
        .iter()
        .zip(truth)
        .enumerate()
        .filter_map(|(row, (p, t))| match (p, t) {
            (Some(p), Some(t)) if keep(*p, *t) => Some(row),
            _ => None,
        })
        .collect()
}

/// Builds the analysis table and its cross-tabulations.
pub struct ErrorAnalyzer;

impl ErrorAnalyzer {
    /// Attach `predictions` to `identifiers` by position and join the
    /// annotated table one-to-one on (`NACCID`, `VISITDATE`).
    ///
    /// A length mismatch, a duplicated key on either side or an unmatched
    /// key is a join-cardinality error.
    pub fn join(identifiers: &DataFrame, predictions: &[i64], annotated: &DataFrame) -> Result<DataFrame> {
        if identifiers.height() != predictions.len() {
            return Err(PrepError::JoinCardinality(format!(
                "{} predictions for {} analysis rows",
                predictions.len(),
                identifiers.height()
            )));
        }
        require_columns(annotated, &[CLASS_COLUMN])?;

        let mut annotated_index: HashMap<(String, String), usize> = HashMap::new();
        for (row, key) in join_keys(annotated)?.into_iter().enumerate() {
            if let Some(previous) = annotated_index.insert(key.clone(), row) {
                return Err(PrepError::JoinCardinality(format!(
                    "key ({}, {}) appears at rows {} and {} of the pathology table",
                    key.0, key.1, previous, row
                )));
            }
        }

        let mut seen: HashMap<(String, String), usize> = HashMap::new();
        let mut positions = Vec::with_capacity(predictions.len());
        for (row, key) in join_keys(identifiers)?.into_iter().enumerate() {
            if let Some(previous) = seen.insert(key.clone(), row) {
                return Err(PrepError::JoinCardinality(format!(
                    "key ({}, {}) appears at rows {} and {} of the analysis rows",
                    key.0, key.1, previous, row
                )));
            }
            match annotated_index.get(&key) {
                Some(&position) => positions.push(position),
                None => {
                    return Err(PrepError::JoinCardinality(format!(
                        "key ({}, {}) has no match in the pathology table",
                        key.0, key.1
                    )));
                }
            }
        }

        let mut joined = take_rows(annotated, &positions)?;
        joined.with_column(Series::new(PREDICTED_COLUMN.into(), predictions.to_vec()))?;
        let truth: Vec<Option<i64>> = labels(&joined, CLASS_COLUMN)?
            .into_iter()
            .map(|code| code.map(|c| c - 1))
            .collect();
        joined.with_column(Series::new(LABEL_COLUMN.into(), truth))?;

        info!("Joined {} predictions to the pathology table", joined.height());
        Ok(joined)
    }

    /// Cross-tabulate the joined table.
    pub fn analyze(joined: &DataFrame) -> Result<ErrorAnalysis> {
        let mut table = joined.clone();
        let scores = StagingRecomputer::annotate(&mut table)?;
        let predicted = labels(&table, PREDICTED_COLUMN)?;
        let truth = labels(&table, LABEL_COLUMN)?;

        let class_names: Vec<&str> = PathologyClass::RETAINED.iter().map(|c| c.short_name()).collect();
        let mut confusion = CrossTab::new("True class (rows) by predicted class (columns)", &class_names, &class_names);
        for (p, t) in predicted.iter().zip(&truth) {
            if let (Some(p), Some(t)) = (p, t) {
                confusion.increment(*t as usize, *p as usize);
            }
        }

        // (a) called AD, primarily something else
        let non_ad_names: Vec<&str> = NON_AD_CLASSES.iter().map(|c| c.short_name()).collect();
        let mut ad_false_alarms = CrossTab::new(
            "ABC stage of primary non-AD cases classified as AD",
            &non_ad_names,
            &ABC_STAGES,
        );
        for row in rows_where(&predicted, &truth, |p, t| p == AD_LABEL && t != AD_LABEL) {
            if let Some(t) = truth[row] {
                ad_false_alarms.increment((t - 1) as usize, scores[row].abc as usize);
            }
        }

        // (b) primarily AD, called something else
        let missed_ad = rows_where(&predicted, &truth, |p, t| p != AD_LABEL && t == AD_LABEL);
        let mut non_ad_false_alarms = CrossTab::new(
            "ABC stage of primary AD cases classified as non-AD",
            &[PathologyClass::Ad.short_name()],
            &ABC_STAGES,
        );
        for &row in &missed_ad {
            non_ad_false_alarms.increment(0, scores[row].abc as usize);
        }
        let non_ad_indicators = Self::indicator_presence(&table, &missed_ad)?;

        // (c) called vascular, primarily something else
        let vascular_rows = rows_where(&predicted, &truth, |p, t| p == VASCULAR_LABEL && t != VASCULAR_LABEL);
        let vascular_false_alarms = Self::vascular_findings(&table, &vascular_rows)?;

        Ok(ErrorAnalysis {
            rows: table.height(),
            confusion,
            ad_false_alarms,
            non_ad_false_alarms,
            non_ad_indicators,
            vascular_false_alarms,
        })
    }

    /// Non-AD indicators recomputed with inclusion rules only, as No/Yes.
    fn indicator_presence(table: &DataFrame, rows: &[usize]) -> Result<CrossTab> {
        let subset = take_rows(table, rows)?;
        let flags = evaluate_cascades(&subset, &inclusion_cascades(), SuppressionSemantics::Intended)?;

        let indicators = [Indicator::Tau, Indicator::Tdp, Indicator::Lewy, Indicator::Vascular];
        let names: Vec<&str> = indicators.iter().map(|i| i.class().short_name()).collect();
        let mut tab = CrossTab::new(
            "Other pathology present in primary AD cases classified as non-AD",
            &names,
            &["No", "Yes"],
        );
        for record in &flags {
            for (i, indicator) in indicators.iter().enumerate() {
                tab.increment(i, usize::from(record.get(*indicator)));
            }
        }
        Ok(tab)
    }

    /// Raw vascular findings with unassessed codes masked.
    fn vascular_findings(table: &DataFrame, rows: &[usize]) -> Result<CrossTab> {
        let names: Vec<&str> = VASCULAR_VARIABLES.iter().map(|(_, label)| *label).collect();
        let mut tab = CrossTab::new(
            "Vascular findings in cases misclassified as primarily vascular",
            &names,
            &["No", "Yes", "Missing", "Other"],
        );
        for (i, (variable, _)) in VASCULAR_VARIABLES.iter().enumerate() {
            let values = numeric_values(table, variable)?;
            for &row in rows {
                let mut value = values[row];
                // Contributing-only vascular pathology counts as "No"
                if *variable == "NPPVASC" && value == Some(2.0) {
                    value = Some(0.0);
                }
                let column = match value {
                    Some(v) if UNASSESSED_CODES.contains(&v) => 2,
                    None => 2,
                    Some(v) if v == 0.0 => 0,
                    Some(v) if v == 1.0 => 1,
                    Some(_) => 3,
                };
                tab.increment(i, column);
            }
        }
        Ok(tab)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathology::source_variables;
    use pretty_assertions::assert_eq;

    fn annotated() -> DataFrame {
        df![
            "NACCID" => ["A", "B", "C", "D", "E"],
            "VISITDATE" => ["2001-01-01", "2002-02-02", "2003-03-03", "2004-04-04", "2005-05-05"],
            "Class" => [1, 2, 1, 5, 4],
            "NPTHAL" => [Some(5.0), Some(1.0), Some(3.0), Some(0.0), Some(-4.0)],
            "NACCBRAA" => [Some(6.0), Some(2.0), Some(4.0), Some(0.0), None],
            "NACCNEUR" => [Some(3.0), Some(0.0), Some(2.0), Some(0.0), Some(8.0)],
        ]
        .unwrap()
    }

    fn with_sources(mut df: DataFrame) -> DataFrame {
        let height = df.height();
        for name in source_variables(&inclusion_cascades()) {
            df.with_column(Series::new(name.into(), vec![Option::<f64>::None; height]))
                .unwrap();
        }
        df
    }

    fn identifiers(ids: &[&str], dates: &[&str]) -> DataFrame {
        df![
            "NACCID" => ids,
            "VISITDATE" => dates,
        ]
        .unwrap()
    }

    #[test]
    fn test_join_aligns_by_key() {
        let ids = identifiers(&["C", "A"], &["2003-03-03", "2001-01-01"]);
        let joined = ErrorAnalyzer::join(&ids, &[1, 0], &annotated()).unwrap();

        assert_eq!(
            string_values(&joined, "NACCID").unwrap(),
            vec![Some("C".to_string()), Some("A".to_string())]
        );
        assert_eq!(labels(&joined, LABEL_COLUMN).unwrap(), vec![Some(0), Some(0)]);
        assert_eq!(labels(&joined, PREDICTED_COLUMN).unwrap(), vec![Some(1), Some(0)]);
    }

    #[test]
    fn test_join_cardinality_violations() {
        let ids = identifiers(&["A", "B"], &["2001-01-01", "2002-02-02"]);
        let err = ErrorAnalyzer::join(&ids, &[0], &annotated()).unwrap_err();
        assert_eq!(err.error_code(), "JOIN_CARDINALITY");

        let dup = identifiers(&["A", "A"], &["2001-01-01", "2001-01-01"]);
        let err = ErrorAnalyzer::join(&dup, &[0, 0], &annotated()).unwrap_err();
        assert_eq!(err.error_code(), "JOIN_CARDINALITY");

        let unmatched = identifiers(&["A", "Z"], &["2001-01-01", "2001-01-01"]);
        let err = ErrorAnalyzer::join(&unmatched, &[0, 0], &annotated()).unwrap_err();
        assert_eq!(err.error_code(), "JOIN_CARDINALITY");

        let doubled = annotated().vstack(&annotated().head(Some(1))).unwrap();
        let ids = identifiers(&["B"], &["2002-02-02"]);
        let err = ErrorAnalyzer::join(&ids, &[1], &doubled).unwrap_err();
        assert_eq!(err.error_code(), "JOIN_CARDINALITY");
    }

    #[test]
    fn test_crosstabs() {
        let mut pathology = with_sources(annotated());
        // C is AD but also carries a tauopathy marker
        let mut tau = vec![None; 5];
        tau[2] = Some(1.0);
        pathology.with_column(Series::new("NPTAU".into(), tau)).unwrap();
        let mut infarcts = vec![None; 5];
        infarcts[4] = Some(1.0);
        pathology.with_column(Series::new("NPINF".into(), infarcts)).unwrap();
        let mut primary = vec![None; 5];
        primary[4] = Some(2.0);
        pathology.with_column(Series::new("NPPVASC".into(), primary)).unwrap();

        let ids = identifiers(
            &["A", "B", "C", "D", "E"],
            &["2001-01-01", "2002-02-02", "2003-03-03", "2004-04-04", "2005-05-05"],
        );
        // A correct, B called AD, C called Tau, D correct, E called Vascular
        let joined = ErrorAnalyzer::join(&ids, &[0, 0, 1, 4, 4], &pathology).unwrap();
        let analysis = ErrorAnalyzer::analyze(&joined).unwrap();

        assert_eq!(analysis.rows, 5);
        assert_eq!(analysis.confusion.count(0, 0), 1);
        assert_eq!(analysis.confusion.count(1, 0), 1);
        assert_eq!(analysis.confusion.count(0, 1), 1);
        assert_eq!(analysis.confusion.total(), 5);

        // B: Tau with A=1, B=1, C=0 -> ABC 1
        assert_eq!(analysis.ad_false_alarms.count(0, 1), 1);
        assert_eq!(analysis.ad_false_alarms.total(), 1);

        // C: A=2, B=2, C=2 -> ABC 2, tau present by inclusion
        assert_eq!(analysis.non_ad_false_alarms.count(0, 2), 1);
        assert_eq!(analysis.non_ad_indicators.count(0, 1), 1);
        assert_eq!(analysis.non_ad_indicators.count(3, 0), 1);

        // E: NPPVASC 2 counts as No, NPINF yes, the rest missing
        assert_eq!(analysis.vascular_false_alarms.count(0, 0), 1);
        assert_eq!(analysis.vascular_false_alarms.count(1, 1), 1);
        assert_eq!(analysis.vascular_false_alarms.count(2, 2), 1);
    }

    #[test]
    fn test_bundle_validation() {
        let bundle: PredictionBundle =
            serde_json::from_str(r#"{"predictions": [0, 4, 2], "selected_features": ["NACCAGE"]}"#).unwrap();
        assert!(bundle.validate().is_ok());

        let bad = PredictionBundle {
            predictions: vec![0, 5],
            selected_features: vec![],
        };
        assert_eq!(bad.validate().unwrap_err().error_code(), "INVALID_PREDICTIONS");
    }
}
