//! Redundancy detection.
//!
//! Surfaces predictor pairs whose absolute Pearson correlation exceeds the
//! threshold. Choosing which member of a pair to drop is left to the
//! analyst; see `PipelineConfig::manual_drops`.

use crate::error::Result;
use crate::types::{ActionType, PipelineAction, StageLog};
use crate::utils::numeric_values;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

/// A flagged pair, `first` preceding `second` in column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedundantPair {
    pub first: String,
    pub second: String,
    pub r: f64,
}

/// Pearson correlation over rows where both values are present.
/// `None` with fewer than two such rows or zero variance on either side.
pub fn pairwise_pearson(x: &[Option<f64>], y: &[Option<f64>]) -> Option<f64> {
    let (a, b): (Vec<f64>, Vec<f64>) = x
        .iter()
        .zip(y)
        .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
        .unzip();
    if a.len() < 2 {
        return None;
    }

    let a = Float64Chunked::from_vec("x".into(), a);
    let b = Float64Chunked::from_vec("y".into(), b);
    // NaN when either side has zero variance
    cov::pearson_corr(&a, &b).filter(|r| r.is_finite())
}

/// Flags highly correlated predictor pairs.
#[derive(Debug, Clone)]
pub struct RedundancyPruner {
    threshold: f64,
}

impl RedundancyPruner {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Every pair `(i, j)`, `i < j` in the order of `columns`, with
    /// `|r| > threshold`. The output order is deterministic.
    pub fn find_pairs(&self, df: &DataFrame, columns: &[String], log: &mut StageLog) -> Result<Vec<RedundantPair>> {
        let values: Vec<Vec<Option<f64>>> = columns
            .iter()
            .map(|name| numeric_values(df, name))
            .collect::<Result<_>>()?;

        let mut pairs = Vec::new();
        for i in 0..columns.len() {
            for j in (i + 1)..columns.len() {
                let Some(r) = pairwise_pearson(&values[i], &values[j]) else {
                    continue;
                };
                if r.abs() > self.threshold {
                    pairs.push(RedundantPair {
                        first: columns[i].clone(),
                        second: columns[j].clone(),
                        r,
                    });
                }
            }
        }

        info!(
            "Redundancy check over {} predictors flagged {} pairs",
            columns.len(),
            pairs.len()
        );
        if !pairs.is_empty() {
            let listed: Vec<String> = pairs
                .iter()
                .map(|p| format!("{}~{} ({:.3})", p.first, p.second, p.r))
                .collect();
            log.record(
                PipelineAction::new(
                    ActionType::RedundancyFlagged,
                    "predictors",
                    format!("{} pairs with |r| > {}", pairs.len(), self.threshold),
                )
                .with_details(listed.join(", ")),
            );
        }
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Columns with a known correlation to `base`.
    fn correlated_frame() -> DataFrame {
        // base and noise are orthogonal with equal variance, so
        // r(base, base + k * noise) = 1 / sqrt(1 + k^2)
        let base = [1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0];
        let noise = [1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0, -1.0];
        let strong: Vec<f64> = base
            .iter()
            .zip(&noise)
            .map(|(b, n)| b + n * (1.0f64 / 0.95 / 0.95 - 1.0).sqrt())
            .collect();
        let weak: Vec<f64> = base.iter().zip(&noise).map(|(b, n)| b + n * 3.0f64.sqrt()).collect();
        df![
            "BASE" => base,
            "STRONG" => strong,
            "WEAK" => weak,
        ]
        .unwrap()
    }

    #[test]
    fn test_strong_pair_flagged_weak_pair_not() {
        let df = correlated_frame();
        let columns = vec!["BASE".to_string(), "STRONG".to_string(), "WEAK".to_string()];
        let pairs = RedundancyPruner::new(0.8)
            .find_pairs(&df, &columns, &mut StageLog::new())
            .unwrap();

        let names: Vec<(&str, &str)> = pairs
            .iter()
            .map(|p| (p.first.as_str(), p.second.as_str()))
            .collect();
        assert!(names.contains(&("BASE", "STRONG")));
        assert!(!names.contains(&("BASE", "WEAK")));
        let strong = pairs.iter().find(|p| p.second == "STRONG").unwrap();
        assert!((strong.r - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_pearson_values() {
        let base = [Some(1.0), Some(-1.0), Some(1.0), Some(-1.0)];
        let half = [Some(1.0), Some(1.0), Some(-1.0), Some(-1.0)];
        assert!((pairwise_pearson(&base, &base).unwrap() - 1.0).abs() < 1e-12);
        assert!(pairwise_pearson(&base, &half).unwrap().abs() < 1e-12);

        let negated: Vec<Option<f64>> = base.iter().map(|v| v.map(|x| -x)).collect();
        assert!((pairwise_pearson(&base, &negated).unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pairwise_complete_and_constant_columns() {
        let x = [Some(1.0), Some(2.0), None, Some(4.0)];
        let y = [Some(2.0), Some(4.0), Some(100.0), Some(8.0)];
        assert!((pairwise_pearson(&x, &y).unwrap() - 1.0).abs() < 1e-12);

        let constant = [Some(5.0), Some(5.0), Some(5.0), Some(5.0)];
        assert_eq!(pairwise_pearson(&x, &constant), None);
        assert_eq!(pairwise_pearson(&[Some(1.0)], &[Some(1.0)]), None);
    }

    #[test]
    fn test_pair_order_follows_column_order() {
        let df = df![
            "A" => [1.0, 2.0, 3.0, 4.0],
            "B" => [2.0, 4.0, 6.0, 8.1],
            "C" => [4.0, 3.0, 2.0, 1.0],
        ]
        .unwrap();
        let columns = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let pairs = RedundancyPruner::new(0.8)
            .find_pairs(&df, &columns, &mut StageLog::new())
            .unwrap();

        let names: Vec<(String, String)> = pairs
            .into_iter()
            .map(|p| (p.first, p.second))
            .collect();
        assert_eq!(
            names,
            vec![
                ("A".to_string(), "B".to_string()),
                ("A".to_string(), "C".to_string()),
                ("B".to_string(), "C".to_string()),
            ]
        );
    }
}
