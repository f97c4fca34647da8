//! Stratified train/validation/test partitioning.
//!
//! Rows are grouped by a stratum key; each stratum is shuffled with a
//! seeded RNG and `round(n * fraction)` of its rows are held out, so every
//! stratum keeps its share in both partitions.

use crate::utils::format_code;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Stratum key `"{class}_{sex}_{higher_ed}"`. Missing education counts as
/// not highly educated.
pub fn stratum_keys(
    classes: &[Option<f64>],
    sexes: &[Option<f64>],
    education: &[Option<f64>],
    education_threshold: f64,
) -> Vec<String> {
    classes
        .iter()
        .zip(sexes)
        .zip(education)
        .map(|((class, sex), educ)| {
            let label = |v: &Option<f64>| v.map(format_code).unwrap_or_else(|| "NA".to_string());
            let higher_ed = educ.is_some_and(|years| years > education_threshold);
            format!("{}_{}_{}", label(class), label(sex), higher_ed)
        })
        .collect()
}

/// Row positions of each partition, ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
    pub test: Vec<usize>,
}

/// Seeded stratified splitter.
#[derive(Debug, Clone)]
pub struct StratifiedSplitter {
    seed: u64,
}

impl StratifiedSplitter {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Split `rows` into (kept, held out), holding out `fraction` of each
    /// stratum. `strata[i]` is the key of `rows[i]`.
    pub fn split(&self, rows: &[usize], strata: &[String], fraction: f64) -> (Vec<usize>, Vec<usize>) {
        let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (&row, key) in rows.iter().zip(strata) {
            groups.entry(key.as_str()).or_default().push(row);
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut kept = Vec::with_capacity(rows.len());
        let mut held_out = Vec::new();
        for (key, mut members) in groups {
            members.shuffle(&mut rng);
            let n_out = ((members.len() as f64) * fraction).round() as usize;
            // A stratum is never emptied entirely into the held-out side
            let n_out = n_out.min(members.len().saturating_sub(1));
            debug!("Stratum {}: {} rows, {} held out", key, members.len(), n_out);
            held_out.extend_from_slice(&members[..n_out]);
            kept.extend_from_slice(&members[n_out..]);
        }

        kept.sort_unstable();
        held_out.sort_unstable();
        (kept, held_out)
    }

    /// Hold out `test_fraction` of all rows as test, then
    /// `validation_fraction` of the remainder as validation.
    pub fn three_way(&self, strata: &[String], test_fraction: f64, validation_fraction: f64) -> SplitIndices {
        let all: Vec<usize> = (0..strata.len()).collect();
        let (train_full, test) = self.split(&all, strata, test_fraction);

        let train_strata: Vec<String> = train_full.iter().map(|&row| strata[row].clone()).collect();
        let (train, validation) = self.split(&train_full, &train_strata, validation_fraction);

        SplitIndices {
            train,
            validation,
            test,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn cohort_strata() -> Vec<String> {
        // 5 classes x 2 sexes x 2 education levels, uneven sizes
        let mut strata = Vec::new();
        for class in 1..=5 {
            for sex in 1..=2 {
                for higher in [false, true] {
                    let size = 10 * class + 7 * sex + if higher { 13 } else { 0 };
                    for _ in 0..size {
                        strata.push(format!("{}_{}_{}", class, sex, higher));
                    }
                }
            }
        }
        strata
    }

    #[test]
    fn test_stratum_keys() {
        let keys = stratum_keys(
            &[Some(1.0), Some(5.0)],
            &[Some(2.0), None],
            &[Some(16.0), Some(12.0)],
            12.0,
        );
        assert_eq!(keys, vec!["1_2_true", "5_NA_false"]);
    }

    #[test]
    fn test_partitions_are_disjoint_and_complete() {
        let strata = cohort_strata();
        let splits = StratifiedSplitter::new(666).three_way(&strata, 0.2, 0.25);

        let mut all: Vec<usize> = splits
            .train
            .iter()
            .chain(&splits.validation)
            .chain(&splits.test)
            .copied()
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..strata.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_test_split_preserves_stratum_proportions() {
        let strata = cohort_strata();
        let splits = StratifiedSplitter::new(666).three_way(&strata, 0.2, 0.25);

        let mut cohort: HashMap<&str, usize> = HashMap::new();
        for key in &strata {
            *cohort.entry(key.as_str()).or_default() += 1;
        }
        let mut held_out: HashMap<&str, usize> = HashMap::new();
        for &row in &splits.test {
            *held_out.entry(strata[row].as_str()).or_default() += 1;
        }

        for (key, &n) in &cohort {
            let expected = n as f64 * 0.2;
            let actual = *held_out.get(key).unwrap_or(&0) as f64;
            assert!((actual - expected).abs() <= 0.5, "stratum {} off: {} vs {}", key, actual, expected);
        }
    }

    #[test]
    fn test_split_is_deterministic_per_seed() {
        let strata = cohort_strata();
        let first = StratifiedSplitter::new(666).three_way(&strata, 0.2, 0.25);
        let second = StratifiedSplitter::new(666).three_way(&strata, 0.2, 0.25);
        let other = StratifiedSplitter::new(7).three_way(&strata, 0.2, 0.25);

        assert_eq!(first, second);
        assert_ne!(first.test, other.test);
    }

    #[test]
    fn test_singleton_stratum_stays_in_training() {
        let strata = vec!["1_1_true".to_string()];
        let (kept, held_out) = StratifiedSplitter::new(1).split(&[0], &strata, 0.9);
        assert_eq!(kept, vec![0]);
        assert!(held_out.is_empty());
    }
}
