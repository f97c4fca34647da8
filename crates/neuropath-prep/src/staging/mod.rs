//! ABC neuropathologic staging (Montine et al. 2012).
//!
//! Recomputes the A (Thal amyloid phase), B (Braak stage) and C (neuritic
//! plaque) scores from raw codes and combines them by a fixed decision table.

use crate::error::Result;
use crate::utils::{numeric_values, require_columns};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

pub const THAL_COLUMN: &str = "NPTHAL";
pub const BRAAK_COLUMN: &str = "NACCBRAA";
pub const NEURITIC_COLUMN: &str = "NACCNEUR";

/// Sub-scores and the combined stage for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbcScore {
    pub a: Option<u8>,
    pub b: Option<u8>,
    pub c: Option<i8>,
    pub abc: u8,
}

fn whole(value: Option<f64>) -> Option<i64> {
    value.filter(|v| v.fract() == 0.0).map(|v| v as i64)
}

/// A score from the Thal phase: 0→0, 1-2→1, 3→2, 4-5→3. Any other code,
/// including -4, 8 and 9, is missing.
pub fn a_score(thal: Option<f64>) -> Option<u8> {
    match whole(thal)? {
        0 => Some(0),
        1 | 2 => Some(1),
        3 => Some(2),
        4 | 5 => Some(3),
        _ => None,
    }
}

/// B score: `ceil(braak / 2)`; results above 3 or negative codes are missing.
pub fn b_score(braak: Option<f64>) -> Option<u8> {
    let braak = braak?;
    if braak < 0.0 {
        return None;
    }
    let score = (braak / 2.0).ceil();
    (score <= 3.0).then_some(score as u8)
}

/// C score: the neuritic plaque code with 8 and 9 missing. Other codes,
/// including -4, pass through and take part in the comparisons.
pub fn c_score(neuritic: Option<f64>) -> Option<i8> {
    match whole(neuritic)? {
        8 | 9 => None,
        code => i8::try_from(code).ok(),
    }
}

/// Combined stage. Rules run in order and the last match wins; a missing
/// sub-score fails every comparison.
pub fn abc_stage(a: Option<u8>, b: Option<u8>, c: Option<i8>) -> u8 {
    fn is<T: Copy>(score: Option<T>, test: fn(T) -> bool) -> bool {
        score.is_some_and(test)
    }

    let rules: [(bool, u8); 5] = [
        (is(a, |v| v == 1) && is(c, |v| v < 2), 1),
        (is(a, |v| v > 0) && is(b, |v| v < 2), 1),
        (is(a, |v| v == 1) && is(b, |v| v > 1) && is(c, |v| v > 1), 2),
        (is(a, |v| v > 1) && is(b, |v| v > 1), 2),
        (is(a, |v| v == 3) && is(b, |v| v == 3) && is(c, |v| v > 1), 3),
    ];
    rules
        .iter()
        .fold(0, |stage, &(matched, value)| if matched { value } else { stage })
}

impl AbcScore {
    pub fn from_raw(thal: Option<f64>, braak: Option<f64>, neuritic: Option<f64>) -> Self {
        let a = a_score(thal);
        let b = b_score(braak);
        let c = c_score(neuritic);
        Self {
            a,
            b,
            c,
            abc: abc_stage(a, b, c),
        }
    }
}

/// Recomputes ABC stages for a table carrying the raw staging columns.
pub struct StagingRecomputer;

impl StagingRecomputer {
    pub fn score(df: &DataFrame) -> Result<Vec<AbcScore>> {
        require_columns(df, &[THAL_COLUMN, BRAAK_COLUMN, NEURITIC_COLUMN])?;
        let thal = numeric_values(df, THAL_COLUMN)?;
        let braak = numeric_values(df, BRAAK_COLUMN)?;
        let neuritic = numeric_values(df, NEURITIC_COLUMN)?;

        Ok(thal
            .iter()
            .zip(&braak)
            .zip(&neuritic)
            .map(|((t, b), n)| AbcScore::from_raw(*t, *b, *n))
            .collect())
    }

    /// Append `Ascore`, `Bscore`, `Cscore` and `ABC` columns.
    pub fn annotate(df: &mut DataFrame) -> Result<Vec<AbcScore>> {
        let scores = Self::score(df)?;
        let sub = |f: fn(&AbcScore) -> Option<i32>| -> Vec<Option<i32>> {
            scores.iter().map(f).collect()
        };
        df.with_column(Series::new("Ascore".into(), sub(|s| s.a.map(i32::from))))?;
        df.with_column(Series::new("Bscore".into(), sub(|s| s.b.map(i32::from))))?;
        df.with_column(Series::new("Cscore".into(), sub(|s| s.c.map(i32::from))))?;
        let stages: Vec<i32> = scores.iter().map(|s| i32::from(s.abc)).collect();
        df.with_column(Series::new("ABC".into(), stages))?;
        Ok(scores)
    }
}
