//! Typed NaN-sentinel specifications.
//!
//! Registry rows carry a short expression naming the raw codes that mean
//! "missing / not assessed" for that variable. Expressions are parsed once,
//! when the registry is loaded, so a malformed entry fails the run before any
//! data is touched.

use crate::error::{PrepError, Result};
use crate::utils::format_code;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

// Half-open integer range, e.g. `range(95, 99)` covers 95..=98
static RANGE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^range\(\s*(-?\d+)\s*,\s*(-?\d+)\s*\)$").expect("Invalid regex: range")
});

/// Raw codes that stand for a missing value in one variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SentinelSpec {
    /// A single code, e.g. `-4`.
    Single(f64),
    /// An explicit list, e.g. `[-4, 8, 9]`.
    List(Vec<f64>),
    /// Integer codes in `start..end`.
    Range { start: i64, end: i64 },
}

impl SentinelSpec {
    /// Parse a registry expression for `variable`.
    ///
    /// Accepted forms: a number (`-4`), a bracketed or parenthesised list
    /// (`[-4, 8, 9]`, `(8, 9)`), a bare comma list (`-4, 9`), or
    /// `range(start, end)`.
    pub fn parse(variable: &str, expression: &str) -> Result<Self> {
        let fail = |reason: &str| PrepError::UnparsableSentinel {
            variable: variable.to_string(),
            expression: expression.to_string(),
            reason: reason.to_string(),
        };

        let text = expression.trim();
        if text.is_empty() {
            return Err(fail("empty expression"));
        }

        if let Some(caps) = RANGE_PATTERN.captures(text) {
            let start: i64 = caps[1].parse().map_err(|_| fail("range start is not an integer"))?;
            let end: i64 = caps[2].parse().map_err(|_| fail("range end is not an integer"))?;
            if end <= start {
                return Err(fail("range is empty"));
            }
            return Ok(Self::Range { start, end });
        }
        if text.starts_with("range") {
            return Err(fail("expected range(start, end)"));
        }

        let opens = text.starts_with('[') || text.starts_with('(');
        let closes = text.ends_with(']') || text.ends_with(')');
        let bracketed = match (opens, closes) {
            (true, true) => {
                let pair = (text.as_bytes()[0], text.as_bytes()[text.len() - 1]);
                if !matches!(pair, (b'[', b']') | (b'(', b')')) {
                    return Err(fail("mismatched brackets"));
                }
                true
            }
            (false, false) => false,
            _ => return Err(fail("unbalanced brackets")),
        };

        let body = if bracketed { &text[1..text.len() - 1] } else { text };
        if !bracketed && !body.contains(',') {
            let value = parse_code(body).ok_or_else(|| fail("not a number"))?;
            return Ok(Self::Single(value));
        }

        let mut values = Vec::new();
        for (position, item) in body.split(',').enumerate() {
            let item = item.trim();
            if item.is_empty() {
                // Python-style trailing comma: `(8,)`
                if position > 0 && body.trim_end().ends_with(',') && values.len() == position {
                    continue;
                }
                return Err(fail("empty list element"));
            }
            values.push(parse_code(item).ok_or_else(|| fail("list element is not a number"))?);
        }
        if values.is_empty() {
            return Err(fail("empty list"));
        }

        Ok(Self::List(values))
    }

    /// Does `value` denote a missing observation under this spec?
    pub fn matches(&self, value: f64) -> bool {
        match self {
            Self::Single(code) => value == *code,
            Self::List(codes) => codes.contains(&value),
            Self::Range { start, end } => {
                value.fract() == 0.0 && value >= *start as f64 && value < *end as f64
            }
        }
    }
}

fn parse_code(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

impl fmt::Display for SentinelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(code) => write!(f, "{}", format_code(*code)),
            Self::List(codes) => {
                let parts: Vec<String> = codes.iter().map(|c| format_code(*c)).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Self::Range { start, end } => write!(f, "range({}, {})", start, end),
        }
    }
}
