//! Ordered rule cascades.
//!
//! An indicator starts at 0 and each rule whose predicate holds overwrites
//! it, so the last matching rule wins. Predicates read raw codes from a
//! [`SourceTable`] and indicators already computed for the same record.

use super::{Indicator, IndicatorFlags};
use crate::config::SuppressionSemantics;
use crate::error::Result;
use crate::utils::{equals, is_in, numeric_values, require_columns};
use polars::prelude::*;
use std::collections::HashMap;

/// A value a predicate can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// A raw variable from the table.
    Raw(&'static str),
    /// An indicator computed earlier in the cascade order.
    Flag(Indicator),
}

/// Condition of one rule. Comparisons against a missing value are false,
/// except that a missing primary marker counts as "not marked primary".
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `operand == code`.
    Equals(Operand, f64),
    /// Raw value is one of `codes`.
    OneOf(&'static str, &'static [f64]),
    /// `operand` is set and `primary` does not mark this pathology as
    /// primary; see [`SuppressionSemantics`].
    Unless {
        operand: Operand,
        primary: &'static str,
    },
}

/// One `(predicate, assignment)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub predicate: Predicate,
    pub assign: bool,
}

impl Rule {
    pub fn set(predicate: Predicate) -> Self {
        Self {
            predicate,
            assign: true,
        }
    }

    pub fn clear(predicate: Predicate) -> Self {
        Self {
            predicate,
            assign: false,
        }
    }
}

/// The ordered rules that derive one indicator.
#[derive(Debug, Clone)]
pub struct Cascade {
    pub target: Indicator,
    pub rules: Vec<Rule>,
}

impl Cascade {
    pub fn new(target: Indicator) -> Self {
        Self {
            target,
            rules: Vec::new(),
        }
    }

    pub fn set_if(mut self, predicate: Predicate) -> Self {
        self.rules.push(Rule::set(predicate));
        self
    }

    pub fn clear_if(mut self, predicate: Predicate) -> Self {
        self.rules.push(Rule::clear(predicate));
        self
    }

    /// Set the indicator when any of `variables` equals 1.
    pub fn set_if_any(mut self, variables: &[&'static str]) -> Self {
        for &name in variables {
            self.rules
                .push(Rule::set(Predicate::Equals(Operand::Raw(name), 1.0)));
        }
        self
    }

    /// Run the rules for one record.
    pub fn evaluate(&self, row: &RowView<'_>, semantics: SuppressionSemantics) -> bool {
        self.rules.iter().fold(false, |value, rule| {
            if row.holds(&rule.predicate, semantics) {
                rule.assign
            } else {
                value
            }
        })
    }

    /// Raw variables the rules read.
    pub fn raw_variables(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        for rule in &self.rules {
            let (first, second) = match &rule.predicate {
                Predicate::Equals(Operand::Raw(name), _) => (Some(*name), None),
                Predicate::Equals(Operand::Flag(_), _) => (None, None),
                Predicate::OneOf(name, _) => (Some(*name), None),
                Predicate::Unless { operand, primary } => match operand {
                    Operand::Raw(name) => (Some(*name), Some(*primary)),
                    Operand::Flag(_) => (Some(*primary), None),
                },
            };
            for name in [first, second].into_iter().flatten() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }
}

/// Raw source columns pulled out of a table once, as optional floats.
#[derive(Debug, Clone, Default)]
pub struct SourceTable {
    columns: HashMap<&'static str, Vec<Option<f64>>>,
    height: usize,
}

impl SourceTable {
    /// Load the named columns. An absent column is a schema error.
    pub fn load(df: &DataFrame, names: &[&'static str]) -> Result<Self> {
        require_columns(df, names)?;
        let mut columns = HashMap::with_capacity(names.len());
        for &name in names {
            columns.insert(name, numeric_values(df, name)?);
        }
        Ok(Self {
            columns,
            height: df.height(),
        })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn value(&self, name: &str, row: usize) -> Option<f64> {
        self.columns
            .get(name)
            .and_then(|values| values.get(row).copied().flatten())
    }

    /// A view of one record with the flags computed so far.
    pub fn row<'a>(&'a self, row: usize, flags: &'a IndicatorFlags) -> RowView<'a> {
        RowView {
            sources: self,
            row,
            flags,
        }
    }
}

/// One record as seen by predicates.
pub struct RowView<'a> {
    sources: &'a SourceTable,
    row: usize,
    flags: &'a IndicatorFlags,
}

impl RowView<'_> {
    fn operand(&self, operand: Operand) -> Option<f64> {
        match operand {
            Operand::Raw(name) => self.sources.value(name, self.row),
            Operand::Flag(indicator) => Some(if self.flags.get(indicator) { 1.0 } else { 0.0 }),
        }
    }

    fn holds(&self, predicate: &Predicate, semantics: SuppressionSemantics) -> bool {
        match predicate {
            Predicate::Equals(operand, code) => equals(self.operand(*operand), *code),
            Predicate::OneOf(name, codes) => is_in(self.sources.value(name, self.row), codes),
            Predicate::Unless { operand, primary } => {
                let not_primary = !equals(self.sources.value(primary, self.row), 1.0);
                let value = self.operand(*operand);
                match semantics {
                    SuppressionSemantics::Intended => equals(value, 1.0) && not_primary,
                    // operand == (1 & (primary != 1))
                    SuppressionSemantics::Literal => {
                        equals(value, if not_primary { 1.0 } else { 0.0 })
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources() -> SourceTable {
        let df = df![
            "NPPLEWY" => [Some(1.0), None, Some(2.0)],
            "NPLBOD" => [Some(3.0), Some(2.0), None],
        ]
        .unwrap();
        SourceTable::load(&df, &["NPPLEWY", "NPLBOD"]).unwrap()
    }

    #[test]
    fn test_last_matching_rule_wins() {
        let table = sources();
        let cascade = Cascade::new(Indicator::Lewy)
            .set_if(Predicate::OneOf("NPLBOD", &[2.0, 3.0]))
            .clear_if(Predicate::Equals(Operand::Raw("NPPLEWY"), 2.0));

        let flags = IndicatorFlags::default();
        let results: Vec<bool> = (0..table.height())
            .map(|row| cascade.evaluate(&table.row(row, &flags), SuppressionSemantics::Intended))
            .collect();
        assert_eq!(results, vec![true, true, false]);
    }

    #[test]
    fn test_unless_semantics() {
        let table = sources();
        let cascade = Cascade::new(Indicator::Lewy)
            .set_if(Predicate::OneOf("NPLBOD", &[2.0, 3.0]))
            .clear_if(Predicate::Unless {
                operand: Operand::Flag(Indicator::Ad),
                primary: "NPPLEWY",
            });

        let mut with_ad = IndicatorFlags::default();
        with_ad.set(Indicator::Ad, true);
        let without_ad = IndicatorFlags::default();

        // Row 0: Lewy marked primary, so AD does not suppress it
        assert!(cascade.evaluate(&table.row(0, &with_ad), SuppressionSemantics::Intended));
        // Row 1: primary marker missing counts as "not primary"
        assert!(!cascade.evaluate(&table.row(1, &with_ad), SuppressionSemantics::Intended));

        // Literal reading: AD == (NPPLEWY != 1). With NPPLEWY == 1 this clears
        // the flag exactly when AD is absent.
        assert!(cascade.evaluate(&table.row(0, &with_ad), SuppressionSemantics::Literal));
        assert!(!cascade.evaluate(&table.row(0, &without_ad), SuppressionSemantics::Literal));
        assert!(cascade.evaluate(&table.row(0, &without_ad), SuppressionSemantics::Intended));
    }

    #[test]
    fn test_raw_variables_are_deduplicated() {
        let cascade = Cascade::new(Indicator::Vascular)
            .set_if_any(&["NPINF", "NPPVASC"])
            .clear_if(Predicate::Equals(Operand::Raw("NPPVASC"), 2.0))
            .clear_if(Predicate::Unless {
                operand: Operand::Raw("NPPFTLD"),
                primary: "NPPVASC",
            });
        assert_eq!(cascade.raw_variables(), vec!["NPINF", "NPPVASC", "NPPFTLD"]);
    }

    #[test]
    fn test_missing_source_column_fails() {
        let df = df!["NPLBOD" => [1.0]].unwrap();
        let err = SourceTable::load(&df, &["NPLBOD", "NPPLEWY"]).unwrap_err();
        assert!(err.is_schema_error());
    }
}
