//! Variable reconciliation.
//!
//! Merges variables that were split or renamed between instrument versions,
//! collapses secondary positive codes, derives the English-language flag and
//! the derived date/interval/text/indicator variables. Retired variables are
//! marked not-kept in the registry so the normalizer drops them.

pub mod derived;

use crate::error::Result;
use crate::registry::{VariableRegistry, VariableType};
use crate::types::{ActionType, PipelineAction, StageLog};
use crate::utils::{equals, is_in, numeric_values, require_columns, set_numeric};
use derived::{SUBJECT_ID, VISIT_DATE};
use polars::prelude::*;
use tracing::info;

/// Code meaning "not applicable in this form version".
const NOT_APPLICABLE: f64 = -4.0;

/// A primary variable filled from a counterpart where it is not applicable.
struct Merge {
    primary: &'static str,
    counterpart: &'static str,
    /// (counterpart codes, value written to the primary)
    mapping: &'static [(&'static [f64], f64)],
}

const MERGES: [Merge; 2] = [
    // Pacemaker: CVPACDEF carries the answer when CVPACE was not asked
    Merge {
        primary: "CVPACE",
        counterpart: "CVPACDEF",
        mapping: &[(&[0.0], 0.0), (&[1.0], 1.0)],
    },
    // Brief head injury across versions
    Merge {
        primary: "TBIBRIEF",
        counterpart: "TRAUMBRF",
        mapping: &[(&[0.0], 0.0), (&[1.0, 2.0], 1.0)],
    },
];

/// Flags whose code 2 collapses onto 1.
pub const COLLAPSED_FLAGS: [&str; 3] = ["ABRUPT", "FOCLSYM", "FOCLSIGN"];

/// Language code column retired in favour of `English`.
pub const PRIMARY_LANGUAGE: &str = "PRIMLANG";
pub const ENGLISH: &str = "English";

/// Reconciles redundant variables and edits the registry to match.
pub struct VariableReconciler;

impl VariableReconciler {
    /// Columns the reconciler reads.
    pub fn required_columns() -> Vec<&'static str> {
        let mut columns = Vec::new();
        for merge in &MERGES {
            columns.push(merge.primary);
            columns.push(merge.counterpart);
        }
        columns.extend(COLLAPSED_FLAGS);
        columns.push(PRIMARY_LANGUAGE);
        columns
    }

    /// Run every reconciliation step on `df`, recording each in `log`.
    pub fn apply(df: &mut DataFrame, registry: &mut VariableRegistry, log: &mut StageLog) -> Result<()> {
        require_columns(df, &Self::required_columns())?;
        let recorded_before = log.actions.len();

        derived::derive_dates(df, registry, log)?;
        derived::derive_intervals(df, registry, log)?;
        derived::normalize_free_text(df, log)?;

        for merge in &MERGES {
            Self::merge(df, registry, merge, log)?;
        }
        for name in COLLAPSED_FLAGS {
            Self::collapse_code(df, name, 2.0, 1.0, log)?;
        }
        Self::derive_english(df, registry, log)?;

        derived::derive_unassessable_indicators(df, registry, log)?;

        registry.ensure_kept(SUBJECT_ID, VariableType::Id);
        registry.ensure_kept(VISIT_DATE, VariableType::Id);

        info!("Reconciliation recorded {} steps", log.actions.len() - recorded_before);
        Ok(())
    }

    fn merge(df: &mut DataFrame, registry: &mut VariableRegistry, merge: &Merge, log: &mut StageLog) -> Result<()> {
        let mut primary = numeric_values(df, merge.primary)?;
        let counterpart = numeric_values(df, merge.counterpart)?;

        let mut filled = 0;
        for (value, other) in primary.iter_mut().zip(&counterpart) {
            if !equals(*value, NOT_APPLICABLE) {
                continue;
            }
            if let Some((_, target)) = merge.mapping.iter().find(|(codes, _)| is_in(*other, codes)) {
                *value = Some(*target);
                filled += 1;
            }
        }
        set_numeric(df, merge.primary, primary)?;
        registry.set_keep(merge.counterpart, false);

        log.record(
            PipelineAction::new(
                ActionType::VariableReconciled,
                merge.primary,
                format!("Filled not-applicable codes from {}", merge.counterpart),
            )
            .with_details(format!("{} rows filled; {} retired", filled, merge.counterpart)),
        );
        Ok(())
    }

    fn collapse_code(df: &mut DataFrame, name: &str, from: f64, to: f64, log: &mut StageLog) -> Result<()> {
        let mut changed = 0;
        let values = numeric_values(df, name)?
            .into_iter()
            .map(|v| {
                if equals(v, from) {
                    changed += 1;
                    Some(to)
                } else {
                    v
                }
            })
            .collect();
        set_numeric(df, name, values)?;

        log.record(
            PipelineAction::new(ActionType::VariableReconciled, name, format!("Collapsed code {} onto {}", from, to))
                .with_details(format!("{} rows changed", changed)),
        );
        Ok(())
    }

    fn derive_english(df: &mut DataFrame, registry: &mut VariableRegistry, log: &mut StageLog) -> Result<()> {
        let values = numeric_values(df, PRIMARY_LANGUAGE)?
            .into_iter()
            .map(|v| Some(if equals(v, 1.0) { 1.0 } else { 0.0 }))
            .collect();
        set_numeric(df, ENGLISH, values)?;
        registry.set_keep(PRIMARY_LANGUAGE, false);
        registry.ensure_kept(ENGLISH, VariableType::Boolean);

        log.record(PipelineAction::new(
            ActionType::VariableDerived,
            ENGLISH,
            format!("English-language flag from {}; {} retired", PRIMARY_LANGUAGE, PRIMARY_LANGUAGE),
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::VariableSpec;
    use pretty_assertions::assert_eq;

    fn reconcile_frame() -> DataFrame {
        df![
            "NACCID" => ["A", "B", "C", "D"],
            "VISITYR" => [2010.0, 2011.0, 2012.0, 2013.0],
            "VISITMO" => [1.0, 2.0, 3.0, 4.0],
            "VISITDAY" => [5.0, 6.0, 7.0, 8.0],
            "CVPACE" => [Some(-4.0), Some(-4.0), Some(1.0), Some(-4.0)],
            "CVPACDEF" => [Some(0.0), Some(1.0), Some(0.0), None],
            "TBIBRIEF" => [Some(-4.0), Some(-4.0), Some(-4.0), Some(0.0)],
            "TRAUMBRF" => [Some(0.0), Some(2.0), Some(9.0), Some(1.0)],
            "ABRUPT" => [Some(2.0), Some(1.0), Some(0.0), None],
            "FOCLSYM" => [2.0, 2.0, 0.0, 8.0],
            "FOCLSIGN" => [0.0, 0.0, 0.0, 0.0],
            "PRIMLANG" => [Some(1.0), Some(2.0), None, Some(1.0)],
        ]
        .unwrap()
    }

    fn reconcile_registry() -> VariableRegistry {
        VariableRegistry::from_specs(vec![
            VariableSpec::new("CVPACE", VariableType::Boolean),
            VariableSpec::new("CVPACDEF", VariableType::Boolean),
            VariableSpec::new("TBIBRIEF", VariableType::Boolean),
            VariableSpec::new("TRAUMBRF", VariableType::Ordinal),
            VariableSpec::new("PRIMLANG", VariableType::Nominal),
            VariableSpec::new("NACCID", VariableType::Nominal).with_keep(false),
        ])
        .unwrap()
    }

    #[test]
    fn test_merges_fill_only_not_applicable_codes() {
        let mut df = reconcile_frame();
        let mut registry = reconcile_registry();
        let mut log = StageLog::new();

        VariableReconciler::apply(&mut df, &mut registry, &mut log).unwrap();

        assert_eq!(
            numeric_values(&df, "CVPACE").unwrap(),
            vec![Some(0.0), Some(1.0), Some(1.0), Some(-4.0)]
        );
        assert_eq!(
            numeric_values(&df, "TBIBRIEF").unwrap(),
            vec![Some(0.0), Some(1.0), Some(-4.0), Some(0.0)]
        );
        assert!(!registry.is_kept("CVPACDEF"));
        assert!(!registry.is_kept("TRAUMBRF"));
        assert!(registry.is_kept("CVPACE"));
    }

    #[test]
    fn test_code_collapse_and_english() {
        let mut df = reconcile_frame();
        let mut registry = reconcile_registry();
        let mut log = StageLog::new();

        VariableReconciler::apply(&mut df, &mut registry, &mut log).unwrap();

        assert_eq!(
            numeric_values(&df, "ABRUPT").unwrap(),
            vec![Some(1.0), Some(1.0), Some(0.0), None]
        );
        assert_eq!(
            numeric_values(&df, "FOCLSYM").unwrap(),
            vec![Some(1.0), Some(1.0), Some(0.0), Some(8.0)]
        );
        assert_eq!(
            numeric_values(&df, ENGLISH).unwrap(),
            vec![Some(1.0), Some(0.0), Some(0.0), Some(1.0)]
        );
        assert!(!registry.is_kept(PRIMARY_LANGUAGE));
        assert_eq!(registry.type_of(ENGLISH), Some(VariableType::Boolean));
    }

    #[test]
    fn test_identifiers_registered_and_steps_recorded() {
        let mut df = reconcile_frame();
        let mut registry = reconcile_registry();
        let mut log = StageLog::new();

        VariableReconciler::apply(&mut df, &mut registry, &mut log).unwrap();

        assert_eq!(registry.type_of(SUBJECT_ID), Some(VariableType::Id));
        assert!(registry.is_kept(SUBJECT_ID));
        assert_eq!(registry.type_of(VISIT_DATE), Some(VariableType::Id));
        assert!(log.actions.iter().any(|a| a.target == "CVPACE"));
        assert!(log.actions.iter().any(|a| a.target == ENGLISH));
    }

    #[test]
    fn test_missing_counterpart_is_schema_error() {
        let mut df = reconcile_frame().drop("TRAUMBRF").unwrap();
        let mut registry = reconcile_registry();
        let err = VariableReconciler::apply(&mut df, &mut registry, &mut StageLog::new()).unwrap_err();
        assert!(err.is_schema_error());
    }
}
