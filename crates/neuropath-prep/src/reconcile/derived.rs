//! Derived variables: dates, ages and intervals, normalized free text and
//! "could not assess" indicators.

use crate::error::Result;
use crate::registry::{VariableRegistry, VariableSpec, VariableType};
use crate::types::{ActionType, PipelineAction, StageLog};
use crate::utils::{has_column, is_in, numeric_values, require_columns, set_numeric, set_string, string_values};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;

/// Visit date column, ISO `YYYY-MM-DD`.
pub const VISIT_DATE: &str = "VISITDATE";
/// Subject identifier column.
pub const SUBJECT_ID: &str = "NACCID";

static SPACES_AND_HYPHENS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s\-]+").expect("Invalid regex: spaces and hyphens"));

/// Comment marking variables whose codes 95-98 mean "could not assess".
pub const COULDNT_COMMENT: &str = "Dummy coding for (95,96,97,98)";
/// Comment marking variables whose codes 995-998 mean "could not assess".
pub const COULDNT_COMMENT_WIDE: &str = "Dummy coding for (995,996,997,998)";

const COULDNT_CODES: [f64; 4] = [95.0, 96.0, 97.0, 98.0];
const COULDNT_CODES_WIDE: [f64; 4] = [995.0, 996.0, 997.0, 998.0];

/// `name = minuend - subtrahend`.
struct Interval {
    name: &'static str,
    minuend: &'static str,
    subtrahend: &'static str,
}

const INTERVALS: [Interval; 7] = [
    Interval { name: "SinceQUITSMOK", minuend: "NACCAGE", subtrahend: "QUITSMOK" },
    Interval { name: "AgeStroke", minuend: "NACCSTYR", subtrahend: "BIRTHYR" },
    Interval { name: "AgeTIA", minuend: "NACCTIYR", subtrahend: "BIRTHYR" },
    Interval { name: "AgePD", minuend: "PDYR", subtrahend: "BIRTHYR" },
    Interval { name: "AgePDOTHR", minuend: "PDOTHRYR", subtrahend: "BIRTHYR" },
    Interval { name: "AgeTBI", minuend: "TBIYEAR", subtrahend: "BIRTHYR" },
    Interval { name: "Duration", minuend: "NACCAGE", subtrahend: "DECAGE" },
];

/// Build a date from numeric components. Non-integral or out-of-range
/// components give `None`.
pub fn make_date(year: Option<f64>, month: Option<f64>, day: Option<f64>) -> Option<NaiveDate> {
    let whole = |v: Option<f64>| v.filter(|x| x.fract() == 0.0);
    let year = whole(year)? as i32;
    let month = whole(month)?;
    let day = whole(day)?;
    if month < 1.0 || day < 1.0 {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

fn write_dates(
    df: &mut DataFrame,
    name: &str,
    dates: Vec<Option<NaiveDate>>,
    log: &mut StageLog,
) -> Result<()> {
    let invalid = dates.iter().filter(|d| d.is_none()).count();
    if invalid > 0 {
        log.warn(format!("{}: {} rows have no valid date", name, invalid));
    }
    let text = dates
        .into_iter()
        .map(|d| d.map(|d| d.format("%Y-%m-%d").to_string()))
        .collect();
    set_string(df, name, text)
}

/// Derive `VISITDATE` (required), `DOB` and `DOD` (when their sources
/// exist). All three are registered as identifiers.
pub fn derive_dates(df: &mut DataFrame, registry: &mut VariableRegistry, log: &mut StageLog) -> Result<()> {
    require_columns(df, &["VISITYR", "VISITMO", "VISITDAY"])?;
    let years = numeric_values(df, "VISITYR")?;
    let months = numeric_values(df, "VISITMO")?;
    let days = numeric_values(df, "VISITDAY")?;
    let visits = (0..df.height())
        .map(|i| make_date(years[i], months[i], days[i]))
        .collect();
    write_dates(df, VISIT_DATE, visits, log)?;
    registry.ensure_kept(VISIT_DATE, VariableType::Id);
    log.record(PipelineAction::new(
        ActionType::VariableDerived,
        VISIT_DATE,
        "Visit date from VISITYR/VISITMO/VISITDAY",
    ));

    for (name, year_column, month_column) in [("DOB", "BIRTHYR", "BIRTHMO"), ("DOD", "NACCYOD", "NACCMOD")] {
        if !(has_column(df, year_column) && has_column(df, month_column)) {
            log.warn(format!("{}: sources {}/{} absent, not derived", name, year_column, month_column));
            continue;
        }
        let years = numeric_values(df, year_column)?;
        let months = numeric_values(df, month_column)?;
        let dates = years
            .iter()
            .zip(&months)
            .map(|(y, m)| make_date(*y, *m, Some(1.0)))
            .collect();
        write_dates(df, name, dates, log)?;
        registry.ensure_kept(name, VariableType::Id);
        log.record(PipelineAction::new(
            ActionType::VariableDerived,
            name,
            format!("Date from {}/{} (first of month)", year_column, month_column),
        ));
    }
    Ok(())
}

/// Derive the age and interval variables whose sources are present.
pub fn derive_intervals(df: &mut DataFrame, registry: &mut VariableRegistry, log: &mut StageLog) -> Result<()> {
    for interval in &INTERVALS {
        if !(has_column(df, interval.minuend) && has_column(df, interval.subtrahend)) {
            continue;
        }
        let minuend = numeric_values(df, interval.minuend)?;
        let subtrahend = numeric_values(df, interval.subtrahend)?;
        let values = minuend
            .iter()
            .zip(&subtrahend)
            .map(|(a, b)| Some((*a)? - (*b)?))
            .collect();
        set_numeric(df, interval.name, values)?;

        let registered = registry.register_if_absent(VariableSpec::new(interval.name, VariableType::Numeric));
        let mut action = PipelineAction::new(
            ActionType::VariableDerived,
            interval.name,
            format!("{} - {}", interval.minuend, interval.subtrahend),
        );
        if registered {
            action = action.with_details("Registered as Numeric");
        }
        log.record(action);
    }
    Ok(())
}

/// Normalize Hispanic-origin text.
pub fn normalize_hispanic_origin(text: &str) -> String {
    let lower = text.to_lowercase();
    if lower == "spanish" { "spain".to_string() } else { lower }
}

/// Normalize race text: lower case, spaces and hyphens removed, synonyms merged.
pub fn normalize_race(text: &str) -> String {
    let compact = SPACES_AND_HYPHENS.replace_all(&text.to_lowercase(), "").into_owned();
    match compact.as_str() {
        "hispanic" | "puertorican" => "latino".to_string(),
        "guamchamorro" => "chamorro".to_string(),
        _ => compact,
    }
}

/// Apply the free-text normalizations to the columns that exist.
pub fn normalize_free_text(df: &mut DataFrame, log: &mut StageLog) -> Result<()> {
    let normalizers: [(&str, fn(&str) -> String); 2] =
        [("HISPORX", normalize_hispanic_origin), ("RACEX", normalize_race)];
    for (name, normalize) in normalizers {
        if !has_column(df, name) {
            continue;
        }
        let values = string_values(df, name)?
            .into_iter()
            .map(|v| v.map(|text| normalize(&text)))
            .collect();
        set_string(df, name, values)?;
        log.record(PipelineAction::new(
            ActionType::VariableReconciled,
            name,
            "Normalized free text",
        ));
    }
    Ok(())
}

/// Add `<VAR>_couldnt` for variables whose registry comment asks for it.
///
/// The 95-98 coding applies to kept variables only; the 995-998 coding
/// applies whatever the keep flag says.
pub fn derive_unassessable_indicators(
    df: &mut DataFrame,
    registry: &mut VariableRegistry,
    log: &mut StageLog,
) -> Result<()> {
    let passes = [
        (COULDNT_COMMENT, &COULDNT_CODES, true),
        (COULDNT_COMMENT_WIDE, &COULDNT_CODES_WIDE, false),
    ];
    for (comment, codes, kept_only) in passes {
        let matching = if kept_only {
            registry.kept_with_comment(comment)
        } else {
            registry.all_with_comment(comment)
        };
        let variables: Vec<String> = matching.into_iter().map(str::to_string).collect();
        for variable in variables {
            if !has_column(df, &variable) {
                log.warn(format!("{}: registered for dummy coding but absent from data", variable));
                continue;
            }
            let name = format!("{}_couldnt", variable);
            let values = numeric_values(df, &variable)?
                .into_iter()
                .map(|v| Some(if is_in(v, codes) { 1.0 } else { 0.0 }))
                .collect();
            set_numeric(df, &name, values)?;
            registry.ensure_kept(&name, VariableType::Boolean);
            log.record(PipelineAction::new(
                ActionType::VariableDerived,
                name.as_str(),
                format!("Could-not-assess indicator for {}", variable),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_make_date() {
        assert_eq!(
            make_date(Some(2010.0), Some(2.0), Some(28.0)),
            NaiveDate::from_ymd_opt(2010, 2, 28)
        );
        assert_eq!(make_date(Some(2010.0), Some(2.0), Some(30.0)), None);
        assert_eq!(make_date(Some(2010.0), None, Some(1.0)), None);
        assert_eq!(make_date(Some(2010.0), Some(-4.0), Some(1.0)), None);
    }

    #[test]
    fn test_derive_dates() {
        let mut df = df![
            "VISITYR" => [2005.0, 2011.0],
            "VISITMO" => [3.0, 13.0],
            "VISITDAY" => [9.0, 1.0],
            "BIRTHYR" => [1930.0, 1925.0],
            "BIRTHMO" => [7.0, 1.0],
        ]
        .unwrap();
        let mut registry = VariableRegistry::new();
        let mut log = StageLog::new();

        derive_dates(&mut df, &mut registry, &mut log).unwrap();

        assert_eq!(
            string_values(&df, VISIT_DATE).unwrap(),
            vec![Some("2005-03-09".to_string()), None]
        );
        assert_eq!(
            string_values(&df, "DOB").unwrap(),
            vec![Some("1930-07-01".to_string()), Some("1925-01-01".to_string())]
        );
        assert!(!has_column(&df, "DOD"));
        assert_eq!(registry.type_of(VISIT_DATE), Some(VariableType::Id));
        assert_eq!(registry.type_of("DOB"), Some(VariableType::Id));
        // one invalid visit date, one absent DOD source
        assert_eq!(log.warnings.len(), 2);
    }

    #[test]
    fn test_derive_intervals_registers_new_variables() {
        let mut df = df![
            "NACCAGE" => [Some(80.0), Some(75.0)],
            "DECAGE" => [Some(72.0), None],
        ]
        .unwrap();
        let mut registry =
            VariableRegistry::from_specs(vec![VariableSpec::new("Duration", VariableType::Ordinal)]).unwrap();
        let mut log = StageLog::new();

        derive_intervals(&mut df, &mut registry, &mut log).unwrap();

        assert_eq!(numeric_values(&df, "Duration").unwrap(), vec![Some(8.0), None]);
        assert!(!has_column(&df, "SinceQUITSMOK"));
        // An existing registry entry is left alone
        assert_eq!(registry.type_of("Duration"), Some(VariableType::Ordinal));
        assert_eq!(log.actions.len(), 1);
    }

    #[test]
    fn test_free_text_normalization() {
        assert_eq!(normalize_hispanic_origin("Spanish"), "spain");
        assert_eq!(normalize_hispanic_origin("Mexican"), "mexican");
        assert_eq!(normalize_race("Puerto Rican"), "latino");
        assert_eq!(normalize_race("Hispanic"), "latino");
        assert_eq!(normalize_race("Guam - Chamorro"), "chamorro");
        assert_eq!(normalize_race("Multi Racial"), "multiracial");
        assert_eq!(normalize_race("Native-Hawaiian"), "nativehawaiian");
    }

    #[test]
    fn test_unassessable_indicators() {
        let mut df = df![
            "TRAILA" => [Some(45.0), Some(995.0), None],
            "LOGIMEM" => [Some(96.0), Some(12.0), Some(98.0)],
        ]
        .unwrap();
        let mut registry = VariableRegistry::from_specs(vec![
            VariableSpec::new("TRAILA", VariableType::Numeric).with_comment(COULDNT_COMMENT_WIDE),
            VariableSpec::new("LOGIMEM", VariableType::Numeric).with_comment(COULDNT_COMMENT),
        ])
        .unwrap();
        let mut log = StageLog::new();

        derive_unassessable_indicators(&mut df, &mut registry, &mut log).unwrap();

        assert_eq!(
            numeric_values(&df, "TRAILA_couldnt").unwrap(),
            vec![Some(0.0), Some(1.0), Some(0.0)]
        );
        assert_eq!(
            numeric_values(&df, "LOGIMEM_couldnt").unwrap(),
            vec![Some(1.0), Some(0.0), Some(1.0)]
        );
        assert_eq!(registry.type_of("LOGIMEM_couldnt"), Some(VariableType::Boolean));
    }

    #[test]
    fn test_wide_indicator_ignores_keep_flag() {
        let mut df = df![
            "TRAILB" => [Some(996.0), Some(120.0)],
            "DIGIF" => [Some(97.0), Some(8.0)],
        ]
        .unwrap();
        let mut registry = VariableRegistry::from_specs(vec![
            VariableSpec::new("TRAILB", VariableType::Numeric)
                .with_keep(false)
                .with_comment(COULDNT_COMMENT_WIDE),
            VariableSpec::new("DIGIF", VariableType::Numeric)
                .with_keep(false)
                .with_comment(COULDNT_COMMENT),
        ])
        .unwrap();
        let mut log = StageLog::new();

        derive_unassessable_indicators(&mut df, &mut registry, &mut log).unwrap();

        assert_eq!(
            numeric_values(&df, "TRAILB_couldnt").unwrap(),
            vec![Some(1.0), Some(0.0)]
        );
        assert!(registry.is_kept("TRAILB_couldnt"));
        assert!(!registry.is_kept("TRAILB"));
        // the 95-98 coding still follows the keep flag
        assert!(!has_column(&df, "DIGIF_couldnt"));
    }
}
