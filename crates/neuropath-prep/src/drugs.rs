//! Medication vocabulary from the `DRUG1..DRUG40` free-text slots.
//!
//! The vocabulary is reported for review only; the drug slots never become
//! model features.

use crate::error::Result;
use crate::utils::{has_column, string_values};
use polars::prelude::*;
use std::collections::BTreeSet;
use tracing::info;

/// Number of medication slots in the visit table.
pub const DRUG_SLOTS: usize = 40;

/// Spelling fixes applied to lower-cased entries before splitting. Hyphens
/// inside a single ingredient name are removed so the split does not break
/// it apart.
const CORRECTIONS: [(&str, &str); 14] = [
    ("multivitamin with minerals", "multivitamin"),
    ("multivitamin, prenatal", "multivitamin"),
    ("omega 3-6-9", "omega369"),
    ("omega-3", "omega3"),
    ("vitamin-d", "vitamin d"),
    ("acetyl-l-carnitine", "acetyl l carnitine"),
    ("levodopa", "levadopa"),
    ("pro-stat", "prostat"),
    ("alpha-d-galactosidase", "alpha d galactosidase"),
    ("indium pentetate in-111", "indium pentetate in111"),
    ("fludeoxyglucose f-18", "fludeoxyglucose f18"),
    ("calcium with vitamins d and k", "calcium-vitamin d-vitamin k"),
    ("aloe vera topical", "aloe vera"),
    ("ammonium lactate topical", "ammonium lactate"),
];

/// Entries that carry no ingredient.
const DISCARDED: [&str; 2] = ["*not codable*", "diphtheria/hepb/pertussis,acel/polio/tetanus"];

/// Slot column names, `DRUG1` through `DRUG40`.
pub fn drug_columns() -> Vec<String> {
    (1..=DRUG_SLOTS).map(|i| format!("DRUG{}", i)).collect()
}

/// Normalize one entry into its ingredient names.
pub fn ingredients(entry: &str) -> Vec<String> {
    let mut text = entry.to_lowercase();
    for (from, to) in CORRECTIONS {
        text = text.replace(from, to);
    }
    if DISCARDED.contains(&text.as_str()) {
        return Vec::new();
    }
    text.split('-')
        .flat_map(|part| part.split('/'))
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Sorted, de-duplicated ingredients across all slots present in `df`.
/// Absent slots are skipped.
pub fn drug_vocabulary(df: &DataFrame) -> Result<Vec<String>> {
    let mut vocabulary = BTreeSet::new();
    let mut slots = 0;
    for column in drug_columns() {
        if !has_column(df, &column) {
            continue;
        }
        slots += 1;
        for entry in string_values(df, &column)?.into_iter().flatten() {
            vocabulary.extend(ingredients(&entry));
        }
    }
    info!("Drug vocabulary: {} ingredients from {} slots", vocabulary.len(), slots);
    Ok(vocabulary.into_iter().collect())
}
