//! CSV and JSON inputs.

use crate::analysis::PredictionBundle;
use crate::error::{PrepError, Result, ResultExt};
use crate::registry::VariableRegistry;
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

fn read_csv(path: &Path, infer_schema_length: Option<usize>) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(infer_schema_length)
        .with_parse_options(CsvParseOptions::default().with_quote_char(Some(b'"')))
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))
        .context(format!("Opening {}", path.display()))?
        .finish()
        .context(format!("Reading {}", path.display()))
}

/// Load the raw visit table. Column types are inferred from every row,
/// since codes and free text can share a column's first rows.
pub fn load_dataset(path: &Path) -> Result<DataFrame> {
    let df = read_csv(path, None)?;
    info!(
        "Loaded {}: {} rows x {} columns",
        path.display(),
        df.height(),
        df.width()
    );
    Ok(df)
}

/// Load a table with every column read as text.
pub fn load_text_table(path: &Path) -> Result<DataFrame> {
    read_csv(path, Some(0))
}

/// Load and parse the variable registry.
pub fn load_registry(path: &Path) -> Result<VariableRegistry> {
    let table = load_text_table(path)?;
    let registry = VariableRegistry::from_dataframe(&table)
        .map_err(|e| e.with_context(format!("Parsing registry {}", path.display())))?;
    info!(
        "Registry: {} variables, {} kept",
        registry.len(),
        registry.kept_names().len()
    );
    Ok(registry)
}

/// Load and validate a prediction bundle.
pub fn load_predictions(path: &Path) -> Result<PredictionBundle> {
    let text = fs::read_to_string(path)?;
    let bundle: PredictionBundle = serde_json::from_str(&text)?;
    bundle.validate()?;
    info!("Loaded {} predictions from {}", bundle.predictions.len(), path.display());
    Ok(bundle)
}

/// Concatenate tables vertically, in order.
pub fn concat_rows(frames: &[DataFrame]) -> Result<DataFrame> {
    let mut iter = frames.iter();
    let Some(first) = iter.next() else {
        return Err(PrepError::InvalidConfig("no tables to concatenate".to_string()));
    };
    let mut combined = first.clone();
    for frame in iter {
        combined.vstack_mut(frame)?;
    }
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::VariableType;
    use std::io::Write;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("neuropath-loader-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_registry_from_csv() {
        let path = temp_file(
            "registry.csv",
            "Variable,Keep,Type,NaNValues,Comments\n\
             EDUC,True,Numeric,99,\n\
             NACCID,True,ID,,\n\
             TRAUMBRF,True,Ordinal,\"[8,9,-4]\",\n\
             FORMVER,False,,,\n",
        );
        let registry = load_registry(&path).unwrap();

        assert_eq!(registry.len(), 4);
        assert_eq!(registry.type_of("EDUC"), Some(VariableType::Numeric));
        assert!(!registry.is_kept("FORMVER"));
        assert!(registry.get("TRAUMBRF").unwrap().sentinels.is_some());
    }

    #[test]
    fn test_load_predictions_rejects_out_of_range() {
        let good = temp_file("good.json", r#"{"predictions": [0, 1, 4]}"#);
        assert_eq!(load_predictions(&good).unwrap().predictions, vec![0, 1, 4]);

        let bad = temp_file("bad.json", r#"{"predictions": [0, 7]}"#);
        let err = load_predictions(&bad).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PREDICTIONS");
    }

    #[test]
    fn test_concat_rows_keeps_order() {
        let a = df!["NACCID" => ["A", "B"]].unwrap();
        let b = df!["NACCID" => ["C"]].unwrap();
        let combined = concat_rows(&[a, b]).unwrap();
        assert_eq!(combined.height(), 3);
        assert_eq!(
            crate::utils::string_values(&combined, "NACCID").unwrap()[2].as_deref(),
            Some("C")
        );
    }
}
