use crate::analysis::ErrorAnalysis;
use crate::cohort::CohortStats;
use crate::config::PipelineConfig;
use crate::error::{PrepError, Result};
use crate::features::encoding::EncodedColumn;
use crate::features::{GroupWidths, PredictorSet};
use crate::pipeline::PreparationResult;
use crate::pruning::RedundantPair;
use crate::types::PreparationSummary;
use crate::utils::take_rows;
use chrono::Local;
use polars::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

// ============================================================================
// Report Types
// ============================================================================

/// JSON run report of a preparation run.
#[derive(Debug, Clone, Serialize)]
pub struct PreparationReport {
    /// Timestamp when the report was generated
    pub generated_at: String,
    pub config: PipelineConfig,
    pub summary: PreparationSummary,
    pub cohort: CohortStats,
    /// Predictors that entered the feature matrix, by type
    pub predictors: PredictorSet,
    pub group_widths: GroupWidths,
    /// Imputation fill value per column
    pub fill_values: BTreeMap<String, f64>,
    /// Learned one-hot categories
    pub encoded_columns: Vec<EncodedColumn>,
    pub redundant_pairs: Vec<RedundantPair>,
    pub manual_drops: Vec<String>,
    pub drug_vocabulary_size: usize,
}

/// JSON report of an error analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub generated_at: String,
    pub analysis: ErrorAnalysis,
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

// ============================================================================
// Generator
// ============================================================================

/// Writes run artifacts into one output directory.
pub struct ReportGenerator {
    output_dir: PathBuf,
}

impl ReportGenerator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn path(&self, file_name: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        Ok(self.output_dir.join(file_name))
    }

    /// Write a frame as CSV with a header row.
    pub fn write_csv(&self, df: &mut DataFrame, file_name: &str) -> Result<PathBuf> {
        let path = self.path(file_name)?;
        let mut file = File::create(&path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(b',')
            .with_quote_char(b'"')
            .finish(df)
            .map_err(|e| PrepError::ReportGenerationFailed(format!("{}: {}", path.display(), e)))?;
        info!("Saved {} ({} rows)", path.display(), df.height());
        Ok(path)
    }

    fn write_text(&self, text: &str, file_name: &str) -> Result<PathBuf> {
        let path = self.path(file_name)?;
        let mut file = File::create(&path)?;
        file.write_all(text.as_bytes())?;
        info!("Saved {}", path.display());
        Ok(path)
    }

    fn write_json<T: Serialize>(&self, value: &T, file_name: &str) -> Result<PathBuf> {
        let text = serde_json::to_string_pretty(value)?;
        self.write_text(&text, file_name)
    }

    /// Build the JSON run report for a preparation result.
    pub fn build_preparation_report(result: &PreparationResult, config: &PipelineConfig) -> PreparationReport {
        PreparationReport {
            generated_at: timestamp(),
            config: config.clone(),
            summary: result.summary.clone(),
            cohort: result.cohort.clone(),
            predictors: result.predictors.clone(),
            group_widths: result.features.widths,
            fill_values: result.features.fill_values.clone(),
            encoded_columns: result.features.encoder.columns().to_vec(),
            redundant_pairs: result.redundant_pairs.clone(),
            manual_drops: result.manual_drops.clone(),
            drug_vocabulary_size: result.drug_vocabulary.len(),
        }
    }

    /// Write split matrices, labels, pairs, the drug vocabulary and, when
    /// `with_report` is set, `prep_report.json`.
    pub fn write_preparation(
        &self,
        result: &PreparationResult,
        config: &PipelineConfig,
        with_report: bool,
    ) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();

        let matrix = result.features.combined()?;
        let labels = DataFrame::new(vec![Column::new(
            crate::pathology::CLASS_COLUMN.into(),
            result.labels.clone(),
        )])?;
        for (suffix, rows) in [
            ("train", &result.splits.train),
            ("val", &result.splits.validation),
            ("test", &result.splits.test),
        ] {
            let mut x = take_rows(&matrix, rows)?;
            written.push(self.write_csv(&mut x, &format!("X_{}.csv", suffix))?);
            let mut y = take_rows(&labels, rows)?;
            written.push(self.write_csv(&mut y, &format!("y_{}.csv", suffix))?);
        }

        let mut annotated = result.annotated.clone();
        written.push(self.write_csv(&mut annotated, "pathology_labels.csv")?);

        let mut pairs = DataFrame::new(vec![
            Column::new(
                "v1".into(),
                result.redundant_pairs.iter().map(|p| p.first.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                "v2".into(),
                result.redundant_pairs.iter().map(|p| p.second.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                "r".into(),
                result.redundant_pairs.iter().map(|p| p.r).collect::<Vec<_>>(),
            ),
        ])?;
        written.push(self.write_csv(&mut pairs, "redundant_pairs.csv")?);

        let mut vocabulary = result.drug_vocabulary.join("\n");
        vocabulary.push('\n');
        written.push(self.write_text(&vocabulary, "drug_vocabulary.txt")?);

        if with_report {
            let report = Self::build_preparation_report(result, config);
            written.push(self.write_json(&report, "prep_report.json")?);
        }
        Ok(written)
    }

    /// Write the cross-tabulations as text plus `analysis_report.json`.
    pub fn write_analysis(&self, analysis: &ErrorAnalysis) -> Result<Vec<PathBuf>> {
        let non_ad = format!("{}\n{}", analysis.non_ad_false_alarms, analysis.non_ad_indicators);
        let written = vec![
            self.write_text(&analysis.ad_false_alarms.to_string(), "adfatab.txt")?,
            self.write_text(&non_ad, "nadfatab.txt")?,
            self.write_text(&analysis.vascular_false_alarms.to_string(), "vfatab.txt")?,
            self.write_text(&analysis.confusion.to_string(), "confusion.txt")?,
            self.write_json(
                &AnalysisReport {
                    generated_at: timestamp(),
                    analysis: analysis.clone(),
                },
                "analysis_report.json",
            )?,
        ];
        Ok(written)
    }
}
