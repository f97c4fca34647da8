//! Configuration types for the preparation pipeline.
//!
//! This module provides configuration options using the builder pattern
//! for flexible and ergonomic pipeline setup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How "suppress unless independently marked primary" rules are evaluated.
///
/// The Lewy body and vascular cascades contain rules of the shape
/// "clear the flag when a higher-priority indicator is set, unless this
/// pathology was itself marked primary". The source rules combined an
/// equality test with a bitwise AND whose precedence changes the meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SuppressionSemantics {
    /// Suppress when `indicator == 1 AND primary_marker != 1`.
    #[default]
    Intended,
    /// Suppress when `indicator == (primary_marker != 1)`, reproducing the
    /// precedence of the historical rule text bit for bit.
    Literal,
}

/// Configuration for the preparation pipeline.
///
/// Use [`PipelineConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use neuropath_prep::config::{PipelineConfig, SuppressionSemantics};
///
/// let config = PipelineConfig::builder()
///     .min_observations(100)
///     .correlation_threshold(0.8)
///     .suppression_semantics(SuppressionSemantics::Intended)
///     .build()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Predictors with fewer non-missing observations than this are dropped
    /// before imputation.
    /// Default: 100
    pub min_observations: usize,

    /// Absolute Pearson correlation above which a predictor pair is flagged
    /// as redundant.
    /// Default: 0.8
    pub correlation_threshold: f64,

    /// Fraction of the cohort held out as the test split.
    /// Default: 0.2
    pub test_fraction: f64,

    /// Fraction of the remaining training rows held out for validation.
    /// Default: 0.25
    pub validation_fraction: f64,

    /// Seed for the stratified splitter.
    /// Default: 666
    pub seed: u64,

    /// Years of education above which a subject counts as highly educated
    /// for stratification.
    /// Default: 12.0
    pub education_threshold: f64,

    /// Evaluation of guarded suppression rules in the class synthesizer.
    /// Default: Intended
    pub suppression_semantics: SuppressionSemantics,

    /// Columns to drop from the feature matrix after redundancy review.
    /// This is an external decision; the pruner never picks on its own.
    /// Default: empty
    pub manual_drops: Vec<String>,

    /// Output directory for splits, labels and reports.
    /// Default: "output"
    pub output_dir: PathBuf,

    /// Whether to write artifacts to disk.
    /// When false, results are kept in memory only.
    /// Default: true
    pub save_to_disk: bool,

    /// Whether to write the JSON run report.
    /// Default: true
    pub generate_reports: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_observations: 100,
            correlation_threshold: 0.8,
            test_fraction: 0.2,
            validation_fraction: 0.25,
            seed: 666,
            education_threshold: 12.0,
            suppression_semantics: SuppressionSemantics::default(),
            manual_drops: Vec::new(),
            output_dir: PathBuf::from("output"),
            save_to_disk: true,
            generate_reports: true,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !(0.0..=1.0).contains(&self.correlation_threshold) {
            return Err(ConfigValidationError::InvalidThreshold {
                field: "correlation_threshold".to_string(),
                value: self.correlation_threshold,
            });
        }

        // A split fraction of exactly 1.0 would leave the other side empty.
        for (field, value) in [
            ("test_fraction", self.test_fraction),
            ("validation_fraction", self.validation_fraction),
        ] {
            if !(0.0..1.0).contains(&value) {
                return Err(ConfigValidationError::InvalidFraction {
                    field: field.to_string(),
                    value,
                });
            }
        }

        if self.education_threshold < 0.0 {
            return Err(ConfigValidationError::InvalidEducationThreshold(
                self.education_threshold,
            ));
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid threshold for '{field}': {value} (must be between 0.0 and 1.0)")]
    InvalidThreshold { field: String, value: f64 },

    #[error("Invalid split fraction for '{field}': {value} (must be in [0.0, 1.0))")]
    InvalidFraction { field: String, value: f64 },

    #[error("Invalid education threshold: {0} (must be non-negative)")]
    InvalidEducationThreshold(f64),
}

impl From<ConfigValidationError> for crate::error::PrepError {
    fn from(err: ConfigValidationError) -> Self {
        crate::error::PrepError::InvalidConfig(err.to_string())
    }
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    min_observations: Option<usize>,
    correlation_threshold: Option<f64>,
    test_fraction: Option<f64>,
    validation_fraction: Option<f64>,
    seed: Option<u64>,
    education_threshold: Option<f64>,
    suppression_semantics: Option<SuppressionSemantics>,
    manual_drops: Vec<String>,
    output_dir: Option<PathBuf>,
    save_to_disk: Option<bool>,
    generate_reports: Option<bool>,
}

impl PipelineConfigBuilder {
    /// Set the minimum number of non-missing observations a predictor needs.
    pub fn min_observations(mut self, count: usize) -> Self {
        self.min_observations = Some(count);
        self
    }

    /// Set the absolute correlation threshold for redundancy flagging.
    ///
    /// # Arguments
    /// * `threshold` - Value between 0.0 and 1.0 (e.g., 0.8)
    pub fn correlation_threshold(mut self, threshold: f64) -> Self {
        self.correlation_threshold = Some(threshold);
        self
    }

    /// Set the held-out test fraction.
    pub fn test_fraction(mut self, fraction: f64) -> Self {
        self.test_fraction = Some(fraction);
        self
    }

    /// Set the validation fraction (relative to the training rows).
    pub fn validation_fraction(mut self, fraction: f64) -> Self {
        self.validation_fraction = Some(fraction);
        self
    }

    /// Set the splitter seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the education threshold (years) used for stratification.
    pub fn education_threshold(mut self, years: f64) -> Self {
        self.education_threshold = Some(years);
        self
    }

    /// Choose how guarded suppression rules are evaluated.
    pub fn suppression_semantics(mut self, semantics: SuppressionSemantics) -> Self {
        self.suppression_semantics = Some(semantics);
        self
    }

    /// Add a column to drop from the final feature matrix.
    pub fn manual_drop(mut self, column: impl Into<String>) -> Self {
        self.manual_drops.push(column.into());
        self
    }

    /// Set the output directory for artifacts.
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Enable or disable writing artifacts to disk.
    pub fn save_to_disk(mut self, save: bool) -> Self {
        self.save_to_disk = Some(save);
        self
    }

    /// Enable or disable the JSON run report.
    pub fn generate_reports(mut self, generate: bool) -> Self {
        self.generate_reports = Some(generate);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> Result<PipelineConfig, ConfigValidationError> {
        let config = PipelineConfig {
            min_observations: self.min_observations.unwrap_or(100),
            correlation_threshold: self.correlation_threshold.unwrap_or(0.8),
            test_fraction: self.test_fraction.unwrap_or(0.2),
            validation_fraction: self.validation_fraction.unwrap_or(0.25),
            seed: self.seed.unwrap_or(666),
            education_threshold: self.education_threshold.unwrap_or(12.0),
            suppression_semantics: self.suppression_semantics.unwrap_or_default(),
            manual_drops: self.manual_drops,
            output_dir: self.output_dir.unwrap_or_else(|| PathBuf::from("output")),
            save_to_disk: self.save_to_disk.unwrap_or(true),
            generate_reports: self.generate_reports.unwrap_or(true),
        };

        config.validate()?;
        Ok(config)
    }
}
