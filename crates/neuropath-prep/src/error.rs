//! Custom error types for the neuropathology preparation pipeline.
//!
//! Every stage is fail-fast: errors are surfaced to the caller and never
//! retried. Errors are serializable so the run report can carry them as
//! `{ code, message }` pairs.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the preparation pipeline.
#[derive(Error, Debug)]
pub enum PrepError {
    /// An expected raw variable is absent from the input table.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// A filtering stage removed every row.
    #[error("Empty cohort: no records remain after {stage}")]
    EmptyCohort { stage: String },

    /// A registry NaN-sentinel expression could not be parsed.
    #[error("Unparsable NaN-sentinel expression for variable '{variable}': '{expression}' ({reason})")]
    UnparsableSentinel {
        variable: String,
        expression: String,
        reason: String,
    },

    /// Sentinel codes declared on a column that holds text.
    #[error("NaN sentinels {sentinels} declared on variable '{variable}', which is not numeric ({dtype})")]
    NonNumericSentinelColumn {
        variable: String,
        sentinels: String,
        dtype: String,
    },

    /// Derived labels and predictions did not join one-to-one.
    #[error("Join cardinality violation: {0}")]
    JoinCardinality(String),

    /// Predicted labels fall outside the class range.
    #[error("Invalid predictions: {0}")]
    InvalidPredictions(String),

    /// The variable registry table is malformed.
    #[error("Invalid variable registry: {0}")]
    InvalidRegistry(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Imputation could not be fitted for a column.
    #[error("Failed to impute missing values in column '{column}': {reason}")]
    ImputationFailed { column: String, reason: String },

    /// Report or artifact generation failed.
    #[error("Failed to generate report: {0}")]
    ReportGenerationFailed(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PrepError>,
    },
}

impl PrepError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PrepError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Shorthand for an empty-cohort failure at the named stage.
    pub fn empty_cohort(stage: impl Into<String>) -> Self {
        PrepError::EmptyCohort {
            stage: stage.into(),
        }
    }

    /// Get a stable error code for reports and exit diagnostics.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ColumnNotFound(_) => "SCHEMA_ERROR",
            Self::EmptyCohort { .. } => "EMPTY_COHORT",
            Self::UnparsableSentinel { .. } => "UNPARSABLE_SENTINEL",
            Self::NonNumericSentinelColumn { .. } => "NON_NUMERIC_SENTINEL",
            Self::JoinCardinality(_) => "JOIN_CARDINALITY",
            Self::InvalidPredictions(_) => "INVALID_PREDICTIONS",
            Self::InvalidRegistry(_) => "INVALID_REGISTRY",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::ImputationFailed { .. } => "IMPUTATION_FAILED",
            Self::ReportGenerationFailed(_) => "REPORT_GENERATION_FAILED",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error is a missing-column schema failure.
    pub fn is_schema_error(&self) -> bool {
        match self {
            Self::ColumnNotFound(_) => true,
            Self::WithContext { source, .. } => source.is_schema_error(),
            _ => false,
        }
    }

    /// Check if this error reports an empty cohort.
    pub fn is_empty_cohort(&self) -> bool {
        match self {
            Self::EmptyCohort { .. } => true,
            Self::WithContext { source, .. } => source.is_empty_cohort(),
            _ => false,
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for PrepError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("PrepError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PrepError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PrepError::Polars(e).with_context(context))
    }
}
