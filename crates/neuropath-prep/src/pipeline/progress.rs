//! Progress reporting for the preparation pipeline.
//!
//! Runs are single-threaded batch jobs without cancellation; progress
//! updates exist so a caller (the CLI, or a host application) can show
//! where a long run is.
//!
//! # Example
//!
//! ```rust,ignore
//! use neuropath_prep::Pipeline;
//!
//! let result = Pipeline::builder()
//!     .registry(registry)
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .run(df)?;
//! ```

use serde::{Deserialize, Serialize};

/// Stages of the preparation pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Validating inputs
    Initializing,
    /// Excluding records outside the autopsy cohort
    CohortFilter,
    /// Deriving pathology indicators and the class label
    ClassSynthesis,
    /// Merging instrument versions and deriving variables
    Reconciliation,
    /// Dropping unkept columns and masking sentinel codes
    Normalization,
    /// Choosing predictors and dropping sparse ones
    FeatureSelection,
    /// Flagging correlated predictor pairs
    RedundancyCheck,
    /// Imputing and encoding the feature matrix
    FeatureBuilding,
    /// Stratified train/validation/test partition
    Splitting,
    /// Writing artifacts and the run report
    ReportGeneration,
    /// Pipeline completed successfully
    Complete,
    /// Pipeline failed with an error
    Failed,
}

impl PipelineStage {
    /// Working stages in execution order.
    pub const ORDERED: [PipelineStage; 10] = [
        Self::Initializing,
        Self::CohortFilter,
        Self::ClassSynthesis,
        Self::Reconciliation,
        Self::Normalization,
        Self::FeatureSelection,
        Self::RedundancyCheck,
        Self::FeatureBuilding,
        Self::Splitting,
        Self::ReportGeneration,
    ];

    /// Returns a human-readable name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::CohortFilter => "Filtering Cohort",
            Self::ClassSynthesis => "Deriving Pathology Classes",
            Self::Reconciliation => "Reconciling Variables",
            Self::Normalization => "Normalizing Missing Values",
            Self::FeatureSelection => "Selecting Predictors",
            Self::RedundancyCheck => "Checking Redundancy",
            Self::FeatureBuilding => "Building Features",
            Self::Splitting => "Splitting Cohort",
            Self::ReportGeneration => "Writing Outputs",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
        }
    }

    /// Share of the overall run taken by this stage. Working stages sum to 1.
    pub fn weight(&self) -> f32 {
        match self {
            Self::Initializing => 0.02,
            Self::CohortFilter => 0.05,
            Self::ClassSynthesis => 0.13,
            Self::Reconciliation => 0.10,
            Self::Normalization => 0.10,
            Self::FeatureSelection => 0.05,
            Self::RedundancyCheck => 0.15,
            Self::FeatureBuilding => 0.20,
            Self::Splitting => 0.05,
            Self::ReportGeneration => 0.15,
            Self::Complete | Self::Failed => 0.0,
        }
    }

    /// Cumulative progress at the start of this stage.
    pub fn base_progress(&self) -> f32 {
        match self {
            Self::Complete => 1.0,
            Self::Failed => 0.0,
            stage => Self::ORDERED
                .iter()
                .take_while(|s| *s != stage)
                .map(|s| s.weight())
                .sum(),
        }
    }
}

/// A progress notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Current pipeline stage
    pub stage: PipelineStage,

    /// Optional sub-stage description (e.g., "Column: EDUC")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_stage: Option<String>,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    /// Progress within current stage (0.0 - 1.0)
    pub stage_progress: f32,

    /// Human-readable message describing current activity
    pub message: String,
}

impl ProgressUpdate {
    pub fn new(stage: PipelineStage, stage_progress: f32, message: impl Into<String>) -> Self {
        let progress = stage.base_progress() + (stage.weight() * stage_progress);
        Self {
            stage,
            sub_stage: None,
            progress: progress.clamp(0.0, 1.0),
            stage_progress: stage_progress.clamp(0.0, 1.0),
            message: message.into(),
        }
    }

    pub fn with_sub_stage(
        stage: PipelineStage,
        sub_stage: impl Into<String>,
        stage_progress: f32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            sub_stage: Some(sub_stage.into()),
            ..Self::new(stage, stage_progress, message)
        }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self::new(PipelineStage::Complete, 1.0, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(PipelineStage::Failed, 0.0, message)
    }
}

/// Receives progress updates from the pipeline.
///
/// Implementations must be `Send + Sync` so a pipeline can be moved to a
/// worker thread together with its reporter.
pub trait ProgressReporter: Send + Sync {
    /// Called at each stage boundary. Should return quickly.
    fn report(&self, update: ProgressUpdate);
}

/// [`ProgressReporter`] backed by a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_stage_weights_sum() {
        let total: f32 = PipelineStage::ORDERED.iter().map(|s| s.weight()).sum();
        assert!((total - 1.0).abs() < 0.01, "Weights should sum to ~1.0");
    }

    #[test]
    fn test_base_progress_is_cumulative() {
        assert_eq!(PipelineStage::Initializing.base_progress(), 0.0);
        assert!((PipelineStage::CohortFilter.base_progress() - 0.02).abs() < 1e-6);
        assert!((PipelineStage::ReportGeneration.base_progress() - 0.85).abs() < 1e-6);
        assert_eq!(PipelineStage::Complete.base_progress(), 1.0);

        let mut previous = -1.0;
        for stage in PipelineStage::ORDERED {
            assert!(stage.base_progress() > previous);
            previous = stage.base_progress();
        }
    }

    #[test]
    fn test_progress_update_midway() {
        let update = ProgressUpdate::with_sub_stage(PipelineStage::FeatureBuilding, "Column: EDUC", 0.5, "Imputing");
        assert_eq!(update.sub_stage.as_deref(), Some("Column: EDUC"));
        let expected = PipelineStage::FeatureBuilding.base_progress() + 0.1;
        assert!((update.progress - expected).abs() < 1e-6);

        assert_eq!(ProgressUpdate::complete("Done").progress, 1.0);
    }

    #[test]
    fn test_closure_progress_reporter() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let reporter = ClosureProgressReporter::new(move |_update| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        reporter.report(ProgressUpdate::new(PipelineStage::CohortFilter, 0.0, "Filtering"));
        reporter.report(ProgressUpdate::complete("Done"));

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stage_json_values() {
        let json = serde_json::to_string(&PipelineStage::ClassSynthesis).unwrap();
        assert_eq!(json, "\"class_synthesis\"");
        let json = serde_json::to_string(&PipelineStage::RedundancyCheck).unwrap();
        assert_eq!(json, "\"redundancy_check\"");
    }
}
