//! Neuropathology Data Preparation Library
//!
//! Turns an autopsy-cohort visit table (clinical plus neuropathology
//! variables, one row per subject visit) into a modeling-ready feature
//! matrix with a five-way primary pathology label, and analyzes the errors
//! of a classifier trained on it against recomputed ABC staging.
//!
//! # Overview
//!
//! Stages run in a fixed order, each consuming the previous one's table:
//!
//! - **Cohort Filter**: autopsied subjects without exclusion diagnoses
//! - **Pathology Class Synthesizer**: ordered rule cascades derive five
//!   indicators and collapse them to one class (AD, Tau, TDP, LB, Vascular)
//! - **Variable Reconciler**: merges instrument-version duplicates and
//!   derives dates, intervals and "could not assess" indicators
//! - **Missing-Value Normalizer**: registry-driven column drops and
//!   sentinel masking
//! - **Feature Builder**: type-directed imputation and one-hot encoding
//! - **Redundancy Pruner**: flags correlated predictor pairs for review
//!
//! Downstream, the **Staging Recomputer** and **Error Analyzer** cross-tabulate
//! classifier errors against ABC stages and raw pathology findings.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use neuropath_prep::{Pipeline, PipelineConfig, loader};
//! use std::path::Path;
//!
//! let registry = loader::load_registry(Path::new("variables.csv"))?;
//! let df = loader::load_dataset(Path::new("investigator_nacc.csv"))?;
//!
//! let config = PipelineConfig::builder()
//!     .min_observations(100)
//!     .correlation_threshold(0.8)
//!     .output_dir("output")
//!     .build()?;
//!
//! let result = Pipeline::builder()
//!     .config(config)
//!     .registry(registry)
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .run(df)?;
//!
//! println!("{} features", result.features.features.width());
//! ```
//!
//! # Error Analysis
//!
//! ```rust,ignore
//! let bundle = loader::load_predictions(Path::new("predictions.json"))?;
//! let analysis = Pipeline::analyze(&train_then_val_ids, &bundle, &annotated)?;
//! println!("{}", analysis.confusion);
//! ```

pub mod analysis;
pub mod cohort;
pub mod config;
pub mod drugs;
pub mod error;
pub mod features;
pub mod imputers;
pub mod loader;
pub mod missing;
pub mod pathology;
pub mod pipeline;
pub mod pruning;
pub mod reconcile;
pub mod registry;
pub mod reporting;
pub mod split;
pub mod staging;
pub mod types;
pub mod utils;

// Re-exports for convenient access
pub use analysis::{CrossTab, ErrorAnalysis, ErrorAnalyzer, PredictionBundle};
pub use cohort::{CohortFilter, CohortStats};
pub use config::{ConfigValidationError, PipelineConfig, PipelineConfigBuilder, SuppressionSemantics};
pub use error::{PrepError, Result as PrepResult, ResultExt};
pub use features::{FeatureBuilder, FeatureMatrix, PredictorSet};
pub use imputers::{ImputeStrategy, StatisticalImputer};
pub use missing::MissingValueNormalizer;
pub use pathology::PathologySynthesizer;
pub use pipeline::{
    ClosureProgressReporter, Pipeline, PipelineBuilder, PipelineStage, PreparationResult, ProgressReporter,
    ProgressUpdate,
};
pub use pruning::{RedundancyPruner, RedundantPair};
pub use reconcile::VariableReconciler;
pub use registry::{SentinelSpec, VariableRegistry, VariableSpec, VariableType};
pub use reporting::{AnalysisReport, PreparationReport, ReportGenerator};
pub use split::{SplitIndices, StratifiedSplitter};
pub use staging::{AbcScore, StagingRecomputer};
pub use types::{ActionType, PathologyClass, PipelineAction, PreparationSummary, StageLog};
