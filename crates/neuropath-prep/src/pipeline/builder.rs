//! Main preparation pipeline.
//!
//! This module provides the `Pipeline` struct and its builder. A run takes
//! the raw visit table through every stage in order and returns the
//! feature matrix, labels, splits and the annotated pathology table.

use crate::analysis::{ErrorAnalysis, ErrorAnalyzer, PredictionBundle};
use crate::cohort::{CohortFilter, CohortStats};
use crate::config::PipelineConfig;
use crate::drugs::drug_vocabulary;
use crate::error::{PrepError, Result, ResultExt};
use crate::features::{FeatureBuilder, FeatureMatrix, PredictorSet};
use crate::missing::MissingValueNormalizer;
use crate::pathology::{
    CLASS_COLUMN, NEUROPATH_VARIABLES, PathologySynthesizer, inclusion_cascades, indicator_columns,
    source_variables,
};
use crate::pipeline::progress::{ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate};
use crate::pruning::{RedundancyPruner, RedundantPair};
use crate::reconcile::VariableReconciler;
use crate::reconcile::derived::{SUBJECT_ID, VISIT_DATE};
use crate::registry::VariableRegistry;
use crate::reporting::ReportGenerator;
use crate::split::{SplitIndices, StratifiedSplitter, stratum_keys};
use crate::staging::{BRAAK_COLUMN, NEURITIC_COLUMN, THAL_COLUMN};
use crate::types::{ActionType, PipelineAction, PreparationSummary, StageLog};
use crate::utils::{has_column, numeric_values};
use polars::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Variables used to stratify the split besides the class.
const SEX_COLUMN: &str = "SEX";
const EDUCATION_COLUMN: &str = "EDUC";

/// Everything a preparation run produces.
#[derive(Debug, Clone)]
pub struct PreparationResult {
    /// Identifiers and features, row-aligned with `labels`.
    pub features: FeatureMatrix,
    /// Class code (1-5) per row.
    pub labels: Vec<i32>,
    pub splits: SplitIndices,
    /// Identifiers, class, indicators and the raw neuropathology variables
    /// of every labelled record, before sentinel masking.
    pub annotated: DataFrame,
    pub predictors: PredictorSet,
    pub redundant_pairs: Vec<RedundantPair>,
    /// Manual drops that were present and removed.
    pub manual_drops: Vec<String>,
    pub drug_vocabulary: Vec<String>,
    pub cohort: CohortStats,
    /// The registry after reconciliation edits.
    pub registry: VariableRegistry,
    pub summary: PreparationSummary,
}

/// The preparation pipeline.
///
/// Use [`Pipeline::builder()`] to create a new pipeline.
///
/// # Example
///
/// ```rust,ignore
/// use neuropath_prep::{Pipeline, PipelineConfig};
///
/// let result = Pipeline::builder()
///     .config(PipelineConfig::builder().min_observations(50).build()?)
///     .registry(registry)
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .build()?
///     .run(dataframe)?;
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    registry: VariableRegistry,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

static_assertions::assert_impl_all!(Pipeline: Send);

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &VariableRegistry {
        &self.registry
    }

    /// Run every stage over the raw visit table.
    ///
    /// The pipeline's registry is left untouched; the edited copy is
    /// returned in the result.
    pub fn run(&self, df: DataFrame) -> Result<PreparationResult> {
        match self.run_internal(df) {
            Ok(result) => {
                self.report_progress(ProgressUpdate::complete("Preparation completed successfully"));
                Ok(result)
            }
            Err(e) => {
                self.report_progress(ProgressUpdate::failed(e.to_string()));
                error!("Pipeline error: {}", e);
                Err(e)
            }
        }
    }

    /// Join predictions to an annotated table and cross-tabulate errors.
    ///
    /// `identifiers` are the train rows followed by the validation rows,
    /// in the order the predictions were made.
    pub fn analyze(
        identifiers: &DataFrame,
        bundle: &PredictionBundle,
        annotated: &DataFrame,
    ) -> Result<ErrorAnalysis> {
        bundle.validate()?;
        let joined = ErrorAnalyzer::join(identifiers, &bundle.predictions, annotated)
            .context("Joining predictions to pathology labels")?;
        ErrorAnalyzer::analyze(&joined)
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn stage(&self, stage: PipelineStage, message: &str) {
        info!("{}", message);
        self.report_progress(ProgressUpdate::new(stage, 0.0, message));
    }

    fn run_internal(&self, df: DataFrame) -> Result<PreparationResult> {
        let start_time = Instant::now();
        let config = &self.config;
        let mut registry = self.registry.clone();
        let mut log = StageLog::new();

        self.stage(PipelineStage::Initializing, "Starting preparation pipeline...");
        let mut summary = PreparationSummary::new();
        summary.rows_raw = df.height();
        summary.columns_raw = df.width();

        // Step 1: cohort
        self.stage(PipelineStage::CohortFilter, "Step 1: Filtering cohort...");
        let (cohort, cohort_stats) = CohortFilter::apply(&df).context("During cohort filter")?;
        summary.rows_after_cohort = cohort.height();
        for (criterion, removed) in &cohort_stats.removed {
            if *removed > 0 {
                log.record(PipelineAction::new(
                    ActionType::RowsRemoved,
                    criterion.as_str(),
                    format!("Excluded {} records", removed),
                ));
            }
        }
        let drugs = drug_vocabulary(&cohort)?;

        // Step 2: labels
        self.stage(PipelineStage::ClassSynthesis, "Step 2: Deriving pathology classes...");
        let (mut table, class_counts) = PathologySynthesizer::new(config.suppression_semantics)
            .apply(&cohort)
            .context("During pathology class synthesis")?;
        summary.rows_labelled = table.height();
        for (class, count) in &class_counts {
            summary.class_counts.insert(class.to_string(), *count);
        }
        log.record(PipelineAction::new(
            ActionType::ClassDerived,
            CLASS_COLUMN,
            format!(
                "Labelled {} of {} records; {} without a qualifying pathology",
                table.height(),
                cohort.height(),
                cohort.height() - table.height()
            ),
        ));

        // Step 3: reconciliation edits table and registry together
        self.stage(PipelineStage::Reconciliation, "Step 3: Reconciling variables...");
        VariableReconciler::apply(&mut table, &mut registry, &mut log).context("During variable reconciliation")?;
        let annotated = Self::snapshot_annotated(&table)?;

        // Step 4: normalization
        self.stage(PipelineStage::Normalization, "Step 4: Normalizing missing values...");
        let mut protected = vec![CLASS_COLUMN];
        protected.extend(indicator_columns());
        let table = MissingValueNormalizer::apply(table, &registry, &protected, &mut log)
            .context("During missing-value normalization")?;

        // Step 5: predictor selection
        self.stage(PipelineStage::FeatureSelection, "Step 5: Selecting predictors...");
        let builder = FeatureBuilder::new(config.min_observations);
        let mut predictors = builder.select_predictors(&table, &registry, &mut log);
        builder.drop_sparse(&table, &mut predictors, &mut log);

        // Step 6: redundancy, on unimputed values
        self.stage(PipelineStage::RedundancyCheck, "Step 6: Checking redundancy...");
        let redundant_pairs = RedundancyPruner::new(config.correlation_threshold).find_pairs(
            &table,
            &predictors.numeric_like(&table),
            &mut log,
        )?;

        // Step 7: feature matrix
        self.stage(PipelineStage::FeatureBuilding, "Step 7: Building feature matrix...");
        let mut features = builder.build(&table, &predictors, &mut log).context("During feature building")?;
        let manual_drops = features.drop_columns(&config.manual_drops)?;
        if !manual_drops.is_empty() {
            log.record(
                PipelineAction::new(
                    ActionType::ColumnRemoved,
                    "features",
                    format!("Dropped {} columns after redundancy review", manual_drops.len()),
                )
                .with_details(manual_drops.join(", ")),
            );
        }
        summary.feature_columns = features.features.width();

        // Step 8: split
        self.stage(PipelineStage::Splitting, "Step 8: Splitting cohort...");
        let classes = numeric_values(&table, CLASS_COLUMN)?;
        let strata = stratum_keys(
            &classes,
            &Self::optional_column(&table, SEX_COLUMN, &mut log)?,
            &Self::optional_column(&table, EDUCATION_COLUMN, &mut log)?,
            config.education_threshold,
        );
        let splits = StratifiedSplitter::new(config.seed).three_way(
            &strata,
            config.test_fraction,
            config.validation_fraction,
        );
        summary.train_rows = splits.train.len();
        summary.validation_rows = splits.validation.len();
        summary.test_rows = splits.test.len();
        log.record(PipelineAction::new(
            ActionType::DataSplit,
            "dataset",
            format!(
                "Split into {} train, {} validation and {} test rows",
                splits.train.len(),
                splits.validation.len(),
                splits.test.len()
            ),
        ));

        let labels: Vec<i32> = classes.iter().map(|c| c.map_or(0, |v| v as i32)).collect();
        summary.absorb(log);
        summary.duration_ms = start_time.elapsed().as_millis() as u64;

        let result = PreparationResult {
            features,
            labels,
            splits,
            annotated,
            predictors,
            redundant_pairs,
            manual_drops,
            drug_vocabulary: drugs,
            cohort: cohort_stats,
            registry,
            summary,
        };

        // Step 9: outputs
        if config.save_to_disk {
            self.stage(PipelineStage::ReportGeneration, "Step 9: Writing outputs...");
            ReportGenerator::new(config.output_dir.clone())
                .write_preparation(&result, config, config.generate_reports)
                .context("Writing outputs")?;
        }

        info!(
            "Preparation complete: {} rows, {} features in {} ms",
            result.labels.len(),
            result.summary.feature_columns,
            result.summary.duration_ms
        );
        Ok(result)
    }

    /// Identifier, label and raw neuropathology columns of the labelled
    /// records, taken before any sentinel is masked.
    fn snapshot_annotated(table: &DataFrame) -> Result<DataFrame> {
        let mut names: Vec<&str> = vec![SUBJECT_ID, VISIT_DATE, CLASS_COLUMN];
        names.extend(indicator_columns());
        let inclusion_sources = source_variables(&inclusion_cascades());
        let staging = [THAL_COLUMN, BRAAK_COLUMN, NEURITIC_COLUMN];
        for name in NEUROPATH_VARIABLES
            .iter()
            .copied()
            .chain(inclusion_sources)
            .chain(staging)
        {
            if !names.contains(&name) && has_column(table, name) {
                names.push(name);
            }
        }
        Ok(table.select(names)?)
    }

    /// A stratification variable, or all-missing with a warning when absent.
    fn optional_column(table: &DataFrame, name: &str, log: &mut StageLog) -> Result<Vec<Option<f64>>> {
        if has_column(table, name) {
            numeric_values(table, name)
        } else {
            log.warn(format!("{} is absent; stratifying without it", name));
            Ok(vec![None; table.height()])
        }
    }
}

/// Builder for creating a [`Pipeline`] instance.
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    registry: Option<VariableRegistry>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

static_assertions::assert_impl_all!(PipelineBuilder: Send);

impl PipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the variable registry. Required.
    pub fn registry(mut self, registry: VariableRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set a progress reporter for receiving updates during a run.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Build the pipeline.
    ///
    /// Fails if the configuration is invalid or no registry was given.
    pub fn build(self) -> Result<Pipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let registry = self
            .registry
            .ok_or_else(|| PrepError::InvalidConfig("a variable registry is required".to_string()))?;

        Ok(Pipeline {
            config,
            registry,
            progress_reporter: self.progress_reporter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{VariableSpec, VariableType};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> VariableRegistry {
        VariableRegistry::from_specs(vec![VariableSpec::new("EDUC", VariableType::Numeric)]).unwrap()
    }

    #[test]
    fn test_builder_requires_registry() {
        let err = Pipeline::builder().build().err().unwrap();
        assert_eq!(err.error_code(), "INVALID_CONFIG");

        let pipeline = Pipeline::builder().registry(registry()).build().unwrap();
        assert_eq!(pipeline.config().seed, 666);
        assert_eq!(pipeline.registry().len(), 1);
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let mut config = PipelineConfig::default();
        config.test_fraction = 1.0;
        let err = Pipeline::builder().config(config).registry(registry()).build().err().unwrap();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_progress_callback_and_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let pipeline = Pipeline::builder()
            .registry(registry())
            .on_progress(move |_update| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        // No cohort columns at all: a schema failure at the first stage
        let df = df!["EDUC" => [12.0]].unwrap();
        let err = pipeline.run(df).err().unwrap();
        assert!(err.is_schema_error());
        // Initializing, cohort filter, failed
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
