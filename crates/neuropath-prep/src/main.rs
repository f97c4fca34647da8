//! CLI entry point for the neuropathology preparation pipeline.

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use neuropath_prep::loader::{concat_rows, load_dataset, load_predictions, load_registry, load_text_table};
use neuropath_prep::{Pipeline, PipelineConfig, PreparationResult, ReportGenerator, SuppressionSemantics};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Pathology-class derivation and feature preparation for autopsy-cohort data",
    long_about = "Derives a five-way primary pathology label from neuropathology variables,\n\
                  builds a modeling-ready feature matrix from clinical variables, and\n\
                  analyzes classifier errors against recomputed ABC staging.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  RUST_LOG    Log filter; overrides --log-level (may be set in .env)\n\n\
                  EXAMPLES:\n  \
                  # Prepare splits and labels\n  \
                  neuropath-prep prepare --data nacc.csv --registry variables.csv -o output/\n\n  \
                  # Analyze predictions from a classifier trained on output/X_train.csv\n  \
                  neuropath-prep analyze --labels output/pathology_labels.csv \\\n      \
                  --train output/X_train.csv --val output/X_val.csv --predictions preds.json"
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show warnings and errors)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Filter, label and featurize the raw visit table
    Prepare(PrepareArgs),
    /// Cross-tabulate classifier errors against pathology and staging
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug)]
struct PrepareArgs {
    /// Raw visit table (CSV)
    #[arg(long)]
    data: PathBuf,

    /// Variable registry (CSV with Variable, Keep, Type, NaNValues, Comments)
    #[arg(long)]
    registry: PathBuf,

    /// Output directory for splits, labels and reports
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// JSON configuration file; command-line flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Minimum non-missing observations a predictor needs
    #[arg(long)]
    min_observations: Option<usize>,

    /// Absolute correlation above which predictor pairs are flagged
    #[arg(long)]
    correlation_threshold: Option<f64>,

    /// Seed for the stratified split
    #[arg(long)]
    seed: Option<u64>,

    /// Evaluate guarded suppression rules with their historical precedence
    #[arg(long)]
    literal_suppression: bool,

    /// Feature column to drop after redundancy review (repeatable)
    #[arg(long = "drop")]
    drops: Vec<String>,

    /// Skip writing prep_report.json
    #[arg(long)]
    no_report: bool,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Annotated pathology table written by `prepare`
    #[arg(long)]
    labels: PathBuf,

    /// Training feature matrix the classifier was fitted on
    #[arg(long)]
    train: PathBuf,

    /// Validation feature matrix, predicted after the training rows
    #[arg(long)]
    val: PathBuf,

    /// Prediction bundle JSON: {"predictions": [...], "selected_features": [...]}
    #[arg(long)]
    predictions: PathBuf,

    /// Output directory for the tables and report
    #[arg(short, long, default_value = "output")]
    output: PathBuf,
}

/// Initialize the tracing subscriber for logging.
fn init_logging(level: &str, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    // .env may carry RUST_LOG, so load it before the subscriber reads it
    dotenv().ok();

    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.quiet);

    match cli.command {
        Command::Prepare(args) => run_prepare(args, cli.quiet),
        Command::Analyze(args) => run_analyze(args),
    }
}

fn require_file(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(anyhow!("Input file not found: {}", path.display()));
    }
    Ok(())
}

/// Merge the optional config file with command-line overrides.
fn build_config(args: &PrepareArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            require_file(path)?;
            let text = fs::read_to_string(path)?;
            serde_json::from_str::<PipelineConfig>(&text)
                .with_context(|| format!("Parsing config {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };

    config.output_dir = args.output.clone();
    if let Some(count) = args.min_observations {
        config.min_observations = count;
    }
    if let Some(threshold) = args.correlation_threshold {
        config.correlation_threshold = threshold;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if args.literal_suppression {
        config.suppression_semantics = SuppressionSemantics::Literal;
    }
    config.manual_drops.extend(args.drops.iter().cloned());
    if args.no_report {
        config.generate_reports = false;
    }

    config.validate()?;
    Ok(config)
}

fn run_prepare(args: PrepareArgs, quiet: bool) -> Result<()> {
    require_file(&args.data)?;
    require_file(&args.registry)?;
    let config = build_config(&args)?;

    let registry = load_registry(&args.registry)?;
    let data = load_dataset(&args.data)?;

    let mut builder = Pipeline::builder().config(config).registry(registry);
    if !quiet {
        builder = builder.on_progress(|update| {
            info!(
                "[{:.0}%] {}: {}",
                update.progress * 100.0,
                update.stage.display_name(),
                update.message
            );
        });
    }
    let pipeline = builder.build()?;

    match pipeline.run(data) {
        Ok(result) => {
            print_preparation_summary(&result, &args.output);
            Ok(())
        }
        Err(e) => {
            error!("Preparation failed [{}]: {}", e.error_code(), e);
            Err(anyhow!("Preparation failed: {}", e))
        }
    }
}

fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    for path in [&args.labels, &args.train, &args.val, &args.predictions] {
        require_file(path)?;
    }

    let annotated = load_dataset(&args.labels)?;
    let identifiers = concat_rows(&[load_text_table(&args.train)?, load_text_table(&args.val)?])?;
    let bundle = load_predictions(&args.predictions)?;
    if !bundle.selected_features.is_empty() {
        info!("Classifier used {} selected features", bundle.selected_features.len());
    }

    let analysis = Pipeline::analyze(&identifiers, &bundle, &annotated).map_err(|e| {
        error!("Analysis failed [{}]: {}", e.error_code(), e);
        anyhow!("Analysis failed: {}", e)
    })?;
    ReportGenerator::new(&args.output).write_analysis(&analysis)?;

    println!("{}", analysis.confusion);
    println!("{}", analysis.ad_false_alarms);
    println!("{}", analysis.non_ad_false_alarms);
    println!("{}", analysis.non_ad_indicators);
    println!("{}", analysis.vascular_false_alarms);
    println!("Tables written to {}", args.output.display());
    Ok(())
}

/// Print a human-readable summary.
///
/// Uses `println!` so the summary is shown regardless of log level.
fn print_preparation_summary(result: &PreparationResult, output: &Path) {
    let summary = &result.summary;
    println!("\n{}", "=".repeat(60));
    println!("PREPARATION SUMMARY");
    println!("{}", "=".repeat(60));
    println!("  Raw table:        {} rows x {} columns", summary.rows_raw, summary.columns_raw);
    println!("  After cohort:     {} rows", summary.rows_after_cohort);
    println!(
        "  Labelled:         {} rows ({:.1}% of raw)",
        summary.rows_labelled,
        summary.retention_percentage()
    );
    for (class, count) in &summary.class_counts {
        println!("    {:<8} {}", class, count);
    }
    println!("  Features:         {}", summary.feature_columns);
    println!(
        "  Splits:           {} train / {} val / {} test",
        summary.train_rows, summary.validation_rows, summary.test_rows
    );
    println!("  Redundant pairs:  {}", result.redundant_pairs.len());
    println!("  Drug vocabulary:  {} ingredients", result.drug_vocabulary.len());
    if !summary.warnings.is_empty() {
        println!("\n  Warnings:");
        for warning in &summary.warnings {
            println!("    - {}", warning);
        }
    }
    println!("\n  Outputs in:       {}", output.display());
    println!("  Completed in {} ms", summary.duration_ms);
    println!("{}", "=".repeat(60));
}
