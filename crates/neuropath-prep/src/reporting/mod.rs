//! Artifact and report writing.
//!
//! A preparation run writes the split matrices and labels as CSV, the
//! redundant pairs, the drug vocabulary and a JSON run report. An analysis
//! run writes one plain-text table per cross-tabulation plus a JSON report.
//!
//! # Example
//!
//! ```rust,ignore
//! use neuropath_prep::reporting::ReportGenerator;
//!
//! let generator = ReportGenerator::new("output");
//! generator.write_preparation(&result, &config, true)?;
//! ```

mod generator;

pub use generator::{AnalysisReport, PreparationReport, ReportGenerator};
