//! Imputation module for handling missing values.
//!
//! Statistical strategies (mean, median, constant) selected per variable
//! type by the feature builder.

mod statistical;

pub use statistical::{ImputeStrategy, StatisticalImputer};
