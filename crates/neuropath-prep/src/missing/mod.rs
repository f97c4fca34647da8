//! Registry-driven missing-value normalization.
//!
//! Columns the registry does not keep are dropped, then each kept variable
//! with a sentinel specification has its sentinel codes replaced by missing.
//! Sentinels are applied per variable, never globally.

use crate::error::{PrepError, Result};
use crate::registry::{SentinelSpec, VariableRegistry};
use crate::types::{ActionType, PipelineAction, StageLog};
use crate::utils::{column_names, drop_existing, is_numeric_dtype, numeric_values, set_numeric};
use polars::prelude::*;
use tracing::info;

/// Replace sentinel codes with `None`. Returns the number of values masked.
pub fn mask_values(values: &mut [Option<f64>], spec: &SentinelSpec) -> usize {
    let mut masked = 0;
    for value in values.iter_mut() {
        if value.is_some_and(|v| spec.matches(v)) {
            *value = None;
            masked += 1;
        }
    }
    masked
}

/// Applies the registry's keep flags and sentinel specifications.
pub struct MissingValueNormalizer;

impl MissingValueNormalizer {
    /// Drop unkept and unregistered columns, then mask sentinels.
    ///
    /// `protected` columns (labels added by earlier stages) are kept even
    /// though the registry does not list them.
    pub fn apply(
        df: DataFrame,
        registry: &VariableRegistry,
        protected: &[&str],
        log: &mut StageLog,
    ) -> Result<DataFrame> {
        let mut df = Self::drop_unkept(df, registry, protected, log);
        Self::mask_sentinels(&mut df, registry, log)?;
        Ok(df)
    }

    /// Remove every column that is not both registered and kept.
    pub fn drop_unkept(
        df: DataFrame,
        registry: &VariableRegistry,
        protected: &[&str],
        log: &mut StageLog,
    ) -> DataFrame {
        let mut retired = Vec::new();
        let mut unregistered = Vec::new();
        for name in column_names(&df) {
            if protected.contains(&name.as_str()) || registry.is_kept(&name) {
                continue;
            }
            if registry.contains(&name) {
                retired.push(name);
            } else {
                unregistered.push(name);
            }
        }

        if !retired.is_empty() {
            log.record(
                PipelineAction::new(
                    ActionType::ColumnRemoved,
                    "dataset",
                    format!("Dropped {} columns flagged not-kept", retired.len()),
                )
                .with_details(retired.join(", ")),
            );
        }
        if !unregistered.is_empty() {
            log.record(
                PipelineAction::new(
                    ActionType::ColumnRemoved,
                    "dataset",
                    format!("Dropped {} columns absent from the registry", unregistered.len()),
                )
                .with_details(unregistered.join(", ")),
            );
        }

        let mut dropped = retired;
        dropped.extend(unregistered);
        drop_existing(df, &dropped)
    }

    /// Mask sentinel codes in every kept variable that declares them.
    /// Running this twice changes nothing the second time.
    ///
    /// A declared variable whose column holds text is an error; an
    /// all-missing column has nothing to mask and is skipped.
    pub fn mask_sentinels(df: &mut DataFrame, registry: &VariableRegistry, log: &mut StageLog) -> Result<usize> {
        let mut total = 0;
        for spec in registry.iter().filter(|spec| spec.keep) {
            let Some(sentinels) = &spec.sentinels else {
                continue;
            };
            let Ok(column) = df.column(&spec.name) else {
                continue;
            };
            if column.null_count() == column.len() {
                continue;
            }
            if !is_numeric_dtype(column.dtype()) {
                return Err(PrepError::NonNumericSentinelColumn {
                    variable: spec.name.clone(),
                    sentinels: sentinels.to_string(),
                    dtype: column.dtype().to_string(),
                });
            }

            let mut values = numeric_values(df, &spec.name)?;
            let masked = mask_values(&mut values, sentinels);
            if masked > 0 {
                set_numeric(df, &spec.name, values)?;
                log.record(
                    PipelineAction::new(
                        ActionType::SentinelMasked,
                        spec.name.as_str(),
                        format!("Masked sentinel codes {}", sentinels),
                    )
                    .with_details(format!("{} values set missing", masked)),
                );
            }
            total += masked;
        }

        info!("Masked {} sentinel values", total);
        Ok(total)
    }
}
