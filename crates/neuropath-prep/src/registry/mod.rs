//! Variable registry.
//!
//! The registry maps each raw variable to a keep flag, a type tag that
//! selects its imputation/encoding strategy, an optional NaN-sentinel
//! specification and a free-text comment. It is owned by the pipeline and
//! handed `&mut` to the stages that edit it (reconciler, derived variables).

mod sentinel;

pub use sentinel::SentinelSpec;

use crate::error::{PrepError, Result};
use crate::utils::{has_column, string_values};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Column names of the registry table.
pub const VARIABLE_COLUMN: &str = "Variable";
pub const KEEP_COLUMN: &str = "Keep";
pub const TYPE_COLUMN: &str = "Type";
pub const NAN_VALUES_COLUMN: &str = "NaNValues";
pub const COMMENTS_COLUMN: &str = "Comments";

/// Type tag that selects how a kept variable becomes features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableType {
    /// Interval/ratio values, mean-imputed.
    Numeric,
    /// Ordered codes, median-imputed.
    Ordinal,
    /// 0/1 flags, zero-imputed.
    Boolean,
    /// Unordered codes, one-hot expanded.
    Nominal,
    /// Identifiers and dates; carried alongside, never a feature.
    Id,
}

impl VariableType {
    /// Parse a registry type tag. Blank text means "no tag".
    pub fn parse(variable: &str, text: &str) -> Result<Option<Self>> {
        let tag = text.trim();
        if tag.is_empty() {
            return Ok(None);
        }
        let parsed = match tag.to_ascii_lowercase().as_str() {
            "numeric" => Self::Numeric,
            "ordinal" => Self::Ordinal,
            "boolean" => Self::Boolean,
            "nominal" => Self::Nominal,
            "id" => Self::Id,
            _ => {
                return Err(PrepError::InvalidRegistry(format!(
                    "unknown type '{}' for variable '{}'",
                    tag, variable
                )));
            }
        };
        Ok(Some(parsed))
    }

    /// Whether Pearson correlation is meaningful for this type.
    pub fn is_numeric_like(self) -> bool {
        matches!(self, Self::Numeric | Self::Ordinal | Self::Boolean)
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Numeric => "Numeric",
            Self::Ordinal => "Ordinal",
            Self::Boolean => "Boolean",
            Self::Nominal => "Nominal",
            Self::Id => "ID",
        };
        f.write_str(name)
    }
}

/// One registry row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    pub keep: bool,
    pub var_type: Option<VariableType>,
    pub sentinels: Option<SentinelSpec>,
    pub comment: Option<String>,
}

impl VariableSpec {
    /// A kept variable with the given type and no sentinels.
    pub fn new(name: impl Into<String>, var_type: VariableType) -> Self {
        Self {
            name: name.into(),
            keep: true,
            var_type: Some(var_type),
            sentinels: None,
            comment: None,
        }
    }

    pub fn with_keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    pub fn with_sentinels(mut self, sentinels: SentinelSpec) -> Self {
        self.sentinels = Some(sentinels);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Ordered registry of variable specifications.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VariableRegistry {
    entries: Vec<VariableSpec>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from specs; duplicate names are rejected.
    pub fn from_specs(specs: impl IntoIterator<Item = VariableSpec>) -> Result<Self> {
        let mut registry = Self::new();
        for spec in specs {
            if registry.contains(&spec.name) {
                return Err(PrepError::InvalidRegistry(format!(
                    "variable '{}' is listed more than once",
                    spec.name
                )));
            }
            registry.upsert(spec);
        }
        Ok(registry)
    }

    /// Build a registry from a table with `Variable`, `Keep` and `Type`
    /// columns, plus optional `NaNValues` and `Comments`.
    ///
    /// Every sentinel expression is parsed here; the first malformed one
    /// aborts the load.
    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        for required in [VARIABLE_COLUMN, KEEP_COLUMN, TYPE_COLUMN] {
            if !has_column(df, required) {
                return Err(PrepError::InvalidRegistry(format!(
                    "missing column '{}'",
                    required
                )));
            }
        }

        let names = string_values(df, VARIABLE_COLUMN)?;
        let keeps = string_values(df, KEEP_COLUMN)?;
        let types = string_values(df, TYPE_COLUMN)?;
        let nan_values = optional_strings(df, NAN_VALUES_COLUMN)?;
        let comments = optional_strings(df, COMMENTS_COLUMN)?;

        let mut specs = Vec::with_capacity(names.len());
        for (row, name) in names.into_iter().enumerate() {
            let name = match name.map(|n| n.trim().to_string()) {
                Some(n) if !n.is_empty() => n,
                _ => {
                    return Err(PrepError::InvalidRegistry(format!(
                        "row {} has no variable name",
                        row + 1
                    )));
                }
            };

            let keep = parse_keep(&name, keeps[row].as_deref())?;
            let var_type = match types[row].as_deref() {
                Some(text) => VariableType::parse(&name, text)?,
                None => None,
            };
            let sentinels = match nan_values[row].as_deref().map(str::trim) {
                Some(text) if !is_blank(text) => Some(SentinelSpec::parse(&name, text)?),
                _ => None,
            };
            let comment = comments[row]
                .as_deref()
                .map(str::trim)
                .filter(|c| !is_blank(c))
                .map(str::to_string);

            specs.push(VariableSpec {
                name,
                keep,
                var_type,
                sentinels,
                comment,
            });
        }

        let registry = Self::from_specs(specs)?;
        debug!(
            "Loaded registry: {} variables, {} kept",
            registry.len(),
            registry.kept_names().len()
        );
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&VariableSpec> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariableSpec> {
        self.entries.iter()
    }

    /// Registered and flagged keep.
    pub fn is_kept(&self, name: &str) -> bool {
        self.get(name).is_some_and(|spec| spec.keep)
    }

    pub fn type_of(&self, name: &str) -> Option<VariableType> {
        self.get(name).and_then(|spec| spec.var_type)
    }

    /// Names of kept variables, in registry order.
    pub fn kept_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|spec| spec.keep)
            .map(|spec| spec.name.as_str())
            .collect()
    }

    /// Variables whose comment matches `comment` exactly, kept or not.
    pub fn all_with_comment(&self, comment: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|spec| spec.comment.as_deref() == Some(comment))
            .map(|spec| spec.name.as_str())
            .collect()
    }

    /// Kept variables whose comment matches `comment` exactly.
    pub fn kept_with_comment(&self, comment: &str) -> Vec<&str> {
        self.all_with_comment(comment)
            .into_iter()
            .filter(|name| self.is_kept(name))
            .collect()
    }

    /// Insert a spec, replacing any existing entry of the same name in place.
    pub fn upsert(&mut self, spec: VariableSpec) {
        match self.index.get(&spec.name) {
            Some(&i) => self.entries[i] = spec,
            None => {
                self.index.insert(spec.name.clone(), self.entries.len());
                self.entries.push(spec);
            }
        }
    }

    /// Register `spec` only if the name is not already present.
    /// Returns whether it was added.
    pub fn register_if_absent(&mut self, spec: VariableSpec) -> bool {
        if self.contains(&spec.name) {
            false
        } else {
            self.upsert(spec);
            true
        }
    }

    /// Set the keep flag. Returns false when the variable is not registered.
    pub fn set_keep(&mut self, name: &str, keep: bool) -> bool {
        match self.index.get(name) {
            Some(&i) => {
                self.entries[i].keep = keep;
                true
            }
            None => false,
        }
    }

    /// Mark a variable kept with the given type, registering it if needed.
    pub fn ensure_kept(&mut self, name: &str, var_type: VariableType) {
        match self.index.get(name) {
            Some(&i) => {
                let entry = &mut self.entries[i];
                entry.keep = true;
                entry.var_type = Some(var_type);
            }
            None => self.upsert(VariableSpec::new(name, var_type)),
        }
    }
}

fn optional_strings(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    if has_column(df, name) {
        string_values(df, name)
    } else {
        Ok(vec![None; df.height()])
    }
}

fn is_blank(text: &str) -> bool {
    text.is_empty() || text.eq_ignore_ascii_case("nan") || text.eq_ignore_ascii_case("na")
}

fn parse_keep(variable: &str, text: Option<&str>) -> Result<bool> {
    let text = text.map(str::trim).unwrap_or("");
    match text.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "1.0" | "yes" | "y" => Ok(true),
        "false" | "f" | "0" | "0.0" | "no" | "n" | "" => Ok(false),
        other => Err(PrepError::InvalidRegistry(format!(
            "unrecognised keep flag '{}' for variable '{}'",
            other, variable
        ))),
    }
}
