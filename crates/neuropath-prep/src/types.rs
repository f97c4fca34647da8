use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Pathology Classes
// ============================================================================

/// Mutually exclusive primary pathology class.
///
/// Codes follow the label column: 0 means no qualifying pathology and such
/// records are excluded from the cohort. The classifier works with
/// zero-based labels (`model_label`), so AD is 0 and Vascular is 4 there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PathologyClass {
    None,
    Ad,
    Tau,
    Tdp,
    LewyBody,
    Vascular,
}

impl PathologyClass {
    /// Every class that survives synthesis, in label order.
    pub const RETAINED: [PathologyClass; 5] = [
        PathologyClass::Ad,
        PathologyClass::Tau,
        PathologyClass::Tdp,
        PathologyClass::LewyBody,
        PathologyClass::Vascular,
    ];

    /// Numeric code stored in the `Class` column.
    pub fn code(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Ad => 1,
            Self::Tau => 2,
            Self::Tdp => 3,
            Self::LewyBody => 4,
            Self::Vascular => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Ad),
            2 => Some(Self::Tau),
            3 => Some(Self::Tdp),
            4 => Some(Self::LewyBody),
            5 => Some(Self::Vascular),
            _ => None,
        }
    }

    /// Zero-based label used by the classifier. `None` has no label.
    pub fn model_label(self) -> Option<u8> {
        self.code().checked_sub(1)
    }

    pub fn from_model_label(label: i64) -> Option<Self> {
        u8::try_from(label)
            .ok()
            .and_then(|l| l.checked_add(1))
            .filter(|code| *code > 0)
            .and_then(Self::from_code)
    }

    /// Short row label used in cross-tabulations.
    pub fn short_name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Ad => "AD",
            Self::Tau => "Tau",
            Self::Tdp => "TDP",
            Self::LewyBody => "LB",
            Self::Vascular => "Vasc",
        }
    }
}

impl fmt::Display for PathologyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

// ============================================================================
// Run Summary Types
// ============================================================================

/// Summary of what a preparation run did, for the JSON run report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreparationSummary {
    /// Total execution time in milliseconds.
    pub duration_ms: u64,

    /// Rows in the raw table.
    pub rows_raw: usize,
    /// Rows after the cohort filter.
    pub rows_after_cohort: usize,
    /// Rows with a non-zero pathology class.
    pub rows_labelled: usize,

    /// Columns in the raw table.
    pub columns_raw: usize,
    /// Width of the final feature matrix (identifiers excluded).
    pub feature_columns: usize,

    /// Row count per pathology class.
    pub class_counts: BTreeMap<String, usize>,

    /// Rows per split.
    pub train_rows: usize,
    pub validation_rows: usize,
    pub test_rows: usize,

    /// Audit trail of the actions taken.
    pub actions: Vec<PipelineAction>,

    /// Warnings and notes generated during the run.
    pub warnings: Vec<String>,
}

impl PreparationSummary {
    /// Create a new empty summary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an action to the summary.
    pub fn add_action(&mut self, action: PipelineAction) {
        self.actions.push(action);
    }

    /// Add a warning to the summary.
    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Percentage of raw rows that ended up labelled.
    pub fn retention_percentage(&self) -> f32 {
        if self.rows_raw == 0 {
            0.0
        } else {
            (self.rows_labelled as f32 / self.rows_raw as f32) * 100.0
        }
    }

    /// Move a stage's actions and warnings into the summary.
    pub fn absorb(&mut self, log: StageLog) {
        self.actions.extend(log.actions);
        self.warnings.extend(log.warnings);
    }
}

/// Actions and warnings collected by one stage.
#[derive(Debug, Clone, Default)]
pub struct StageLog {
    pub actions: Vec<PipelineAction>,
    pub warnings: Vec<String>,
}

impl StageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, action: PipelineAction) {
        tracing::debug!("{}: {}", action.target, action.description);
        self.actions.push(action);
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        tracing::warn!("{}", warning);
        self.warnings.push(warning);
    }
}

/// A single action taken during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineAction {
    /// Type of action performed.
    pub action_type: ActionType,
    /// Target of the action (variable name or "dataset").
    pub target: String,
    /// Human-readable description of the action.
    pub description: String,
    /// Additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl PipelineAction {
    pub fn new(action_type: ActionType, target: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            action_type,
            target: target.into(),
            description: description.into(),
            details: None,
        }
    }

    /// Add details to the action.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Types of actions recorded during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Records were excluded from the cohort.
    RowsRemoved,
    /// Pathology labels were derived.
    ClassDerived,
    /// Redundant variables were merged or recoded.
    VariableReconciled,
    /// A variable was added to the table and registry.
    VariableDerived,
    /// A column was removed from the dataset.
    ColumnRemoved,
    /// Sentinel codes were replaced with missing values.
    SentinelMasked,
    /// Missing values were imputed.
    ValueImputed,
    /// Categories were one-hot encoded.
    CategoriesEncoded,
    /// Correlated predictor pairs were flagged.
    RedundancyFlagged,
    /// The cohort was split into train/validation/test.
    DataSplit,
}

impl ActionType {
    /// Get a human-readable display name for the action type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::RowsRemoved => "Rows Removed",
            Self::ClassDerived => "Class Derived",
            Self::VariableReconciled => "Variable Reconciled",
            Self::VariableDerived => "Variable Derived",
            Self::ColumnRemoved => "Column Removed",
            Self::SentinelMasked => "Sentinel Masked",
            Self::ValueImputed => "Value Imputed",
            Self::CategoriesEncoded => "Categories Encoded",
            Self::RedundancyFlagged => "Redundancy Flagged",
            Self::DataSplit => "Data Split",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_codes() {
        for class in PathologyClass::RETAINED {
            assert_eq!(PathologyClass::from_code(class.code()), Some(class));
        }
        assert_eq!(PathologyClass::from_code(6), None);
    }

    #[test]
    fn test_model_labels_are_zero_based() {
        assert_eq!(PathologyClass::Ad.model_label(), Some(0));
        assert_eq!(PathologyClass::Vascular.model_label(), Some(4));
        assert_eq!(PathologyClass::None.model_label(), None);

        assert_eq!(PathologyClass::from_model_label(0), Some(PathologyClass::Ad));
        assert_eq!(PathologyClass::from_model_label(4), Some(PathologyClass::Vascular));
        assert_eq!(PathologyClass::from_model_label(5), None);
        assert_eq!(PathologyClass::from_model_label(-1), None);
    }

    #[test]
    fn test_summary_retention() {
        let mut summary = PreparationSummary::new();
        assert_eq!(summary.retention_percentage(), 0.0);
        summary.rows_raw = 200;
        summary.rows_labelled = 50;
        assert_eq!(summary.retention_percentage(), 25.0);

        summary.add_action(PipelineAction::new(
            ActionType::RowsRemoved,
            "dataset",
            "Excluded 150 records",
        ));
        assert_eq!(summary.actions.len(), 1);
        assert_eq!(summary.actions[0].action_type.display_name(), "Rows Removed");
    }
}
