//! Pathology class synthesis.
//!
//! Five indicators are derived per record from overlapping neuropathology
//! variables, each by an ordered rule cascade with an inclusion phase and a
//! suppression phase. The indicators then collapse into one class by fixed
//! precedence: AD, then Tau, TDP, Lewy body and Vascular, each overwriting
//! the previous assignment. Records left at class 0 leave the cohort.

pub mod rules;

use crate::config::SuppressionSemantics;
use crate::error::{PrepError, Result};
use crate::types::PathologyClass;
use crate::utils::take_rows;
use polars::prelude::*;
use rules::{Cascade, Operand, Predicate, SourceTable};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Column holding the synthesized class code.
pub const CLASS_COLUMN: &str = "Class";

/// Variables that mark FTLD tauopathies.
pub const TAU_SOURCES: [&str; 11] = [
    "NPFTDTAU", "NACCPICK", "NACCCBD", "NACCPROG", "NPFTDT2", "NPFTDT5", "NPFTDT6", "NPFTDT7",
    "NPFTDT9", "NPFRONT", "NPTAU",
];

/// Variables that mark FTLD with TDP-43 inclusions, ALS included.
pub const TDP_SOURCES: [&str; 3] = ["NPFTD", "NPFTDTDP", "NPALSMND"];

/// Derived vascular summary variables plus the primary-vascular marker.
pub const VASCULAR_SOURCES: [&str; 5] = ["NPINF", "NACCMICR", "NACCHEM", "NPPATH", "NPPVASC"];

/// Neuropathology table variables. They describe the outcome, so none of
/// them may become a predictor.
pub const NEUROPATH_VARIABLES: &[&str] = &[
    "NPPMIH", "NPFIX", "NPFIXX", "NPWBRWT", "NPWBRF", "NACCBRNN", "NPGRCCA", "NPGRLA", "NPGRHA",
    "NPGRSNH", "NPGRLCH", "NACCAVAS", "NPTAN", "NPTANX", "NPABAN", "NPABANX", "NPASAN", "NPASANX",
    "NPTDPAN", "NPTDPANX", "NPHISMB", "NPHISG", "NPHISSS", "NPHIST", "NPHISO", "NPHISOX",
    "NPTHAL", "NACCBRAA", "NACCNEUR", "NPADNC", "NACCDIFF", "NACCVASC", "NACCAMY", "NPLINF",
    "NPLAC", "NPINF", "NPINF1A", "NPINF1B", "NPINF1D", "NPINF1F", "NPINF2A", "NPINF2B",
    "NPINF2D", "NPINF2F", "NPINF3A", "NPINF3B", "NPINF3D", "NPINF3F", "NPINF4A", "NPINF4B",
    "NPINF4D", "NPINF4F", "NACCINF", "NPHEM", "NPHEMO", "NPHEMO1", "NPHEMO2", "NPHEMO3",
    "NPMICRO", "NPOLD", "NPOLD1", "NPOLD2", "NPOLD3", "NPOLD4", "NACCMICR", "NPOLDD", "NPOLDD1",
    "NPOLDD2", "NPOLDD3", "NPOLDD4", "NACCHEM", "NACCARTE", "NPWMR", "NPPATH", "NACCNEC",
    "NPPATH2", "NPPATH3", "NPPATH4", "NPPATH5", "NPPATH6", "NPPATH7", "NPPATH8", "NPPATH9",
    "NPPATH10", "NPPATH11", "NPPATHO", "NPPATHOX", "NPART", "NPOANG", "NACCLEWY", "NPLBOD",
    "NPNLOSS", "NPHIPSCL", "NPSCL", "NPFTDTAU", "NACCPICK", "NPFTDT2", "NACCCBD", "NACCPROG",
    "NPFTDT5", "NPFTDT6", "NPFTDT7", "NPFTDT8", "NPFTDT9", "NPFTDT10", "NPFRONT", "NPTAU",
    "NPFTD", "NPFTDTDP", "NPALSMND", "NPOFTD", "NPOFTD1", "NPOFTD2", "NPOFTD3", "NPOFTD4",
    "NPOFTD5", "NPFTDNO", "NPFTDSPC", "NPTDPA", "NPTDPB", "NPTDPC", "NPTDPD", "NPTDPE", "NPPDXA",
    "NPPDXB", "NACCPRIO", "NPPDXD", "NPPDXE", "NPPDXF", "NPPDXG", "NPPDXH", "NPPDXI", "NPPDXJ",
    "NPPDXK", "NPPDXL", "NPPDXM", "NPPDXN", "NACCDOWN", "NACCOTHP", "NACCWRI1", "NACCWRI2",
    "NACCWRI3", "NACCBNKF", "NPBNKB", "NACCFORM", "NACCPARA", "NACCCSFP", "NPBNKF", "NPFAUT",
    "NPFAUT1", "NPFAUT2", "NPFAUT3", "NPFAUT4", "NACCINT", "NPNIT", "NPCERAD", "NPADRDA",
    "NPOCRIT", "NPVOTH", "NPLEWYCS", "NPGENE", "NPFHSPEC", "NPCHROM", "NPPNORM", "NPCNORM",
    "NPPADP", "NPCADP", "NPPAD", "NPCAD", "NPPLEWY", "NPCLEWY", "NPPVASC", "NPCVASC", "NPPFTLD",
    "NPCFTLD", "NPPHIPP", "NPCHIPP", "NPPPRION", "NPCPRION", "NPPOTH1", "NPCOTH1", "NPOTH1X",
    "NPPOTH2", "NPCOTH2", "NPOTH2X", "NPPOTH3", "NPCOTH3", "NPOTH3X",
];

/// One of the five pathology indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Indicator {
    Ad,
    Tau,
    Tdp,
    Lewy,
    Vascular,
}

impl Indicator {
    pub const ALL: [Indicator; 5] = [
        Indicator::Ad,
        Indicator::Tau,
        Indicator::Tdp,
        Indicator::Lewy,
        Indicator::Vascular,
    ];

    /// Name of the indicator column.
    pub fn column(self) -> &'static str {
        match self {
            Self::Ad => "ADPath",
            Self::Tau => "TauPath",
            Self::Tdp => "TDPPath",
            Self::Lewy => "LBPath",
            Self::Vascular => "VPath",
        }
    }

    /// The class this indicator assigns when set.
    pub fn class(self) -> PathologyClass {
        match self {
            Self::Ad => PathologyClass::Ad,
            Self::Tau => PathologyClass::Tau,
            Self::Tdp => PathologyClass::Tdp,
            Self::Lewy => PathologyClass::LewyBody,
            Self::Vascular => PathologyClass::Vascular,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Ad => 0,
            Self::Tau => 1,
            Self::Tdp => 2,
            Self::Lewy => 3,
            Self::Vascular => 4,
        }
    }
}

/// Indicator column names, in label order.
pub fn indicator_columns() -> Vec<&'static str> {
    Indicator::ALL.iter().map(|i| i.column()).collect()
}

/// The five indicator values of one record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndicatorFlags([bool; 5]);

impl IndicatorFlags {
    pub fn get(&self, indicator: Indicator) -> bool {
        self.0[indicator.index()]
    }

    pub fn set(&mut self, indicator: Indicator, value: bool) {
        self.0[indicator.index()] = value;
    }

    /// Collapse to one class. Later indicators overwrite earlier ones, so
    /// Vascular wins whenever it is set.
    pub fn class(&self) -> PathologyClass {
        let precedence = [
            Indicator::Ad,
            Indicator::Tau,
            Indicator::Tdp,
            Indicator::Lewy,
            Indicator::Vascular,
        ];
        precedence
            .iter()
            .fold(PathologyClass::None, |class, &indicator| {
                if self.get(indicator) {
                    indicator.class()
                } else {
                    class
                }
            })
    }
}

fn raw(name: &'static str) -> Operand {
    Operand::Raw(name)
}

fn flag(indicator: Indicator) -> Operand {
    Operand::Flag(indicator)
}

fn unless(operand: Operand, primary: &'static str) -> Predicate {
    Predicate::Unless { operand, primary }
}

/// AD from the ABC-derived NPADNC and the primary-AD marker.
pub fn ad_cascade() -> Cascade {
    Cascade::new(Indicator::Ad)
        .set_if(Predicate::OneOf("NPADNC", &[2.0, 3.0]))
        .set_if(Predicate::Equals(raw("NPPAD"), 1.0))
        .clear_if(Predicate::Equals(raw("NPPAD"), 2.0))
        .clear_if(Predicate::Equals(raw("NPCAD"), 1.0))
        .clear_if(Predicate::Equals(raw("NPPVASC"), 1.0))
        .clear_if(Predicate::Equals(raw("NPPLEWY"), 1.0))
        .clear_if(Predicate::Equals(raw("NPPFTLD"), 1.0))
}

/// Tau, suppressed by AD and by contributing-only FTLD.
pub fn tau_cascade() -> Cascade {
    tau_inclusion()
        .clear_if(Predicate::Equals(flag(Indicator::Ad), 1.0))
        .clear_if(Predicate::Equals(raw("NPCFTLD"), 1.0))
}

/// Lewy body disease, excluding amygdala-, brainstem-predominant and
/// olfactory-only cases.
pub fn lewy_cascade() -> Cascade {
    lewy_inclusion()
        .clear_if(Predicate::Equals(raw("NPCLEWY"), 1.0))
        .clear_if(unless(flag(Indicator::Ad), "NPPLEWY"))
        .clear_if(unless(flag(Indicator::Tau), "NPPLEWY"))
}

/// TDP-43, suppressed by AD, Lewy and Tau.
pub fn tdp_cascade() -> Cascade {
    tdp_inclusion()
        .clear_if(Predicate::Equals(flag(Indicator::Ad), 1.0))
        .clear_if(Predicate::Equals(flag(Indicator::Lewy), 1.0))
        .clear_if(Predicate::Equals(flag(Indicator::Tau), 1.0))
}

/// Vascular, suppressed by any other pathology unless marked primary.
pub fn vascular_cascade() -> Cascade {
    vascular_inclusion()
        .clear_if(Predicate::Equals(raw("NPPVASC"), 2.0))
        .clear_if(Predicate::Equals(raw("NPCVASC"), 1.0))
        .clear_if(unless(flag(Indicator::Ad), "NPPVASC"))
        .clear_if(unless(flag(Indicator::Lewy), "NPPVASC"))
        .clear_if(unless(raw("NPPFTLD"), "NPPVASC"))
        .clear_if(unless(flag(Indicator::Tdp), "NPPVASC"))
        .clear_if(unless(flag(Indicator::Tau), "NPPVASC"))
}

fn tau_inclusion() -> Cascade {
    Cascade::new(Indicator::Tau).set_if_any(&TAU_SOURCES)
}

fn lewy_inclusion() -> Cascade {
    Cascade::new(Indicator::Lewy)
        .set_if(Predicate::OneOf("NPLBOD", &[2.0, 3.0]))
        .set_if(Predicate::Equals(raw("NPPLEWY"), 1.0))
        .clear_if(Predicate::Equals(raw("NPPLEWY"), 2.0))
}

fn tdp_inclusion() -> Cascade {
    Cascade::new(Indicator::Tdp).set_if_any(&TDP_SOURCES)
}

fn vascular_inclusion() -> Cascade {
    Cascade::new(Indicator::Vascular).set_if_any(&VASCULAR_SOURCES)
}

/// The full derivation, in evaluation order. Lewy is evaluated before TDP
/// because TDP is suppressed by it.
pub fn full_cascades() -> Vec<Cascade> {
    vec![
        ad_cascade(),
        tau_cascade(),
        lewy_cascade(),
        tdp_cascade(),
        vascular_cascade(),
    ]
}

/// Non-AD cascades without their suppression phase.
pub fn inclusion_cascades() -> Vec<Cascade> {
    vec![
        tau_inclusion(),
        lewy_inclusion(),
        tdp_inclusion(),
        vascular_inclusion(),
    ]
}

/// Raw variables read by a set of cascades, deduplicated in first-use order.
pub fn source_variables(cascades: &[Cascade]) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = Vec::new();
    for cascade in cascades {
        for name in cascade.raw_variables() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// Evaluate `cascades` over every record of `df`.
pub fn evaluate_cascades(
    df: &DataFrame,
    cascades: &[Cascade],
    semantics: SuppressionSemantics,
) -> Result<Vec<IndicatorFlags>> {
    let sources = SourceTable::load(df, &source_variables(cascades))?;
    let mut all_flags = Vec::with_capacity(sources.height());
    for row in 0..sources.height() {
        let mut flags = IndicatorFlags::default();
        for cascade in cascades {
            let value = cascade.evaluate(&sources.row(row, &flags), semantics);
            flags.set(cascade.target, value);
        }
        all_flags.push(flags);
    }
    Ok(all_flags)
}

/// Derives indicators and the class label.
#[derive(Debug, Clone, Default)]
pub struct PathologySynthesizer {
    semantics: SuppressionSemantics,
}

impl PathologySynthesizer {
    pub fn new(semantics: SuppressionSemantics) -> Self {
        Self { semantics }
    }

    /// Add the five indicator columns and `Class` to every row.
    pub fn annotate(&self, df: &DataFrame) -> Result<(DataFrame, Vec<PathologyClass>)> {
        let flags = evaluate_cascades(df, &full_cascades(), self.semantics)?;
        let classes: Vec<PathologyClass> = flags.iter().map(IndicatorFlags::class).collect();

        let mut annotated = df.clone();
        for indicator in Indicator::ALL {
            let values: Vec<i32> = flags.iter().map(|f| f.get(indicator) as i32).collect();
            annotated.with_column(Series::new(indicator.column().into(), values))?;
        }
        let codes: Vec<i32> = classes.iter().map(|c| c.code() as i32).collect();
        annotated.with_column(Series::new(CLASS_COLUMN.into(), codes))?;

        Ok((annotated, classes))
    }

    /// Annotate and drop class-0 records.
    ///
    /// Returns the retained rows with a fresh index and the per-class
    /// counts. Fails with an empty-cohort error when no record qualifies.
    pub fn apply(&self, df: &DataFrame) -> Result<(DataFrame, BTreeMap<PathologyClass, usize>)> {
        let (annotated, classes) = self.annotate(df)?;

        let retained: Vec<usize> = classes
            .iter()
            .enumerate()
            .filter(|(_, class)| **class != PathologyClass::None)
            .map(|(row, _)| row)
            .collect();

        let mut counts = BTreeMap::new();
        for class in classes.iter().filter(|c| **c != PathologyClass::None) {
            *counts.entry(*class).or_insert(0) += 1;
        }
        debug!("Class counts: {:?}", counts);

        if retained.is_empty() {
            return Err(PrepError::empty_cohort("pathology class synthesis"));
        }

        let labelled = take_rows(&annotated, &retained)?;
        info!(
            "Pathology synthesis labelled {} of {} records",
            labelled.height(),
            annotated.height()
        );
        Ok((labelled, counts))
    }
}
