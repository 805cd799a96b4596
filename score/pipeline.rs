// ========================================================================================
//
//                      The stage sequence from genotypes to risk
//
// ========================================================================================
//
// Reconcile, window dosage, call, interaction, linear sums, aggregate, metrics. Every
// stage consumes the previous stage's table; nothing is written to disk here, so a
// failure at any point leaves no partial output behind.

use crate::score::aggregate::{ScoreTable, aggregate_scores};
use crate::score::config::ConfigError;
use crate::score::dosage::build_dosage_table;
use crate::score::genotype::call_genotypes;
use crate::score::interaction::{
    InteractionError, InteractionTable, RawInteractionRow, score_interactions,
};
use crate::score::metrics::{LogisticFit, MetricsError, ReferencePoint, map_metrics};
use crate::score::output::OutputError;
use crate::score::port::{CollaboratorError, GenotypeScoringPort};
use crate::score::reconcile::{ReconcileError, reconcile_variants};
use crate::score::tables::{InputFormatError, LinearWeightFile};
use crate::score::types::{
    AlleleRankTable, DosageTable, GenotypeCall, MetricsRecord, NamedTable, VariantMappingEntry,
};
use crate::shared::files::FilesetError;
use log::{debug, info};
use std::fmt;
use thiserror::Error;

/// The broad class of a failed run; the CLI maps each to its own exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InputFormat,
    AmbiguousAllele,
    MissingRank,
    CollaboratorFailure,
    Config,
    Io,
}

impl ErrorKind {
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::InputFormat => 2,
            ErrorKind::AmbiguousAllele => 3,
            ErrorKind::MissingRank => 4,
            ErrorKind::CollaboratorFailure => 5,
            ErrorKind::Config => 6,
            ErrorKind::Io => 7,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::InputFormat => "InputFormatError",
            ErrorKind::AmbiguousAllele => "AmbiguousAlleleError",
            ErrorKind::MissingRank => "MissingRankError",
            ErrorKind::CollaboratorFailure => "CollaboratorFailure",
            ErrorKind::Config => "ConfigError",
            ErrorKind::Io => "IoError",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    InputFormat(#[from] InputFormatError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Interaction(#[from] InteractionError),
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
    #[error(transparent)]
    Fileset(#[from] FilesetError),
    #[error(transparent)]
    Output(#[from] OutputError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InputFormat(_) | PipelineError::Fileset(_) => ErrorKind::InputFormat,
            PipelineError::Reconcile(ReconcileError::Ambiguous(_)) => ErrorKind::AmbiguousAllele,
            PipelineError::Reconcile(ReconcileError::MissingRank(_)) => ErrorKind::MissingRank,
            PipelineError::Interaction(InteractionError::MissingRank(_)) => ErrorKind::MissingRank,
            PipelineError::Interaction(InteractionError::DuplicatePair(..)) => {
                ErrorKind::InputFormat
            }
            PipelineError::Metrics(_) => ErrorKind::InputFormat,
            PipelineError::Collaborator(_) => ErrorKind::CollaboratorFailure,
            PipelineError::Config(_) => ErrorKind::Config,
            PipelineError::Output(_) | PipelineError::Io(_) => ErrorKind::Io,
        }
    }
}

/// Everything loaded from the reference tables before PLINK is touched.
#[derive(Debug, Clone)]
pub struct PipelineInputs {
    pub mapping: NamedTable<Vec<VariantMappingEntry>>,
    pub ranks: AlleleRankTable,
    pub interactions: NamedTable<Vec<RawInteractionRow>>,
    pub all_variants: LinearWeightFile,
    pub dq_variants: Option<LinearWeightFile>,
    pub metrics: Option<MetricsInputs>,
}

#[derive(Debug, Clone)]
pub struct MetricsInputs {
    pub curve: NamedTable<Vec<ReferencePoint>>,
    pub fit: LogisticFit,
}

/// The tables a completed run hands to the writers.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub dosage: NamedTable<DosageTable>,
    pub calls: NamedTable<Vec<GenotypeCall>>,
    pub scores: ScoreTable,
    pub metrics: Option<NamedTable<Vec<MetricsRecord>>>,
}

/// Runs every stage against `port` and returns the finished tables.
pub fn run<P: GenotypeScoringPort + ?Sized>(
    port: &P,
    inputs: PipelineInputs,
) -> Result<PipelineOutput, PipelineError> {
    let PipelineInputs {
        mapping,
        ranks,
        interactions,
        all_variants,
        dq_variants,
        metrics,
    } = inputs;

    // Canonicalise the interaction table first so a bad weight file fails before PLINK runs.
    let interaction_table = InteractionTable::build(&interactions, &ranks)?;
    debug!(
        "{} canonical interaction weights from '{}'",
        interaction_table.len(),
        interactions.name
    );

    let frequencies = port.frequency_report()?;
    let variants = reconcile_variants(mapping, &frequencies, &ranks)?;

    let windows = port.windowed_dosage(&variants.rows)?;
    let dosage = build_dosage_table(&variants, windows);
    let calls = call_genotypes(&dosage);
    let betas = score_interactions(&calls, &interaction_table);

    info!("Calculating scores for all variants");
    let all_sums = port.linear_score_sum(&all_variants)?;
    let dq_sums = match &dq_variants {
        Some(weights) => {
            info!("Calculating scores for DQ variants only");
            Some(port.linear_score_sum(weights)?)
        }
        None => None,
    };
    let scores = aggregate_scores(&betas, &all_sums, dq_sums.as_ref());

    let metrics = match metrics {
        Some(MetricsInputs { curve, fit }) => {
            Some(map_metrics(&scores.records, &curve, Some(&fit))?)
        }
        None => None,
    };

    Ok(PipelineOutput {
        dosage,
        calls,
        scores,
        metrics,
    })
}
