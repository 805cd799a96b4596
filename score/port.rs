//! The boundary between the scoring core and whatever tool actually reads the
//! genotypes. The core only ever sees the three reports below, so it can run
//! against PLINK or against an in-memory fake.

use crate::score::tables::LinearWeightFile;
use crate::score::types::{FrequencyRecord, ResolvedVariant, SampleId};
use crate::shared::files::ReportError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{command}' did not finish within {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("'{command}' exited with {status}: {details}")]
    NonZeroExit {
        command: String,
        status: String,
        details: String,
    },
    #[error("expected output '{0}' was not produced")]
    MissingOutput(PathBuf),
    #[error("unreadable collaborator output: {0}")]
    Report(#[from] ReportError),
    #[error("collaborator output '{path}' line {line}: {details}")]
    Malformed {
        path: PathBuf,
        line: usize,
        details: String,
    },
    #[error("I/O error while staging collaborator files: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to write collaborator input: {0}")]
    Staging(#[from] csv::Error),
}

/// The continuous dosage reported for one variant's rank window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowDosage {
    pub variant_id: String,
    /// `None` when the collaborator reported the individual without a usable value.
    pub values: Vec<(SampleId, Option<f64>)>,
}

/// Per-individual sum of linear weights over the variants of one weight file.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearScoreSums {
    pub label: String,
    pub sums: Vec<(SampleId, f64)>,
}

/// The three operations the pipeline needs from an external genotype scorer.
pub trait GenotypeScoringPort {
    /// Allele frequency report for every variant in the genotype data.
    fn frequency_report(&self) -> Result<Vec<FrequencyRecord>, CollaboratorError>;

    /// One dosage series per resolved variant, each scored over its own narrow
    /// rank window. Variants the collaborator could not score are simply absent.
    fn windowed_dosage(
        &self,
        variants: &[ResolvedVariant],
    ) -> Result<Vec<WindowDosage>, CollaboratorError>;

    /// Sum of `BETA` over the score alleles each individual carries.
    fn linear_score_sum(
        &self,
        weights: &LinearWeightFile,
    ) -> Result<LinearScoreSums, CollaboratorError>;
}
