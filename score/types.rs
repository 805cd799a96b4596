// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// This file is ONLY for types that are SHARED BETWEEN FILES, not types that only are used in one file.

use ahash::AHashMap;
use ndarray::Array2;
use std::fmt;
use thiserror::Error;

/// The literal used for an empty genotype slot, both in the calls output and in
/// interaction weight tables that pair an allele with a missing second call.
pub const NO_CALL: &str = "X";

/// The literal PLINK and the mapping table use for a deleted/absent allele.
pub const DELETION_ALLELE: &str = "-";

/// The literal PLINK's `--freq` report uses for an allele that was never observed.
pub const UNOBSERVED_ALLELE: &str = "0";

/// The composite family/individual identifier carried by every PLINK output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleId {
    pub family_id: String,
    pub individual_id: String,
}

impl SampleId {
    pub fn new(family_id: impl Into<String>, individual_id: impl Into<String>) -> Self {
        Self {
            family_id: family_id.into(),
            individual_id: individual_id.into(),
        }
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.family_id, self.individual_id)
    }
}

/// A table flowing between stages, paired with the human-readable label used in
/// diagnostics. Ownership moves stage to stage.
#[derive(Debug, Clone)]
pub struct NamedTable<T> {
    pub name: String,
    pub rows: T,
}

impl<T> NamedTable<T> {
    pub fn new(name: impl Into<String>, rows: T) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }
}

/// One row of the DQ allele mapping table, before reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantMappingEntry {
    pub allele_name: String,
    pub variant_id: String,
    pub mapping_allele: String,
}

/// One row of the collaborator's allele frequency report.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyRecord {
    pub variant_id: String,
    pub observed_allele1: String,
    pub observed_allele2: String,
    pub minor_allele_freq: Option<f64>,
    pub observation_count: u64,
}

/// The reconciled score allele for a variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedAllele {
    Allele(String),
    /// The mapping says "-" and the data never observed the allele: it can never be scored.
    Unresolved,
}

impl ResolvedAllele {
    pub fn as_str(&self) -> &str {
        match self {
            ResolvedAllele::Allele(allele) => allele,
            ResolvedAllele::Unresolved => DELETION_ALLELE,
        }
    }
}

/// A mapping entry with its reconciled score allele and its DQ rank.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedVariant {
    pub allele_name: String,
    pub variant_id: String,
    pub score_allele: ResolvedAllele,
    pub rank: u32,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("DQ allele '{allele}' has no entry in the rank table")]
pub struct MissingRankError {
    pub allele: String,
}

/// DQ allele name -> rank. Ranks and names are 1:1, enforced when the table is loaded.
#[derive(Debug, Clone, Default)]
pub struct AlleleRankTable {
    ranks: AHashMap<String, u32>,
}

impl AlleleRankTable {
    /// Builds the table, returning the offending name or rank on the first duplicate.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, DuplicateRank>
    where
        I: IntoIterator<Item = (String, u32)>,
    {
        let mut ranks = AHashMap::new();
        let mut seen_ranks = AHashMap::new();
        for (allele, rank) in pairs {
            if let Some(existing) = seen_ranks.insert(rank, allele.clone()) {
                return Err(DuplicateRank::Rank {
                    rank,
                    first: existing,
                    second: allele,
                });
            }
            if ranks.insert(allele.clone(), rank).is_some() {
                return Err(DuplicateRank::Allele(allele));
            }
        }
        Ok(Self { ranks })
    }

    pub fn rank(&self, allele: &str) -> Option<u32> {
        self.ranks.get(allele).copied()
    }

    pub fn require(&self, allele: &str) -> Result<u32, MissingRankError> {
        self.rank(allele).ok_or_else(|| MissingRankError {
            allele: allele.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DuplicateRank {
    #[error("allele '{0}' is ranked twice")]
    Allele(String),
    #[error("rank {rank} is shared by '{first}' and '{second}'")]
    Rank { rank: u32, first: String, second: String },
}

/// The wide per-individual copy-count table. Columns follow rank order.
#[derive(Debug, Clone, PartialEq)]
pub struct DosageTable {
    pub samples: Vec<SampleId>,
    pub alleles: Vec<String>,
    /// Shape: [n_samples, n_alleles]. Every value is in 0..=2.
    pub counts: Array2<u8>,
}

impl DosageTable {
    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }
}

/// One slot of a genotype call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallToken {
    Allele(String),
    NoCall,
}

impl CallToken {
    pub fn as_str(&self) -> &str {
        match self {
            CallToken::Allele(name) => name,
            CallToken::NoCall => NO_CALL,
        }
    }

    /// Interprets a token read from an interaction weight table.
    pub fn parse(token: &str) -> Self {
        if token == NO_CALL {
            CallToken::NoCall
        } else {
            CallToken::Allele(token.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenotypeCall {
    pub sample: SampleId,
    pub first: CallToken,
    pub second: CallToken,
}

/// An interaction weight after rank canonicalisation.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionWeightEntry {
    pub lower_rank_allele: CallToken,
    pub higher_rank_allele: CallToken,
    pub beta: f64,
}

/// Per-individual score. `dq_score` is present only when a DQ-only weight file is configured.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRecord {
    pub sample: SampleId,
    pub score: f64,
    pub dq_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsRecord {
    pub sample: SampleId,
    pub score: f64,
    pub dq_score: Option<f64>,
    pub control_centile: f64,
    pub case_centile: f64,
    pub ppv: f64,
    pub probability: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_table_rejects_duplicate_ranks() {
        let err = AlleleRankTable::from_pairs(vec![("A".to_string(), 1), ("B".to_string(), 1)])
            .unwrap_err();
        assert_eq!(
            err,
            DuplicateRank::Rank {
                rank: 1,
                first: "A".to_string(),
                second: "B".to_string()
            }
        );
    }

    #[test]
    fn rank_table_rejects_duplicate_alleles() {
        let err = AlleleRankTable::from_pairs(vec![("A".to_string(), 1), ("A".to_string(), 2)])
            .unwrap_err();
        assert_eq!(err, DuplicateRank::Allele("A".to_string()));
        assert_eq!(err.to_string(), "allele 'A' is ranked twice");
    }

    #[test]
    fn duplicate_rank_message_names_both_alleles() {
        let err = AlleleRankTable::from_pairs(vec![("DQ8".to_string(), 3), ("DQ6".to_string(), 3)])
            .unwrap_err();
        assert_eq!(err.to_string(), "rank 3 is shared by 'DQ8' and 'DQ6'");
    }

    #[test]
    fn missing_rank_is_reported_by_name() {
        let table = AlleleRankTable::from_pairs(vec![("DQ2.5".to_string(), 1)]).unwrap();
        assert_eq!(table.require("DQ2.5"), Ok(1));
        assert_eq!(
            table.require("DQ8").unwrap_err().allele,
            "DQ8".to_string()
        );
    }

    #[test]
    fn no_call_token_round_trips_through_text() {
        assert_eq!(CallToken::parse("X"), CallToken::NoCall);
        assert_eq!(CallToken::NoCall.as_str(), "X");
        assert_eq!(
            CallToken::parse("DQ8"),
            CallToken::Allele("DQ8".to_string())
        );
    }

    #[test]
    fn sample_ids_order_by_family_then_individual() {
        let mut ids = vec![
            SampleId::new("F2", "A"),
            SampleId::new("F1", "B"),
            SampleId::new("F1", "A"),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                SampleId::new("F1", "A"),
                SampleId::new("F1", "B"),
                SampleId::new("F2", "A"),
            ]
        );
    }
}
