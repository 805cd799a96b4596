// ========================================================================================
//
//               HLA-DQ interaction terms
//
// ========================================================================================
//
// Interaction weights are supplied as unordered allele pairs. Both the weight table
// and the genotype calls are brought into rank order, after which a lookup is an
// exact match on the pair. Individuals without a matching pair carry no
// interaction term.

use crate::score::types::{
    AlleleRankTable, CallToken, GenotypeCall, InteractionWeightEntry, MissingRankError,
    NamedTable, SampleId,
};
use ahash::AHashMap;
use log::{debug, info};
use thiserror::Error;

/// A row of the interaction weight file before canonicalisation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawInteractionRow {
    pub allele_a: String,
    pub allele_b: String,
    pub beta: f64,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InteractionError {
    #[error(transparent)]
    MissingRank(#[from] MissingRankError),
    #[error("allele pair ({0}, {1}) has more than one interaction weight")]
    DuplicatePair(String, String),
}

/// Ordering key of a call token: ranked alleles by rank, the no-call slot last.
fn token_order(token: &CallToken, ranks: &AlleleRankTable) -> Result<u64, MissingRankError> {
    match token {
        CallToken::Allele(name) => ranks.require(name).map(u64::from),
        CallToken::NoCall => Ok(u64::MAX),
    }
}

/// Orders one weight row so that the lower-ranked allele comes first.
pub fn canonicalize(
    row: &RawInteractionRow,
    ranks: &AlleleRankTable,
) -> Result<InteractionWeightEntry, MissingRankError> {
    let a = CallToken::parse(&row.allele_a);
    let b = CallToken::parse(&row.allele_b);
    let (lower_rank_allele, higher_rank_allele) =
        if token_order(&b, ranks)? < token_order(&a, ranks)? {
            (b, a)
        } else {
            (a, b)
        };
    Ok(InteractionWeightEntry {
        lower_rank_allele,
        higher_rank_allele,
        beta: row.beta,
    })
}

/// Canonicalised interaction weights, ready for exact-pair lookup.
///
/// Keyed first on the lower-ranked token, then on the higher-ranked one.
#[derive(Debug, Clone)]
pub struct InteractionTable {
    pub name: String,
    weights: AHashMap<CallToken, AHashMap<CallToken, f64>>,
    pairs: usize,
}

impl InteractionTable {
    pub fn build(
        rows: &NamedTable<Vec<RawInteractionRow>>,
        ranks: &AlleleRankTable,
    ) -> Result<Self, InteractionError> {
        debug!("Rank-ordering {} pairs from '{}'", rows.rows.len(), rows.name);
        let mut weights: AHashMap<CallToken, AHashMap<CallToken, f64>> = AHashMap::new();
        for row in &rows.rows {
            let entry = canonicalize(row, ranks)?;
            let partners = weights.entry(entry.lower_rank_allele.clone()).or_default();
            if partners.contains_key(&entry.higher_rank_allele) {
                return Err(InteractionError::DuplicatePair(
                    entry.lower_rank_allele.as_str().to_string(),
                    entry.higher_rank_allele.as_str().to_string(),
                ));
            }
            partners.insert(entry.higher_rank_allele, entry.beta);
        }
        Ok(Self {
            name: rows.name.clone(),
            weights,
            pairs: rows.rows.len(),
        })
    }

    /// The weight for an already rank-ordered pair, if the pair interacts.
    pub fn lookup(&self, first: &CallToken, second: &CallToken) -> Option<f64> {
        self.weights.get(first)?.get(second).copied()
    }

    pub fn len(&self) -> usize {
        self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs == 0
    }
}

/// Assigns every individual its interaction beta; non-interacting genotypes get 0.
pub fn score_interactions(
    calls: &NamedTable<Vec<GenotypeCall>>,
    table: &InteractionTable,
) -> NamedTable<Vec<(SampleId, f64)>> {
    info!("Retrieving scores for interacting DQ alleles");
    debug!("Matching '{}' against '{}'", calls.name, table.name);
    let mut matched = 0usize;
    let betas = calls
        .rows
        .iter()
        .map(|call| {
            let beta = match table.lookup(&call.first, &call.second) {
                Some(beta) => {
                    matched += 1;
                    beta
                }
                None => 0.0,
            };
            (call.sample.clone(), beta)
        })
        .collect();
    debug!(
        "{matched} of {} individuals carry an interacting DQ genotype",
        calls.rows.len()
    );
    NamedTable::new("Interaction terms per individual", betas)
}
