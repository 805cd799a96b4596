// ========================================================================================
//
//               Score allele reconciliation
//
// ========================================================================================
//
// The mapping table names one score allele per DQ tag variant, but the genotype data
// may spell the same allele differently (indels written as "-" or as a full sequence,
// unobserved alleles reported as "0"). This module settles on the allele actually
// present in the data, then orders the variants by DQ rank.

use crate::score::types::{
    AlleleRankTable, DELETION_ALLELE, FrequencyRecord, MissingRankError, NamedTable,
    ResolvedAllele, ResolvedVariant, UNOBSERVED_ALLELE, VariantMappingEntry,
};
use ahash::AHashMap;
use log::{debug, info};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
#[error(
    "cannot reconcile score allele for '{allele_name}' ({variant_id}): mapping allele '{mapping_allele}', observed '{observed_allele1}'/'{observed_allele2}'"
)]
pub struct AmbiguousAlleleError {
    pub allele_name: String,
    pub variant_id: String,
    pub mapping_allele: String,
    pub observed_allele1: String,
    pub observed_allele2: String,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReconcileError {
    #[error(transparent)]
    Ambiguous(#[from] AmbiguousAlleleError),
    #[error(transparent)]
    MissingRank(#[from] MissingRankError),
}

/// Resolves the score allele of a single variant from its mapping allele and the
/// (optional) frequency record for the same variant. Returns `None` when no rule applies.
pub fn resolve_score_allele(
    mapping_allele: &str,
    frequency: Option<&FrequencyRecord>,
) -> Option<ResolvedAllele> {
    let Some(freq) = frequency else {
        return Some(ResolvedAllele::Allele(mapping_allele.to_string()));
    };
    let f1 = freq.observed_allele1.as_str();
    let f2 = freq.observed_allele2.as_str();
    let keep = |allele: &str| Some(ResolvedAllele::Allele(allele.to_string()));

    if mapping_allele == f1 || mapping_allele == f2 {
        return keep(mapping_allele);
    }
    // Shorter indel sequence scored, but only the longer one was observed.
    if mapping_allele == DELETION_ALLELE && f1 == UNOBSERVED_ALLELE && f2.len() == 1 {
        return keep(f2);
    }
    // Longer indel sequence scored and it is the second observed allele.
    if f2.len() > mapping_allele.len() && mapping_allele.len() > 1 {
        return keep(f2);
    }
    // Longer indel sequence scored against a single-base second allele.
    if mapping_allele.len() > 1 && f2.len() == 1 {
        if f2 == DELETION_ALLELE {
            return keep(mapping_allele);
        }
        if f1 == UNOBSERVED_ALLELE {
            return Some(ResolvedAllele::Allele(format!("{f2}{mapping_allele}")));
        }
        return keep(f1);
    }
    if mapping_allele != DELETION_ALLELE && f1 == UNOBSERVED_ALLELE {
        return keep(mapping_allele);
    }
    if mapping_allele == DELETION_ALLELE && f1 != UNOBSERVED_ALLELE {
        // The deletion is whichever observed allele is shorter; ties keep the first.
        let shorter = if f2.len() < f1.len() { f2 } else { f1 };
        return keep(shorter);
    }
    if mapping_allele == DELETION_ALLELE && f1 == UNOBSERVED_ALLELE {
        return Some(ResolvedAllele::Unresolved);
    }
    None
}

/// Reconciles every mapping entry against the frequency report and sorts the
/// result by DQ rank. The first unreconcilable or unranked allele aborts.
pub fn reconcile_variants(
    mapping: NamedTable<Vec<VariantMappingEntry>>,
    frequencies: &[FrequencyRecord],
    ranks: &AlleleRankTable,
) -> Result<NamedTable<Vec<ResolvedVariant>>, ReconcileError> {
    info!("Combining mapping file data with frequency report data");
    debug!(
        "Reconciling '{}' ({} rows) against {} frequency records",
        mapping.name,
        mapping.rows.len(),
        frequencies.len()
    );

    let by_variant: AHashMap<&str, &FrequencyRecord> = frequencies
        .iter()
        .map(|record| (record.variant_id.as_str(), record))
        .collect();

    let mut resolved = Vec::with_capacity(mapping.rows.len());
    for entry in mapping.rows {
        let frequency = by_variant.get(entry.variant_id.as_str()).copied();
        let score_allele = resolve_score_allele(&entry.mapping_allele, frequency).ok_or_else(
            || AmbiguousAlleleError {
                allele_name: entry.allele_name.clone(),
                variant_id: entry.variant_id.clone(),
                mapping_allele: entry.mapping_allele.clone(),
                observed_allele1: frequency
                    .map(|f| f.observed_allele1.clone())
                    .unwrap_or_default(),
                observed_allele2: frequency
                    .map(|f| f.observed_allele2.clone())
                    .unwrap_or_default(),
            },
        )?;
        if score_allele != ResolvedAllele::Allele(entry.mapping_allele.clone()) {
            debug!(
                "{} ({}): score allele '{}' -> '{}'",
                entry.allele_name,
                entry.variant_id,
                entry.mapping_allele,
                score_allele.as_str()
            );
        }
        let rank = ranks.require(&entry.allele_name)?;
        resolved.push(ResolvedVariant {
            allele_name: entry.allele_name,
            variant_id: entry.variant_id,
            score_allele,
            rank,
        });
    }

    info!("Sorting mapped variants by DQ rank order");
    resolved.sort_by_key(|variant| variant.rank);
    Ok(NamedTable::new("Mapping & frequency data", resolved))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn freq(variant_id: &str, a1: &str, a2: &str) -> FrequencyRecord {
        FrequencyRecord {
            variant_id: variant_id.to_string(),
            observed_allele1: a1.to_string(),
            observed_allele2: a2.to_string(),
            minor_allele_freq: Some(0.1),
            observation_count: 100,
        }
    }

    fn resolve(mapping: &str, a1: &str, a2: &str) -> Option<ResolvedAllele> {
        resolve_score_allele(mapping, Some(&freq("rs1", a1, a2)))
    }

    fn allele(a: &str) -> Option<ResolvedAllele> {
        Some(ResolvedAllele::Allele(a.to_string()))
    }

    #[test]
    fn no_frequency_record_keeps_mapping_allele() {
        assert_eq!(resolve_score_allele("A", None), allele("A"));
        assert_eq!(resolve_score_allele("-", None), allele("-"));
    }

    #[test]
    fn observed_mapping_allele_is_identity() {
        for (mapping, a1, a2) in [("A", "A", "G"), ("G", "A", "G"), ("-", "-", "T"), ("TTA", "T", "TTA")] {
            assert_eq!(resolve(mapping, a1, a2), allele(mapping));
        }
    }

    #[test]
    fn unobserved_short_indel_takes_second_allele() {
        assert_eq!(resolve("-", "0", "T"), allele("T"));
    }

    #[test]
    fn longer_second_allele_replaces_long_mapping_allele() {
        assert_eq!(resolve("TA", "C", "TAA"), allele("TAA"));
    }

    #[test]
    fn long_mapping_allele_against_single_base_second_allele() {
        assert_eq!(resolve("TA", "T", "-"), allele("TA"));
        assert_eq!(resolve("TA", "0", "G"), allele("GTA"));
        assert_eq!(resolve("TA", "C", "G"), allele("C"));
    }

    #[test]
    fn unobserved_first_allele_keeps_mapping_allele() {
        assert_eq!(resolve("A", "0", "G"), allele("A"));
    }

    #[test]
    fn deletion_takes_shorter_observed_allele() {
        assert_eq!(resolve("-", "TTA", "T"), allele("T"));
        assert_eq!(resolve("-", "C", "CAG"), allele("C"));
    }

    #[test]
    fn unobserved_deletion_is_unresolved() {
        assert_eq!(resolve("-", "0", "TTA"), Some(ResolvedAllele::Unresolved));
    }

    #[test]
    fn unmatched_alleles_are_ambiguous() {
        assert_eq!(resolve("A", "C", "G"), None);
    }

    #[test]
    fn reconcile_sorts_by_rank_and_reports_ambiguity() {
        let ranks = AlleleRankTable::from_pairs(vec![
            ("DQ8".to_string(), 2),
            ("DQ2.5".to_string(), 1),
        ])
        .unwrap();
        let mapping = NamedTable::new(
            "mapping",
            vec![
                VariantMappingEntry {
                    allele_name: "DQ8".to_string(),
                    variant_id: "rs8".to_string(),
                    mapping_allele: "A".to_string(),
                },
                VariantMappingEntry {
                    allele_name: "DQ2.5".to_string(),
                    variant_id: "rs25".to_string(),
                    mapping_allele: "-".to_string(),
                },
            ],
        );
        let frequencies = vec![freq("rs25", "0", "T")];
        let resolved = reconcile_variants(mapping.clone(), &frequencies, &ranks).unwrap();
        let names: Vec<_> = resolved.rows.iter().map(|v| v.allele_name.as_str()).collect();
        assert_eq!(names, vec!["DQ2.5", "DQ8"]);
        assert_eq!(
            resolved.rows[0].score_allele,
            ResolvedAllele::Allele("T".to_string())
        );

        let conflicting = vec![freq("rs8", "C", "G")];
        match reconcile_variants(mapping, &conflicting, &ranks).unwrap_err() {
            ReconcileError::Ambiguous(err) => assert_eq!(err.variant_id, "rs8"),
            other => panic!("Expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn reconcile_requires_every_allele_ranked() {
        let ranks = AlleleRankTable::from_pairs(vec![("DQ2.5".to_string(), 1)]).unwrap();
        let mapping = NamedTable::new(
            "mapping",
            vec![VariantMappingEntry {
                allele_name: "DQ8".to_string(),
                variant_id: "rs8".to_string(),
                mapping_allele: "A".to_string(),
            }],
        );
        assert_eq!(
            reconcile_variants(mapping, &[], &ranks).unwrap_err(),
            ReconcileError::MissingRank(MissingRankError {
                allele: "DQ8".to_string()
            })
        );
    }
}
