// ========================================================================================
//
//               Windowed dosage -> discrete copy counts
//
// ========================================================================================

use crate::score::port::WindowDosage;
use crate::score::types::{DosageTable, NamedTable, ResolvedVariant, SampleId};
use ahash::AHashMap;
use log::{debug, info, warn};
use ndarray::Array2;

/// Highest copy count a diploid individual can carry.
pub const MAX_COPIES: u8 = 2;

/// Converts a collaborator dosage (a per-allele average) into a copy count:
/// doubled, rounded half-to-even and clamped to `0..=MAX_COPIES`. Missing or
/// non-finite values count as zero copies.
pub fn copy_count(dosage: Option<f64>) -> u8 {
    match dosage {
        Some(value) if value.is_finite() => {
            let raw = (value * 2.0).round_ties_even();
            raw.clamp(0.0, f64::from(MAX_COPIES)) as u8
        }
        _ => 0,
    }
}

/// Builds the wide per-individual copy-count table. Columns follow the rank order
/// of `variants`; individuals appear in the order they are first reported.
pub fn build_dosage_table(
    variants: &NamedTable<Vec<ResolvedVariant>>,
    windows: Vec<WindowDosage>,
) -> NamedTable<DosageTable> {
    info!("Converting dosage data to genotype data");
    debug!(
        "Building dosage table for '{}' from {} windows",
        variants.name,
        windows.len()
    );

    let column_of: AHashMap<&str, usize> = variants
        .rows
        .iter()
        .enumerate()
        .map(|(col, v)| (v.variant_id.as_str(), col))
        .collect();

    let mut by_column: Vec<Option<WindowDosage>> = vec![None; variants.rows.len()];
    for window in windows {
        match column_of.get(window.variant_id.as_str()) {
            Some(&col) if by_column[col].is_none() => by_column[col] = Some(window),
            Some(_) => warn!(
                "Ignoring repeated dosage window for variant '{}'",
                window.variant_id
            ),
            None => warn!(
                "Ignoring dosage window for unmapped variant '{}'",
                window.variant_id
            ),
        }
    }

    let mut samples: Vec<SampleId> = Vec::new();
    let mut row_of: AHashMap<SampleId, usize> = AHashMap::new();
    for window in by_column.iter().flatten() {
        for (sample, _) in &window.values {
            if !row_of.contains_key(sample) {
                row_of.insert(sample.clone(), samples.len());
                samples.push(sample.clone());
            }
        }
    }

    let mut counts = Array2::<u8>::zeros((samples.len(), variants.rows.len()));
    for (col, window) in by_column.iter().enumerate() {
        match window {
            Some(window) => {
                for (sample, value) in &window.values {
                    if let Some(&row) = row_of.get(sample) {
                        counts[[row, col]] = copy_count(*value);
                    }
                }
            }
            None => debug!(
                "No dosage returned for '{}'; defaulting to 0 copies",
                variants.rows[col].allele_name
            ),
        }
    }

    let alleles = variants
        .rows
        .iter()
        .map(|v| v.allele_name.clone())
        .collect();
    NamedTable::new(
        "Dosage data for all mapped alleles",
        DosageTable {
            samples,
            alleles,
            counts,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::types::ResolvedAllele;

    fn variant(name: &str, id: &str, rank: u32) -> ResolvedVariant {
        ResolvedVariant {
            allele_name: name.to_string(),
            variant_id: id.to_string(),
            score_allele: ResolvedAllele::Allele("A".to_string()),
            rank,
        }
    }

    #[test]
    fn copy_count_rounds_half_to_even_and_clamps() {
        assert_eq!(copy_count(Some(0.0)), 0);
        assert_eq!(copy_count(Some(0.25)), 0); // 0.5 -> 0
        assert_eq!(copy_count(Some(0.5)), 1);
        assert_eq!(copy_count(Some(0.75)), 2); // 1.5 -> 2
        assert_eq!(copy_count(Some(1.0)), 2);
        assert_eq!(copy_count(Some(1.5)), 2); // 3.0 clamps to 2
        assert_eq!(copy_count(Some(-0.5)), 0);
        assert_eq!(copy_count(Some(f64::NAN)), 0);
        assert_eq!(copy_count(None), 0);
    }

    #[test]
    fn table_follows_rank_order_and_fills_missing_with_zero() {
        let variants = NamedTable::new(
            "resolved",
            vec![variant("DQ2.5", "rs1", 1), variant("DQ8", "rs2", 2), variant("DQ6.2", "rs3", 3)],
        );
        let a = SampleId::new("F1", "A");
        let b = SampleId::new("F2", "B");
        let windows = vec![
            WindowDosage {
                variant_id: "rs2".to_string(),
                values: vec![(a.clone(), Some(0.5)), (b.clone(), Some(1.0))],
            },
            WindowDosage {
                variant_id: "rs1".to_string(),
                values: vec![(b.clone(), Some(0.5))],
            },
            WindowDosage {
                variant_id: "rs_unknown".to_string(),
                values: vec![(a.clone(), Some(1.0))],
            },
        ];

        let table = build_dosage_table(&variants, windows).rows;
        assert_eq!(table.alleles, vec!["DQ2.5", "DQ8", "DQ6.2"]);
        // rs1 comes first in rank order, so B is seen first.
        assert_eq!(table.samples, vec![b, a]);
        assert_eq!(table.counts.row(0).to_vec(), vec![1, 2, 0]);
        assert_eq!(table.counts.row(1).to_vec(), vec![0, 1, 0]);
        assert!(table.counts.iter().all(|&c| c <= MAX_COPIES));
    }

    #[test]
    fn no_windows_gives_empty_table_with_all_columns() {
        let variants = NamedTable::new("resolved", vec![variant("DQ2.5", "rs1", 1)]);
        let table = build_dosage_table(&variants, Vec::new()).rows;
        assert_eq!(table.n_samples(), 0);
        assert_eq!(table.counts.dim(), (0, 1));
    }
}
