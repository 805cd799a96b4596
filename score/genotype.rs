use crate::score::types::{CallToken, DosageTable, GenotypeCall, NamedTable};
use log::{debug, info, warn};

/// Number of allele slots in a DQ genotype call.
const CALL_SLOTS: usize = 2;

/// Turns each individual's copy counts into an ordered pair of allele names.
///
/// Alleles are emitted in column (rank) order, each repeated by its copy count,
/// then padded with [`CallToken::NoCall`] and cut to two slots. Because the
/// columns are rank-ordered, every call pair is already in canonical order.
pub fn call_genotypes(dosage: &NamedTable<DosageTable>) -> NamedTable<Vec<GenotypeCall>> {
    info!("Retrieving genotype calls for mapping alleles");
    debug!("Calling genotypes from '{}'", dosage.name);

    let table = &dosage.rows;
    let mut truncated = 0usize;
    let calls = table
        .samples
        .iter()
        .zip(table.counts.rows())
        .map(|(sample, counts)| {
            let mut slots: Vec<CallToken> = Vec::with_capacity(CALL_SLOTS);
            let mut total = 0usize;
            for (allele, &copies) in table.alleles.iter().zip(counts.iter()) {
                total += usize::from(copies);
                for _ in 0..copies {
                    if slots.len() < CALL_SLOTS {
                        slots.push(CallToken::Allele(allele.clone()));
                    }
                }
            }
            if total > CALL_SLOTS {
                truncated += 1;
                debug!("{sample} carries {total} DQ allele copies; keeping the first {CALL_SLOTS}");
            }
            slots.resize(CALL_SLOTS, CallToken::NoCall);
            let mut slots = slots.into_iter();
            GenotypeCall {
                sample: sample.clone(),
                first: slots.next().unwrap_or(CallToken::NoCall),
                second: slots.next().unwrap_or(CallToken::NoCall),
            }
        })
        .collect();

    if truncated > 0 {
        warn!(
            "{truncated} individuals carry more than {CALL_SLOTS} DQ allele copies; excess copies were dropped"
        );
    }
    NamedTable::new("Genotype calls for all mapped alleles", calls)
}
