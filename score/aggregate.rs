use crate::score::port::LinearScoreSums;
use crate::score::types::{NamedTable, SampleId, ScoreRecord};
use ahash::{AHashMap, AHashSet};
use log::{debug, info, warn};

/// How many individuals fell out of the inner joins that produce the final scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinReport {
    pub scored: usize,
    /// Genotyped individuals with no all-variant linear score.
    pub missing_linear: usize,
    /// Genotyped individuals with no DQ-only linear score (only when one is configured).
    pub missing_dq: usize,
    /// Individuals with a linear score but no genotype call.
    pub missing_genotype: usize,
}

impl JoinReport {
    pub fn dropped(&self) -> usize {
        self.missing_linear + self.missing_dq + self.missing_genotype
    }
}

#[derive(Debug, Clone)]
pub struct ScoreTable {
    pub records: NamedTable<Vec<ScoreRecord>>,
    pub join: JoinReport,
}

fn index_sums(sums: &LinearScoreSums) -> AHashMap<&SampleId, f64> {
    let mut index = AHashMap::with_capacity(sums.sums.len());
    for (sample, value) in &sums.sums {
        if index.insert(sample, *value).is_some() {
            warn!("'{}' reports {sample} more than once; keeping the last value", sums.label);
        }
    }
    index
}

/// Adds each individual's interaction beta to their linear score totals.
///
/// `SCORE = beta + all-variant sum`, and when a DQ-only sum is given,
/// `DQSCORE = beta + DQ-only sum`. Only individuals present in every supplied
/// table are scored; everyone else is counted in the [`JoinReport`].
pub fn aggregate_scores(
    interactions: &NamedTable<Vec<(SampleId, f64)>>,
    all_variants: &LinearScoreSums,
    dq_variants: Option<&LinearScoreSums>,
) -> ScoreTable {
    info!("Computing SCORE based on interaction terms & weights for all variants");
    debug!(
        "Joining '{}' with '{}'{}",
        interactions.name,
        all_variants.label,
        dq_variants
            .map(|dq| format!(" and '{}'", dq.label))
            .unwrap_or_default()
    );

    let all_index = index_sums(all_variants);
    let dq_index = dq_variants.map(index_sums);
    let mut join = JoinReport::default();

    let mut records = Vec::with_capacity(interactions.rows.len());
    for (sample, beta) in &interactions.rows {
        let Some(&linear) = all_index.get(sample) else {
            join.missing_linear += 1;
            continue;
        };
        let dq_score = match &dq_index {
            Some(index) => match index.get(sample) {
                Some(&dq_linear) => Some(beta + dq_linear),
                None => {
                    join.missing_dq += 1;
                    continue;
                }
            },
            None => None,
        };
        records.push(ScoreRecord {
            sample: sample.clone(),
            score: beta + linear,
            dq_score,
        });
    }

    let genotyped: AHashSet<&SampleId> = interactions.rows.iter().map(|(s, _)| s).collect();
    let mut linear_only: AHashSet<&SampleId> = all_index
        .keys()
        .copied()
        .filter(|s| !genotyped.contains(s))
        .collect();
    if let Some(index) = &dq_index {
        linear_only.extend(index.keys().copied().filter(|s| !genotyped.contains(s)));
    }
    join.missing_genotype = linear_only.len();
    join.scored = records.len();

    if join.dropped() > 0 {
        warn!(
            "Join integrity: {} individuals scored, {} dropped ({} without an all-variant score, {} without a DQ-only score, {} without a genotype call)",
            join.scored,
            join.dropped(),
            join.missing_linear,
            join.missing_dq,
            join.missing_genotype
        );
    }

    let name = if dq_variants.is_some() {
        "Calculated GRS and DQ-only GRS for all given variants"
    } else {
        "Calculated GRS for all given variants"
    };
    ScoreTable {
        records: NamedTable::new(name, records),
        join,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn id(i: &str) -> SampleId {
        SampleId::new("FAM", i)
    }

    fn sums(label: &str, values: &[(&str, f64)]) -> LinearScoreSums {
        LinearScoreSums {
            label: label.to_string(),
            sums: values.iter().map(|(i, v)| (id(i), *v)).collect(),
        }
    }

    #[test]
    fn score_adds_beta_to_linear_sum() {
        let betas = NamedTable::new("betas", vec![(id("1"), 0.5), (id("2"), 0.0)]);
        let all = sums("all", &[("2", 1.25), ("1", 2.0)]);
        let table = aggregate_scores(&betas, &all, None);

        assert_eq!(table.records.rows.len(), 2);
        assert_abs_diff_eq!(table.records.rows[0].score, 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(table.records.rows[1].score, 1.25, epsilon = 1e-12);
        assert!(table.records.rows.iter().all(|r| r.dq_score.is_none()));
        assert_eq!(table.join.dropped(), 0);
    }

    #[test]
    fn dq_score_is_emitted_when_supplied() {
        let betas = NamedTable::new("betas", vec![(id("1"), 0.5)]);
        let all = sums("all", &[("1", 2.0)]);
        let dq = sums("dq", &[("1", 0.75)]);
        let table = aggregate_scores(&betas, &all, Some(&dq));
        let dq_score = table.records.rows[0].dq_score.unwrap();
        assert_abs_diff_eq!(dq_score, 1.25, epsilon = 1e-12);
    }

    #[test]
    fn partially_scoreable_individuals_are_dropped_and_counted() {
        let betas = NamedTable::new(
            "betas",
            vec![(id("1"), 0.5), (id("2"), 0.0), (id("3"), 0.1)],
        );
        let all = sums("all", &[("1", 1.0), ("3", 1.0), ("4", 1.0)]);
        let dq = sums("dq", &[("1", 1.0), ("2", 1.0)]);
        let table = aggregate_scores(&betas, &all, Some(&dq));

        let kept: Vec<_> = table
            .records
            .rows
            .iter()
            .map(|r| r.sample.individual_id.as_str())
            .collect();
        assert_eq!(kept, vec!["1"]);
        assert_eq!(
            table.join,
            JoinReport {
                scored: 1,
                missing_linear: 1,
                missing_dq: 1,
                missing_genotype: 1,
            }
        );
    }
}
