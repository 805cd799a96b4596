// ========================================================================================
//
//               Centile, PPV and case probability
//
// ========================================================================================
//
// Each score is placed on a pre-computed reference ROC curve. Scores and reference
// thresholds are merged into one ascending sequence; an individual takes the metrics
// of the reference row fewest positions away in that sequence, and scores beyond
// either end of the curve take the end row.

use crate::score::types::{MetricsRecord, NamedTable, ScoreRecord};
use log::{debug, info};
use thiserror::Error;

/// One row of the reference ROC curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferencePoint {
    pub threshold: f64,
    pub control_centile: f64,
    pub case_centile: f64,
    pub ppv: f64,
}

/// Pre-fitted logistic parameters from the case/control two-sample comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogisticFit {
    pub b: f64,
    pub mid: f64,
}

impl LogisticFit {
    /// `1 / (1 + exp(b * (mid - score)))`
    pub fn probability(&self, score: f64) -> f64 {
        1.0 / (1.0 + (self.b * (self.mid - score)).exp())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetricsError {
    #[error("the reference curve '{0}' has no rows")]
    EmptyReferenceCurve(String),
}

#[derive(Debug, Clone, Copy)]
enum Origin {
    Reference(usize),
    Individual(usize),
}

/// For every score (by input index), the index of the reference row whose metrics it takes.
///
/// Distance is counted in rows of the merged ascending sequence, not in score units.
/// Equidistant individuals take the lower row.
fn assign_reference_rows(curve: &[ReferencePoint], scores: &[f64]) -> Vec<Option<usize>> {
    // Reference rows go in first so a stable sort keeps them ahead of equal scores.
    let mut sequence: Vec<(f64, Origin)> = curve
        .iter()
        .enumerate()
        .map(|(idx, point)| (point.threshold, Origin::Reference(idx)))
        .chain(
            scores
                .iter()
                .enumerate()
                .map(|(idx, &score)| (score, Origin::Individual(idx))),
        )
        .collect();
    sequence.sort_by(|a, b| a.0.total_cmp(&b.0));

    // (position in `sequence`, reference row) of the nearest reference at or before / after.
    let mut previous: Vec<Option<(usize, usize)>> = vec![None; sequence.len()];
    let mut last = None;
    for (pos, (_, origin)) in sequence.iter().enumerate() {
        if let Origin::Reference(idx) = origin {
            last = Some((pos, *idx));
        }
        previous[pos] = last;
    }

    let mut next: Vec<Option<(usize, usize)>> = vec![None; sequence.len()];
    let mut last = None;
    for (pos, (_, origin)) in sequence.iter().enumerate().rev() {
        if let Origin::Reference(idx) = origin {
            last = Some((pos, *idx));
        }
        next[pos] = last;
    }

    let mut assigned = vec![None; scores.len()];
    for (pos, (_, origin)) in sequence.iter().enumerate() {
        let Origin::Individual(individual) = origin else {
            continue;
        };
        assigned[*individual] = match (previous[pos], next[pos]) {
            (Some((lo_pos, lo)), Some((hi_pos, hi))) => {
                if hi_pos - pos < pos - lo_pos { Some(hi) } else { Some(lo) }
            }
            (Some((_, lo)), None) => Some(lo),
            (None, Some((_, hi))) => Some(hi),
            (None, None) => None,
        };
    }
    assigned
}

/// Assigns centiles, PPV and (when a fit is given) case probability to every
/// scored individual. The output is sorted by family then individual ID.
pub fn map_metrics(
    scores: &NamedTable<Vec<ScoreRecord>>,
    curve: &NamedTable<Vec<ReferencePoint>>,
    fit: Option<&LogisticFit>,
) -> Result<NamedTable<Vec<MetricsRecord>>, MetricsError> {
    info!("Retrieving and assigning pre-computed control/case centiles per individual T1DGRS2");
    debug!("Placing '{}' on '{}'", scores.name, curve.name);
    if curve.rows.is_empty() {
        return Err(MetricsError::EmptyReferenceCurve(curve.name.clone()));
    }

    let mut ordered_curve = curve.rows.clone();
    ordered_curve.sort_by(|a, b| a.threshold.total_cmp(&b.threshold));

    let values: Vec<f64> = scores.rows.iter().map(|r| r.score).collect();
    let assigned = assign_reference_rows(&ordered_curve, &values);

    if fit.is_some() {
        info!(
            "Calculating the case probability per individual based on pre-computed two-sample t-test statistics"
        );
    }

    let mut records: Vec<MetricsRecord> = Vec::with_capacity(scores.rows.len());
    for (record, row) in scores.rows.iter().zip(assigned) {
        let Some(idx) = row else {
            continue;
        };
        let point = ordered_curve[idx];
        records.push(MetricsRecord {
            sample: record.sample.clone(),
            score: record.score,
            dq_score: record.dq_score,
            control_centile: point.control_centile,
            case_centile: point.case_centile,
            ppv: point.ppv,
            probability: fit.map(|f| f.probability(record.score)),
        });
    }
    records.sort_by(|a, b| a.sample.cmp(&b.sample));

    let name = if fit.is_some() {
        "Calculated GRS, centiles, PPV and probability for all given variants"
    } else {
        "Calculated GRS, centiles and PPV for all given variants"
    };
    Ok(NamedTable::new(name, records))
}
