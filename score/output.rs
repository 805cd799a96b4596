use crate::score::pipeline::PipelineOutput;
use crate::score::types::{DosageTable, GenotypeCall, MetricsRecord, NamedTable, ScoreRecord};
use crate::shared::files::with_suffix;
use log::{debug, info, warn};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The three result files a run produces for one output prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub dosage: PathBuf,
    pub calls: PathBuf,
    pub results: PathBuf,
}

impl OutputPaths {
    pub fn for_prefix(prefix: &Path) -> Self {
        let stem = |suffix: &str| {
            let mut raw = prefix.as_os_str().to_os_string();
            raw.push(suffix);
            PathBuf::from(raw)
        };
        Self {
            dosage: with_suffix(&stem("_dosage"), "tsv"),
            calls: with_suffix(&stem("_DQ_calls"), "tsv"),
            results: with_suffix(&stem("_RESULTS"), "tsv"),
        }
    }
}

/// A fully written result file waiting in a sibling temporary file.
struct Staged {
    file: NamedTempFile,
    path: PathBuf,
}

/// Writes `body` into a temporary file next to `path`; nothing appears at `path` yet.
fn stage<F>(path: &Path, body: F) -> Result<Staged, OutputError>
where
    F: FnOnce(&mut BufWriter<&mut NamedTempFile>) -> io::Result<()>,
{
    let wrap = |source: io::Error| OutputError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir).map_err(wrap)?;
    {
        let mut writer = BufWriter::new(&mut file);
        body(&mut writer).map_err(wrap)?;
        writer.flush().map_err(wrap)?;
    }
    Ok(Staged {
        file,
        path: path.to_path_buf(),
    })
}

/// Renames every staged file into place. Either all destinations end up written or,
/// on failure, the ones already renamed by this call are removed again.
fn commit(staged: Vec<Staged>) -> Result<(), OutputError> {
    if let Some(blocked) = staged.iter().find(|s| s.path.is_dir()) {
        return Err(OutputError::Write {
            path: blocked.path.clone(),
            source: io::Error::new(io::ErrorKind::AlreadyExists, "a directory is in the way"),
        });
    }
    let mut persisted: Vec<PathBuf> = Vec::with_capacity(staged.len());
    for Staged { file, path } in staged {
        if let Err(e) = file.persist(&path) {
            for done in &persisted {
                if let Err(cleanup) = fs::remove_file(done) {
                    warn!("Could not remove partial output '{}': {cleanup}", done.display());
                }
            }
            return Err(OutputError::Write {
                path,
                source: e.error,
            });
        }
        debug!("Wrote '{}'", path.display());
        persisted.push(path);
    }
    Ok(())
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn stage_dosage(path: &Path, table: &NamedTable<DosageTable>) -> Result<Staged, OutputError> {
    let dosage = &table.rows;
    stage(path, |w| {
        write!(w, "FID\tIID")?;
        for allele in &dosage.alleles {
            write!(w, "\t{allele}")?;
        }
        writeln!(w)?;
        for (sample, counts) in dosage.samples.iter().zip(dosage.counts.rows()) {
            write!(w, "{}\t{}", sample.family_id, sample.individual_id)?;
            for count in counts {
                write!(w, "\t{count}")?;
            }
            writeln!(w)?;
        }
        Ok(())
    })
}

fn stage_calls(path: &Path, calls: &NamedTable<Vec<GenotypeCall>>) -> Result<Staged, OutputError> {
    stage(path, |w| {
        writeln!(w, "FID\tIID\tGENO1\tGENO2")?;
        for call in &calls.rows {
            writeln!(
                w,
                "{}\t{}\t{}\t{}",
                call.sample.family_id,
                call.sample.individual_id,
                call.first.as_str(),
                call.second.as_str()
            )?;
        }
        Ok(())
    })
}

fn stage_scores(
    path: &Path,
    scores: &NamedTable<Vec<ScoreRecord>>,
    with_dq: bool,
) -> Result<Staged, OutputError> {
    stage(path, |w| {
        write!(w, "FID\tIID\tSCORE")?;
        if with_dq {
            write!(w, "\tDQSCORE")?;
        }
        writeln!(w)?;
        for record in &scores.rows {
            write!(
                w,
                "{}\t{}\t{}",
                record.sample.family_id, record.sample.individual_id, record.score
            )?;
            if with_dq {
                write!(w, "\t{}", optional(record.dq_score))?;
            }
            writeln!(w)?;
        }
        Ok(())
    })
}

fn stage_metrics(
    path: &Path,
    metrics: &NamedTable<Vec<MetricsRecord>>,
    with_dq: bool,
) -> Result<Staged, OutputError> {
    stage(path, |w| {
        write!(w, "FID\tIID\tSCORE")?;
        if with_dq {
            write!(w, "\tDQSCORE")?;
        }
        writeln!(w, "\tCTRLCENTILE\tCASECENTILE\tPPV\tPROB")?;
        for r in &metrics.rows {
            write!(w, "{}\t{}\t{}", r.sample.family_id, r.sample.individual_id, r.score)?;
            if with_dq {
                write!(w, "\t{}", optional(r.dq_score))?;
            }
            writeln!(
                w,
                "\t{}\t{}\t{}\t{}",
                r.control_centile,
                r.case_centile,
                r.ppv,
                optional(r.probability)
            )?;
        }
        Ok(())
    })
}

pub fn write_dosage(path: &Path, table: &NamedTable<DosageTable>) -> Result<(), OutputError> {
    commit(vec![stage_dosage(path, table)?])
}

pub fn write_calls(path: &Path, calls: &NamedTable<Vec<GenotypeCall>>) -> Result<(), OutputError> {
    commit(vec![stage_calls(path, calls)?])
}

/// Writes scores alone; `DQSCORE` is included only when `with_dq` is set.
pub fn write_scores(
    path: &Path,
    scores: &NamedTable<Vec<ScoreRecord>>,
    with_dq: bool,
) -> Result<(), OutputError> {
    commit(vec![stage_scores(path, scores, with_dq)?])
}

pub fn write_metrics(
    path: &Path,
    metrics: &NamedTable<Vec<MetricsRecord>>,
    with_dq: bool,
) -> Result<(), OutputError> {
    commit(vec![stage_metrics(path, metrics, with_dq)?])
}

/// Writes all three result files for a finished run. All three bodies are staged
/// before any of them is renamed into place.
pub fn write_all(
    prefix: &Path,
    output: &PipelineOutput,
    with_dq: bool,
) -> Result<OutputPaths, OutputError> {
    let paths = OutputPaths::for_prefix(prefix);
    let results = match &output.metrics {
        Some(metrics) => stage_metrics(&paths.results, metrics, with_dq)?,
        None => stage_scores(&paths.results, &output.scores.records, with_dq)?,
    };
    commit(vec![
        stage_dosage(&paths.dosage, &output.dosage)?,
        stage_calls(&paths.calls, &output.calls)?,
        results,
    ])?;
    info!("Results written to '{}'", paths.results.display());
    Ok(paths)
}
