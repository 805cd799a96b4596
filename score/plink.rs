// ========================================================================================
//
//               PLINK 1.9 as the genotype scoring collaborator
//
// ========================================================================================
//
// Every PLINK call reads the same --bfile and writes into a private temporary
// directory created next to the requested outputs. The directory name is unique per
// run, so concurrent runs sharing an output directory never collide, and it is
// removed when the runner is dropped, whether the run succeeded or not.

use crate::score::config::PlinkSettings;
use crate::score::port::{
    CollaboratorError, GenotypeScoringPort, LinearScoreSums, WindowDosage,
};
use crate::score::tables::LinearWeightFile;
use crate::score::types::{FrequencyRecord, ResolvedVariant, SampleId};
use crate::shared::files::{WhitespaceReport, with_suffix};
use log::{debug, info};
use std::ffi::OsString;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Lines of stderr (or the PLINK log) quoted when a call fails.
const FAILURE_TAIL_LINES: usize = 20;

pub struct PlinkRunner {
    executable: String,
    bfile: PathBuf,
    timeout: Duration,
    stem: String,
    workspace: TempDir,
}

impl PlinkRunner {
    /// Creates the run-private workspace inside the directory of `output_prefix`.
    pub fn new(
        settings: &PlinkSettings,
        bfile: &Path,
        output_prefix: &Path,
    ) -> Result<Self, CollaboratorError> {
        let output_dir = match output_prefix.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&output_dir)?;
        let stem = output_prefix
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());
        let workspace = tempfile::Builder::new()
            .prefix(&format!("temp_{stem}_"))
            .tempdir_in(&output_dir)?;
        debug!("PLINK workspace: '{}'", workspace.path().display());
        Ok(Self {
            executable: settings.executable.clone(),
            bfile: bfile.to_path_buf(),
            timeout: settings.timeout(),
            stem,
            workspace,
        })
    }

    pub fn workspace(&self) -> &Path {
        self.workspace.path()
    }

    fn out_prefix(&self, tag: &str) -> PathBuf {
        self.workspace.path().join(format!("{}_{tag}", self.stem))
    }

    /// Runs PLINK with `--bfile` plus `args`, waiting at most the configured timeout.
    fn run(&self, tag: &str, args: Vec<OsString>) -> Result<(), CollaboratorError> {
        let mut full_args: Vec<OsString> = vec!["--bfile".into(), self.bfile.clone().into()];
        full_args.extend(args);
        let command_line = std::iter::once(self.executable.clone())
            .chain(full_args.iter().map(|a| format!("'{}'", a.to_string_lossy())))
            .collect::<Vec<_>>()
            .join(" ");
        debug!("Executing: {command_line}");

        let stdout_path = with_suffix(&self.out_prefix(tag), "stdout");
        let stderr_path = with_suffix(&self.out_prefix(tag), "stderr");
        let mut child = Command::new(&self.executable)
            .args(&full_args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(File::create(&stdout_path)?))
            .stderr(Stdio::from(File::create(&stderr_path)?))
            .spawn()
            .map_err(|source| CollaboratorError::Spawn {
                program: self.executable.clone(),
                source,
            })?;

        let deadline = Instant::now() + self.timeout;
        let status: ExitStatus = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                // The child may have exited between the two checks; either way reap it.
                let _ = child.kill();
                let _ = child.wait();
                return Err(CollaboratorError::Timeout {
                    command: command_line,
                    timeout: self.timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        if !status.success() {
            let details = tail_of(&stderr_path)
                .filter(|t| !t.is_empty())
                .or_else(|| tail_of(&with_suffix(&self.out_prefix(tag), "log")))
                .unwrap_or_default();
            return Err(CollaboratorError::NonZeroExit {
                command: command_line,
                status: status.to_string(),
                details,
            });
        }
        Ok(())
    }

    fn write_tsv<I, R>(path: &Path, rows: I) -> Result<(), CollaboratorError>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator,
        R::Item: AsRef<[u8]>,
    {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_path(path)?;
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn tail_of(path: &Path) -> Option<String> {
    let text = fs::read_to_string(path).ok()?;
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(FAILURE_TAIL_LINES);
    Some(lines[start..].join("\n").trim().to_string())
}

fn require_file(path: PathBuf) -> Result<PathBuf, CollaboratorError> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(CollaboratorError::MissingOutput(path))
    }
}

/// Reads `FID IID <value_column>` from a PLINK `.profile`.
fn read_profile(
    path: &Path,
    value_column: &str,
) -> Result<Vec<(SampleId, String)>, CollaboratorError> {
    let report = WhitespaceReport::read(path)?;
    let idx = report.column_indices(&["FID", "IID", value_column])?;
    Ok(report
        .rows()
        .map(|row| (SampleId::new(&row[idx[0]], &row[idx[1]]), row[idx[2]].clone()))
        .collect())
}

/// Parses PLINK's `--freq` report (`CHR SNP A1 A2 MAF NCHROBS`).
pub fn parse_frequency_report(path: &Path) -> Result<Vec<FrequencyRecord>, CollaboratorError> {
    let report = WhitespaceReport::read(path)?;
    let idx = report.column_indices(&["CHR", "SNP", "A1", "A2", "MAF", "NCHROBS"])?;
    report
        .rows()
        .enumerate()
        .map(|(line, row)| {
            let observation_count =
                row[idx[5]]
                    .parse::<u64>()
                    .map_err(|_| CollaboratorError::Malformed {
                        path: path.to_path_buf(),
                        line: line + 2,
                        details: format!("NCHROBS '{}' is not a count", row[idx[5]]),
                    })?;
            Ok(FrequencyRecord {
                variant_id: row[idx[1]].clone(),
                observed_allele1: row[idx[2]].clone(),
                observed_allele2: row[idx[3]].clone(),
                minor_allele_freq: row[idx[4]].parse::<f64>().ok().filter(|v| v.is_finite()),
                observation_count,
            })
        })
        .collect()
}

impl GenotypeScoringPort for PlinkRunner {
    fn frequency_report(&self) -> Result<Vec<FrequencyRecord>, CollaboratorError> {
        info!("Generating PLINK frequency report");
        let out = self.out_prefix("freq");
        self.run("freq", vec!["--freq".into(), "--out".into(), out.clone().into()])?;
        parse_frequency_report(&require_file(with_suffix(&out, "frq"))?)
    }

    fn windowed_dosage(
        &self,
        variants: &[ResolvedVariant],
    ) -> Result<Vec<WindowDosage>, CollaboratorError> {
        info!("Creating dosage table based on data from mapping & frequency report");
        let out = self.out_prefix("dosage");
        let scores = with_suffix(&out, "scores");
        let rngqty = with_suffix(&out, "rngqty");
        let rngbound = with_suffix(&out, "rngbound");

        Self::write_tsv(
            &scores,
            variants.iter().map(|v| {
                [
                    v.variant_id.clone(),
                    v.score_allele.as_str().to_string(),
                    "1".to_string(),
                ]
            }),
        )?;
        Self::write_tsv(
            &rngqty,
            variants
                .iter()
                .map(|v| [v.variant_id.clone(), v.rank.to_string()]),
        )?;
        Self::write_tsv(
            &rngbound,
            variants.iter().map(|v| {
                let rank = f64::from(v.rank);
                [
                    v.variant_id.clone(),
                    (rank - 0.5).to_string(),
                    (rank + 0.5).to_string(),
                ]
            }),
        )?;

        self.run(
            "dosage",
            vec![
                "--score".into(),
                scores.into(),
                "no-mean-imputation".into(),
                "--q-score-range".into(),
                rngbound.into(),
                rngqty.into(),
                "--out".into(),
                out.clone().into(),
            ],
        )?;

        info!("Concatenating range score profiles for each mapping DQ allele into a single table");
        let mut windows = Vec::with_capacity(variants.len());
        for variant in variants {
            let profile = with_suffix(&out, &format!("{}.profile", variant.variant_id));
            if !profile.is_file() {
                debug!(
                    "No range profile for '{}' ({}); PLINK scored no variants in its window",
                    variant.allele_name, variant.variant_id
                );
                continue;
            }
            let values = read_profile(&profile, "SCORE")?
                .into_iter()
                .map(|(sample, raw)| (sample, raw.parse::<f64>().ok()))
                .collect();
            windows.push(WindowDosage {
                variant_id: variant.variant_id.clone(),
                values,
            });
        }
        Ok(windows)
    }

    fn linear_score_sum(
        &self,
        weights: &LinearWeightFile,
    ) -> Result<LinearScoreSums, CollaboratorError> {
        let tag: String = weights
            .label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let out = self.out_prefix(&format!("linear_{tag}"));
        self.run(
            &format!("linear_{tag}"),
            vec![
                "--score".into(),
                weights.path.clone().into(),
                "header".into(),
                "sum".into(),
                "--out".into(),
                out.clone().into(),
            ],
        )?;

        let profile = require_file(with_suffix(&out, "profile"))?;
        let sums = read_profile(&profile, "SCORESUM")?
            .into_iter()
            .enumerate()
            .map(|(line, (sample, raw))| match raw.parse::<f64>() {
                Ok(value) if value.is_finite() => Ok((sample, value)),
                _ => Err(CollaboratorError::Malformed {
                    path: profile.clone(),
                    line: line + 2,
                    details: format!("SCORESUM '{raw}' is not a number"),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(LinearScoreSums {
            label: weights.label.clone(),
            sums,
        })
    }
}
