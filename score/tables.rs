//! # Reference Table Loading and Validation
//!
//! This module is the exclusive entry point for the user-supplied reference
//! tables. Every table is tab-separated with a header, and every table is
//! checked against a fixed schema once, at load time, so that later stages
//! can rely on well-formed rows.
//!
//! - Strict Schema: Column names are not configurable (`ALLELE`, `SNP`, `A1`,
//!   `DQ`, `RANK`, ...). Extra columns are ignored.
//! - Text First: All columns are read as text and parsed here, so that allele
//!   codes such as `0` are never silently turned into numbers.

use crate::score::interaction::RawInteractionRow;
use crate::score::metrics::{LogisticFit, ReferencePoint};
use crate::score::types::{AlleleRankTable, NamedTable, VariantMappingEntry};
use ahash::AHashSet;
use log::{debug, info};
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A comprehensive error type for all reference-table loading failures.
#[derive(Error, Debug)]
pub enum InputFormatError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    Polars(#[from] PolarsError),
    #[error("IO error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "The required column '{column}' was not found in '{path}'. Please check spelling and case."
    )]
    ColumnNotFound { path: PathBuf, column: String },
    #[error("'{path}' does not appear to be tab-separated (header line: '{header}').")]
    WrongDelimiter { path: PathBuf, header: String },
    #[error("Missing value in column '{column}' of '{path}' at data row {row}.")]
    MissingValue {
        path: PathBuf,
        column: String,
        row: usize,
    },
    #[error("Column '{column}' of '{path}' at data row {row}: '{value}' is not {expected}.")]
    ColumnWrongType {
        path: PathBuf,
        column: String,
        row: usize,
        value: String,
        expected: &'static str,
    },
    #[error("Duplicate {what} in '{path}': {key}")]
    DuplicateKey {
        path: PathBuf,
        what: &'static str,
        key: String,
    },
    #[error("'{path}' contains no data rows.")]
    Empty { path: PathBuf },
    #[error("'{path}': {details}")]
    Invalid { path: PathBuf, details: String },
}

/// Header-validated summary of a linear weight file. The file itself is handed
/// to the scoring collaborator untouched.
#[derive(Debug, Clone)]
pub struct LinearWeightFile {
    pub label: String,
    pub path: PathBuf,
    pub variant_ids: Vec<String>,
}

/// Loads the DQ allele mapping table (`ALLELE`, `SNP`, `A1`).
pub fn load_mapping_table(
    path: &Path,
) -> Result<NamedTable<Vec<VariantMappingEntry>>, InputFormatError> {
    let df = read_tsv(path, &["ALLELE", "SNP", "A1"])?;
    let alleles = string_column(&df, path, "ALLELE")?;
    let variants = string_column(&df, path, "SNP")?;
    let mapping_alleles = string_column(&df, path, "A1")?;

    let mut seen = AHashSet::with_capacity(alleles.len());
    for allele in &alleles {
        if !seen.insert(allele.as_str()) {
            return Err(InputFormatError::DuplicateKey {
                path: path.to_path_buf(),
                what: "DQ allele",
                key: allele.clone(),
            });
        }
    }

    let rows: Vec<VariantMappingEntry> = alleles
        .into_iter()
        .zip(variants)
        .zip(mapping_alleles)
        .map(
            |((allele_name, variant_id), mapping_allele)| VariantMappingEntry {
                allele_name,
                variant_id,
                mapping_allele,
            },
        )
        .collect();
    info!("Loaded {} DQ allele mappings from '{}'", rows.len(), path.display());
    Ok(NamedTable::new("Mapping file containing score allele", rows))
}

/// Loads the DQ allele rank table (`DQ`, `RANK`). Ranks must be positive and unique.
pub fn load_rank_table(path: &Path) -> Result<AlleleRankTable, InputFormatError> {
    let df = read_tsv(path, &["DQ", "RANK"])?;
    let alleles = string_column(&df, path, "DQ")?;
    let raw_ranks = string_column(&df, path, "RANK")?;

    let mut pairs = Vec::with_capacity(alleles.len());
    for (row, (allele, raw)) in alleles.into_iter().zip(raw_ranks).enumerate() {
        let rank = match raw.parse::<u32>() {
            Ok(rank) if rank > 0 => rank,
            _ => {
                return Err(InputFormatError::ColumnWrongType {
                    path: path.to_path_buf(),
                    column: "RANK".to_string(),
                    row: row + 1,
                    value: raw,
                    expected: "a positive integer",
                });
            }
        };
        pairs.push((allele, rank));
    }

    let table =
        AlleleRankTable::from_pairs(pairs).map_err(|dup| InputFormatError::DuplicateKey {
            path: path.to_path_buf(),
            what: "rank entry",
            key: dup.to_string(),
        })?;
    debug!("Loaded {} DQ ranks from '{}'", table.len(), path.display());
    Ok(table)
}

/// Loads the unordered interaction weights (`ALLELE1`, `ALLELE2`, `BETA`).
pub fn load_interaction_weights(
    path: &Path,
) -> Result<NamedTable<Vec<RawInteractionRow>>, InputFormatError> {
    let df = read_tsv(path, &["ALLELE1", "ALLELE2", "BETA"])?;
    let first = string_column(&df, path, "ALLELE1")?;
    let second = string_column(&df, path, "ALLELE2")?;
    let betas = float_column(&df, path, "BETA")?;

    let rows = first
        .into_iter()
        .zip(second)
        .zip(betas)
        .map(|((allele_a, allele_b), beta)| RawInteractionRow {
            allele_a,
            allele_b,
            beta,
        })
        .collect();
    Ok(NamedTable::new(
        "Mapped DQ allele variants interaction scores",
        rows,
    ))
}

/// Validates the header and weights of a linear weight file (`ID`, `ALLELE`, `BETA`).
pub fn load_linear_weights(
    label: &str,
    path: &Path,
) -> Result<LinearWeightFile, InputFormatError> {
    let df = read_tsv(path, &["ID", "ALLELE", "BETA"])?;
    let variant_ids = string_column(&df, path, "ID")?;
    string_column(&df, path, "ALLELE")?;
    float_column(&df, path, "BETA")?;
    debug!(
        "Linear weight file '{}' ({label}) lists {} variants",
        path.display(),
        variant_ids.len()
    );
    Ok(LinearWeightFile {
        label: label.to_string(),
        path: path.to_path_buf(),
        variant_ids,
    })
}

/// Loads the reference ROC curve (`threshold`, `CtrlPCentile`, `CasePCentile`, `PPV`),
/// sorted ascending by threshold.
pub fn load_reference_curve(
    path: &Path,
) -> Result<NamedTable<Vec<ReferencePoint>>, InputFormatError> {
    let df = read_tsv(path, &["threshold", "CtrlPCentile", "CasePCentile", "PPV"])?;
    let thresholds = float_column(&df, path, "threshold")?;
    let controls = float_column(&df, path, "CtrlPCentile")?;
    let cases = float_column(&df, path, "CasePCentile")?;
    let ppvs = float_column(&df, path, "PPV")?;

    let mut rows: Vec<ReferencePoint> = thresholds
        .into_iter()
        .zip(controls)
        .zip(cases)
        .zip(ppvs)
        .map(
            |(((threshold, control_centile), case_centile), ppv)| ReferencePoint {
                threshold,
                control_centile,
                case_centile,
                ppv,
            },
        )
        .collect();
    rows.sort_by(|a, b| a.threshold.total_cmp(&b.threshold));
    Ok(NamedTable::new(
        "Pre-computed ROC curve threshold and metric values",
        rows,
    ))
}

/// Loads the two-sample fit parameters (`Param`, `Estimate`) and extracts `b` and `mid`.
pub fn load_logistic_fit(path: &Path) -> Result<LogisticFit, InputFormatError> {
    let df = read_tsv(path, &["Param", "Estimate"])?;
    let params = string_column(&df, path, "Param")?;
    let estimates = float_column(&df, path, "Estimate")?;

    let lookup = |name: &str| -> Result<f64, InputFormatError> {
        let mut matches = params
            .iter()
            .zip(&estimates)
            .filter(|(param, _)| param.as_str() == name)
            .map(|(_, estimate)| *estimate);
        let value = matches.next().ok_or_else(|| InputFormatError::Invalid {
            path: path.to_path_buf(),
            details: format!("no '{name}' parameter row"),
        })?;
        if matches.next().is_some() {
            return Err(InputFormatError::DuplicateKey {
                path: path.to_path_buf(),
                what: "parameter",
                key: name.to_string(),
            });
        }
        Ok(value)
    };

    Ok(LogisticFit {
        b: lookup("b")?,
        mid: lookup("mid")?,
    })
}

/// Reads a tab-separated table with every column as text, verifying the required header.
fn read_tsv(path: &Path, required: &[&str]) -> Result<DataFrame, InputFormatError> {
    let file = File::open(path).map_err(|source| InputFormatError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let df = CsvReader::new(file)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(Some(0))
                .with_parse_options(CsvParseOptions::default().with_separator(b'\t')),
        )
        .finish()?;

    let columns: AHashSet<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();

    if columns.len() == 1 && required.len() > 1 {
        if let Some(header) = columns.iter().next() {
            if header.contains(',') || header.contains(' ') {
                return Err(InputFormatError::WrongDelimiter {
                    path: path.to_path_buf(),
                    header: header.clone(),
                });
            }
        }
    }

    for column in required {
        if !columns.contains(*column) {
            return Err(InputFormatError::ColumnNotFound {
                path: path.to_path_buf(),
                column: (*column).to_string(),
            });
        }
    }

    if df.height() == 0 {
        return Err(InputFormatError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(df)
}

fn string_column(df: &DataFrame, path: &Path, name: &str) -> Result<Vec<String>, InputFormatError> {
    let column = df.column(name)?.str()?;
    column
        .into_iter()
        .enumerate()
        .map(|(row, value)| match value.map(str::trim) {
            Some(text) if !text.is_empty() => Ok(text.to_string()),
            _ => Err(InputFormatError::MissingValue {
                path: path.to_path_buf(),
                column: name.to_string(),
                row: row + 1,
            }),
        })
        .collect()
}

fn float_column(df: &DataFrame, path: &Path, name: &str) -> Result<Vec<f64>, InputFormatError> {
    string_column(df, path, name)?
        .into_iter()
        .enumerate()
        .map(|(row, text)| match text.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(InputFormatError::ColumnWrongType {
                path: path.to_path_buf(),
                column: name.to_string(),
                row: row + 1,
                value: text,
                expected: "a finite number",
            }),
        })
        .collect()
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::io::{self, Write};
    use tempfile::NamedTempFile;

    fn create_test_tsv(content: &str) -> io::Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        write!(file, "{}", content)?;
        file.flush()?;
        Ok(file)
    }

    #[test]
    fn mapping_table_keeps_allele_codes_as_text() {
        let file = create_test_tsv("ALLELE\tSNP\tA1\textra\nDQ2.5\trs1\t0\tx\nDQ8\trs2\t-\ty\n")
            .unwrap();
        let table = load_mapping_table(file.path()).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].mapping_allele, "0");
        assert_eq!(table.rows[1].mapping_allele, "-");
        assert_eq!(table.rows[1].variant_id, "rs2");
    }

    #[test]
    fn mapping_table_rejects_duplicate_alleles() {
        let file = create_test_tsv("ALLELE\tSNP\tA1\nDQ8\trs1\tA\nDQ8\trs2\tG\n").unwrap();
        match load_mapping_table(file.path()).unwrap_err() {
            InputFormatError::DuplicateKey { key, .. } => assert_eq!(key, "DQ8"),
            other => panic!("Expected DuplicateKey, got {other:?}"),
        }
    }

    #[test]
    fn missing_column_is_named() {
        let file = create_test_tsv("ALLELE\tSNP\nDQ8\trs1\n").unwrap();
        match load_mapping_table(file.path()).unwrap_err() {
            InputFormatError::ColumnNotFound { column, .. } => assert_eq!(column, "A1"),
            other => panic!("Expected ColumnNotFound, got {other:?}"),
        }
    }

    #[test]
    fn comma_separated_file_is_a_delimiter_error() {
        let file = create_test_tsv("DQ,RANK\nDQ8,1\n").unwrap();
        assert!(matches!(
            load_rank_table(file.path()).unwrap_err(),
            InputFormatError::WrongDelimiter { .. }
        ));
    }

    #[test]
    fn rank_table_requires_positive_integers() {
        let file = create_test_tsv("DQ\tRANK\nDQ8\t1\nDQ2.5\tfirst\n").unwrap();
        match load_rank_table(file.path()).unwrap_err() {
            InputFormatError::ColumnWrongType { row, value, .. } => {
                assert_eq!(row, 2);
                assert_eq!(value, "first");
            }
            other => panic!("Expected ColumnWrongType, got {other:?}"),
        }
    }

    #[test]
    fn rank_table_rejects_shared_rank() {
        let file = create_test_tsv("DQ\tRANK\nDQ8\t1\nDQ2.5\t1\n").unwrap();
        assert!(matches!(
            load_rank_table(file.path()).unwrap_err(),
            InputFormatError::DuplicateKey { .. }
        ));
    }

    #[test]
    fn interaction_weights_parse_betas() {
        let file =
            create_test_tsv("ALLELE1\tALLELE2\tBETA\nDQ8\tDQ2.5\t3.15\nDQ8\tX\t-0.5\n").unwrap();
        let table = load_interaction_weights(file.path()).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].allele_a, "DQ8");
        assert_abs_diff_eq!(table.rows[0].beta, 3.15, epsilon = 1e-12);
        assert_abs_diff_eq!(table.rows[1].beta, -0.5, epsilon = 1e-12);
    }

    #[test]
    fn missing_beta_is_reported() {
        let file = create_test_tsv("ALLELE1\tALLELE2\tBETA\nDQ8\tDQ2.5\t\n").unwrap();
        assert!(matches!(
            load_interaction_weights(file.path()).unwrap_err(),
            InputFormatError::MissingValue { row: 1, .. }
        ));
    }

    #[test]
    fn reference_curve_is_sorted_by_threshold() {
        let file = create_test_tsv(
            "threshold\tCtrlPCentile\tCasePCentile\tPPV\n0.5\t90\t40\t0.1\n0.1\t20\t5\t0.01\n",
        )
        .unwrap();
        let curve = load_reference_curve(file.path()).unwrap();
        assert_abs_diff_eq!(curve.rows[0].threshold, 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(curve.rows[1].control_centile, 90.0, epsilon = 1e-12);
    }

    #[test]
    fn empty_reference_curve_is_rejected() {
        let file = create_test_tsv("threshold\tCtrlPCentile\tCasePCentile\tPPV\n").unwrap();
        assert!(matches!(
            load_reference_curve(file.path()).unwrap_err(),
            InputFormatError::Empty { .. }
        ));
    }

    #[test]
    fn logistic_fit_extracts_b_and_mid() {
        let file = create_test_tsv(
            "Param\tEstimate\tStd_Error\tt_value\tPr_gt_t\nb\t2.5\t0.1\t25\t0\nmid\t10.25\t0.2\t51\t0\n",
        )
        .unwrap();
        let fit = load_logistic_fit(file.path()).unwrap();
        assert_abs_diff_eq!(fit.b, 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.mid, 10.25, epsilon = 1e-12);
    }

    #[test]
    fn logistic_fit_requires_mid() {
        let file = create_test_tsv("Param\tEstimate\nb\t2.5\n").unwrap();
        assert!(matches!(
            load_logistic_fit(file.path()).unwrap_err(),
            InputFormatError::Invalid { .. }
        ));
    }

    #[test]
    fn linear_weights_collect_variant_ids() {
        let file = create_test_tsv("ID\tALLELE\tBETA\nrs1\tA\t0.1\nrs2\tT\t-0.2\n").unwrap();
        let weights = load_linear_weights("all variants", file.path()).unwrap();
        assert_eq!(weights.variant_ids, vec!["rs1", "rs2"]);
        assert_eq!(weights.label, "all variants");
    }
}
