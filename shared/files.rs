use log::debug;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The first three bytes of every SNP-major PLINK 1 `.bed` file.
const BED_MAGIC: [u8; 3] = [0x6c, 0x1b, 0x01];

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("'{path}' is empty; a header line was expected")]
    Empty { path: PathBuf },
    #[error("'{path}' has no '{column}' column in its header")]
    ColumnNotFound { path: PathBuf, column: String },
    #[error("'{path}' line {line_number} has {found} fields but the header has {expected}")]
    RaggedRow {
        path: PathBuf,
        line_number: usize,
        found: usize,
        expected: usize,
    },
}

/// A whitespace-delimited report with a header line, as PLINK writes them
/// (`.frq`, `.profile`). Columns are padded with a variable number of spaces,
/// so a generic delimiter-based reader does not apply.
#[derive(Debug, Clone)]
pub struct WhitespaceReport {
    pub path: PathBuf,
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl WhitespaceReport {
    pub fn read(path: &Path) -> Result<Self, ReportError> {
        let file = File::open(path).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(path, BufReader::new(file))
    }

    pub fn from_reader<R: BufRead>(path: &Path, reader: R) -> Result<Self, ReportError> {
        let mut header: Option<Vec<String>> = None;
        let mut rows = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| ReportError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<String> = line.split_whitespace().map(str::to_string).collect();
            match &header {
                None => header = Some(fields),
                Some(h) => {
                    if fields.len() != h.len() {
                        return Err(ReportError::RaggedRow {
                            path: path.to_path_buf(),
                            line_number: idx + 1,
                            found: fields.len(),
                            expected: h.len(),
                        });
                    }
                    rows.push(fields);
                }
            }
        }

        let header = header.ok_or_else(|| ReportError::Empty {
            path: path.to_path_buf(),
        })?;
        debug!(
            "Read {} rows with columns {:?} from '{}'",
            rows.len(),
            header,
            path.display()
        );
        Ok(Self {
            path: path.to_path_buf(),
            header,
            rows,
        })
    }

    /// Resolves the position of each requested column, failing on the first absent one.
    pub fn column_indices(&self, columns: &[&str]) -> Result<Vec<usize>, ReportError> {
        columns
            .iter()
            .map(|name| {
                self.header
                    .iter()
                    .position(|h| h == name)
                    .ok_or_else(|| ReportError::ColumnNotFound {
                        path: self.path.clone(),
                        column: (*name).to_string(),
                    })
            })
            .collect()
    }

    pub fn rows(&self) -> impl Iterator<Item = &[String]> {
        self.rows.iter().map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum FilesetError {
    #[error("cannot read '{path}': {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("'{0}' is not a PLINK .bed file")]
    NotBed(PathBuf),
}

/// Checks that `{prefix}.bed` carries the PLINK magic number and that the
/// matching `.bim` and `.fam` are readable. Returns the prefix unchanged.
pub fn validate_plink_fileset(prefix: &Path) -> Result<PathBuf, FilesetError> {
    let bed = with_suffix(prefix, "bed");
    let mut magic = [0u8; 3];
    File::open(&bed)
        .and_then(|mut f| f.read_exact(&mut magic))
        .map_err(|source| FilesetError::Unreadable {
            path: bed.clone(),
            source,
        })?;
    if magic != BED_MAGIC {
        return Err(FilesetError::NotBed(bed));
    }
    debug!("File found: '{}'", bed.display());

    for ext in ["bim", "fam"] {
        validate_text_file(&with_suffix(prefix, ext))?;
    }
    Ok(prefix.to_path_buf())
}

/// Confirms a text file exists and that its first line can be read.
pub fn validate_text_file(path: &Path) -> Result<(), FilesetError> {
    let file = File::open(path).map_err(|source| FilesetError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let mut first = String::new();
    BufReader::new(file)
        .read_line(&mut first)
        .map_err(|source| FilesetError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
    debug!("File found: '{}'", path.display());
    Ok(())
}

/// Appends `.ext` to a prefix without replacing any dot already in its file name.
pub fn with_suffix(prefix: &Path, ext: &str) -> PathBuf {
    let mut raw = prefix.as_os_str().to_os_string();
    raw.push(".");
    raw.push(ext);
    PathBuf::from(raw)
}
