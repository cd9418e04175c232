//! Input file resolution
//!
//! [`DataDirectory`] finds a file by exact name anywhere under a root
//! directory and parses it into a raw [`RecordBatch`]. Delimited text is
//! always supported; spreadsheets need the `excel` feature.

use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::batch::{RecordBatch, Value};
use crate::schema::EntityKind;

/// Cell contents read as missing
const NA_VALUES: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "NULL", "null", "None", "#N/A", "<NA>",
];

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xls", "xlsm", "ods"];

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("File {file_name} not found under {}", .root.display())]
    FileNotFound { file_name: String, root: PathBuf },

    #[error("Unsupported file format: {}", .path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to read spreadsheet {}: {message}", .path.display())]
    Spreadsheet { path: PathBuf, message: String },

    #[error("Failed to walk data directory: {0}")]
    Walk(#[from] walkdir::Error),
}

impl SourceError {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::FileNotFound { .. } => "FileNotFoundError",
            SourceError::UnsupportedFormat { .. } => "UnsupportedFormatError",
            SourceError::Io { .. } | SourceError::Walk(_) => "IoError",
            SourceError::Csv { .. } | SourceError::Spreadsheet { .. } => "ParseError",
        }
    }
}

/// Root directory that input files are looked up in
#[derive(Debug, Clone)]
pub struct DataDirectory {
    root: PathBuf,
}

impl DataDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Locate `file_name` by exact name, searching recursively
    ///
    /// Directory entries are visited in file-name order, so the first match
    /// is stable between runs.
    pub fn find(&self, file_name: &str) -> Result<PathBuf, SourceError> {
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() && entry.file_name() == file_name {
                debug!(path = %entry.path().display(), "Resolved input file");
                return Ok(entry.into_path());
            }
        }

        Err(SourceError::FileNotFound {
            file_name: file_name.to_string(),
            root: self.root.clone(),
        })
    }

    /// Find `file_name` and read it as a raw `entity` batch
    pub fn load(&self, entity: EntityKind, file_name: &str) -> Result<RecordBatch, SourceError> {
        let path = self.find(file_name)?;
        let batch = read_file(entity, &path)?;
        info!(
            entity = %entity,
            path = %path.display(),
            rows = batch.len(),
            columns = batch.columns().len(),
            "Loaded input file"
        );
        Ok(batch)
    }
}

/// Parse `path` by extension
pub fn read_file(entity: EntityKind, path: &Path) -> Result<RecordBatch, SourceError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "csv" => read_csv(entity, path),
        ext if SPREADSHEET_EXTENSIONS.contains(&ext) => read_spreadsheet(entity, path),
        _ => Err(SourceError::UnsupportedFormat {
            path: path.to_path_buf(),
        }),
    }
}

fn read_csv(entity: EntityKind, path: &Path) -> Result<RecordBatch, SourceError> {
    let file = File::open(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let csv_err = |source| SourceError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(file);

    let columns: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        rows.push(record.iter().map(cell).collect());
    }

    Ok(RecordBatch::new(entity, columns, rows))
}

fn cell(raw: &str) -> Value {
    if NA_VALUES.contains(&raw.trim()) {
        Value::Null
    } else {
        Value::text(raw)
    }
}

#[cfg(feature = "excel")]
fn read_spreadsheet(entity: EntityKind, path: &Path) -> Result<RecordBatch, SourceError> {
    use calamine::{open_workbook_auto, Data, DataType, Reader};

    let spreadsheet_err = |e: calamine::Error| SourceError::Spreadsheet {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let mut workbook = open_workbook_auto(path).map_err(spreadsheet_err)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| SourceError::Spreadsheet {
            path: path.to_path_buf(),
            message: "workbook has no worksheets".to_string(),
        })?
        .map_err(spreadsheet_err)?;

    let to_value = |data: &Data| -> Value {
        match data {
            Data::Empty | Data::Error(_) => Value::Null,
            Data::String(s) => cell(s),
            Data::Int(i) => Value::Int(*i),
            Data::Float(f) => Value::Float(*f),
            Data::Bool(b) => Value::text(b.to_string()),
            Data::DateTime(_) | Data::DateTimeIso(_) => match data.as_datetime() {
                Some(ts) => Value::Timestamp(ts),
                None => cell(&data.to_string()),
            },
            other => cell(&other.to_string()),
        }
    };

    let mut rows = range.rows();
    let columns: Vec<String> = rows
        .next()
        .map(|header| header.iter().map(|c| c.to_string().trim().to_string()).collect())
        .unwrap_or_default();
    let rows = rows.map(|row| row.iter().map(to_value).collect()).collect();

    Ok(RecordBatch::new(entity, columns, rows))
}

#[cfg(not(feature = "excel"))]
fn read_spreadsheet(_entity: EntityKind, path: &Path) -> Result<RecordBatch, SourceError> {
    Err(SourceError::UnsupportedFormat {
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_na_markers_become_missing() {
        assert_eq!(cell("NA"), Value::Null);
        assert_eq!(cell("  "), Value::Null);
        assert_eq!(cell("#N/A"), Value::Null);
        assert_eq!(cell(" ICU "), Value::text(" ICU "));
    }

    #[test]
    fn test_unknown_extension_is_unsupported() {
        let err = read_file(EntityKind::Staff, Path::new("staff.json")).unwrap_err();
        assert_eq!(err.kind(), "UnsupportedFormatError");
    }
}
