//! Persisted-state layout: input rows in, enriched records out.

use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod export;
pub mod load;

pub use export::{ExportFormat, export_records, to_csv, to_json, write_checkpoint};
pub use load::{load_rows, parse_rows};

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid JSON{}: {source}", line_suffix(.line))]
    Json {
        line: Option<usize>,
        source: serde_json::Error,
    },
    #[error("unsupported format {0:?} (expected csv or json)")]
    UnsupportedFormat(String),
}

impl ReportError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        ReportError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn line_suffix(line: &Option<usize>) -> String {
    line.map(|n| format!(" on line {}", n)).unwrap_or_default()
}
