use std::io::Write;
use std::path::Path;

use versemap_core::EnrichedRecord;

use crate::ReportError;

/// Output file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    /// Pick a format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self, ReportError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            _ => Err(ReportError::UnsupportedFormat(ext)),
        }
    }

    pub fn render(&self, records: &[EnrichedRecord]) -> Result<String, ReportError> {
        match self {
            ExportFormat::Csv => Ok(to_csv(records)),
            ExportFormat::Json => to_json(records),
        }
    }
}

/// Write `records` to `path` in `format`, replacing the file atomically.
pub fn export_records(
    records: &[EnrichedRecord],
    format: ExportFormat,
    path: &Path,
) -> Result<(), ReportError> {
    let content = format.render(records)?;
    write_atomic(path, content.as_bytes())?;
    tracing::info!(path = %path.display(), records = records.len(), ?format, "wrote output");
    Ok(())
}

/// Persist the records completed so far. The format follows the extension
/// of `path`; a reader never sees a half-written file.
pub fn write_checkpoint(records: &[EnrichedRecord], path: &Path) -> Result<(), ReportError> {
    let format = ExportFormat::from_path(path)?;
    let content = format.render(records)?;
    write_atomic(path, content.as_bytes())?;
    tracing::debug!(path = %path.display(), records = records.len(), "checkpoint written");
    Ok(())
}

/// CSV with the fixed column header. Missing values are empty cells.
pub fn to_csv(records: &[EnrichedRecord]) -> String {
    let mut out = EnrichedRecord::COLUMNS.join(",");
    out.push('\n');
    for record in records {
        let row: Vec<String> = record.values().iter().map(|v| csv_escape(v)).collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

/// Pretty-printed JSON array of records keyed by column name.
pub fn to_json(records: &[EnrichedRecord]) -> Result<String, ReportError> {
    let mut out = serde_json::to_string_pretty(records)
        .map_err(|source| ReportError::Json { line: None, source })?;
    out.push('\n');
    Ok(out)
}

fn csv_escape(s: &str) -> String {
    if s.contains(['"', ',', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Write to a temporary file next to `path`, then rename it into place.
fn write_atomic(path: &Path, content: &[u8]) -> Result<(), ReportError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| ReportError::io(dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| ReportError::io(dir, e))?;
    if let Err(e) = tmp.write_all(content).and_then(|_| tmp.flush()) {
        return Err(ReportError::io(tmp.path(), e));
    }
    tmp.persist(path)
        .map_err(|e| ReportError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_only_when_needed() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a, b"), "\"a, b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_escape("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(
            ExportFormat::from_path(Path::new("out/data.CSV")).unwrap(),
            ExportFormat::Csv
        );
        assert_eq!(
            ExportFormat::from_path(Path::new("data.json")).unwrap(),
            ExportFormat::Json
        );
        assert!(matches!(
            ExportFormat::from_path(Path::new("data.xlsx")),
            Err(ReportError::UnsupportedFormat(ext)) if ext == "xlsx"
        ));
    }
}
