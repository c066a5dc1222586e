use std::path::Path;

use versemap_core::RawConcept;

use crate::ReportError;

/// Load input rows from a JSON array or JSON Lines file.
///
/// Each row is an object with `Concept`, `Category`, `Description` and
/// `Matching_Verse` columns. Missing or null columns read as empty strings.
pub fn load_rows(path: &Path) -> Result<Vec<RawConcept>, ReportError> {
    let content = std::fs::read_to_string(path).map_err(|e| ReportError::io(path, e))?;
    let rows = parse_rows(&content)?;
    tracing::info!(path = %path.display(), rows = rows.len(), "loaded input rows");
    Ok(rows)
}

/// Parse rows from text. A leading `[` selects array format; anything else is
/// read as one object per non-blank line.
pub fn parse_rows(content: &str) -> Result<Vec<RawConcept>, ReportError> {
    let trimmed = content.trim_start_matches('\u{feff}').trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(|source| ReportError::Json {
            line: None,
            source,
        });
    }

    trimmed
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|source| ReportError::Json {
                line: Some(i + 1),
                source,
            })
        })
        .collect()
}
