use std::io::Write;

use owo_colors::OwoColorize;
use versemap_core::{ProgressEvent, RunSummary, VerseReference};

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Print the notable progress events: faults, transport failures, cancellation.
/// Routine row completion is shown by the progress bar instead.
pub fn print_progress(
    w: &mut dyn Write,
    event: &ProgressEvent,
    color: ColorMode,
) -> std::io::Result<()> {
    match event {
        ProgressEvent::RowFault {
            index,
            total,
            concept,
            stage,
            message,
        } => {
            let label = format!("FAULT ({})", stage);
            if color.enabled() {
                writeln!(
                    w,
                    "[{}/{}] {} {}: {}",
                    index + 1,
                    total,
                    label.red(),
                    concept,
                    message.dimmed()
                )?;
            } else {
                writeln!(w, "[{}/{}] {} {}: {}", index + 1, total, label, concept, message)?;
            }
        }
        ProgressEvent::TransportFailure {
            index,
            key,
            attempts,
            error,
        } => {
            let msg = format!(
                "lookup for {} failed after {} attempts: {}",
                key, attempts, error
            );
            if color.enabled() {
                writeln!(w, "[{}] {} {}", index + 1, "WARNING:".yellow(), msg)?;
            } else {
                writeln!(w, "[{}] WARNING: {}", index + 1, msg)?;
            }
        }
        ProgressEvent::Cancelled { remaining } => {
            let msg = format!(
                "Cancelled: {} remaining rows will be written without enrichment",
                remaining
            );
            if color.enabled() {
                writeln!(w, "{}", msg.yellow())?;
            } else {
                writeln!(w, "{}", msg)?;
            }
        }
        ProgressEvent::RowStarted { .. }
        | ProgressEvent::RowComplete { .. }
        | ProgressEvent::Pacing { .. } => {
            // Shown by the progress bar
        }
    }
    Ok(())
}

/// One line per row for the parse-only listing.
pub fn print_parsed_row(
    w: &mut dyn Write,
    index: usize,
    total: usize,
    concept: &str,
    reference: &VerseReference,
    strategy: Option<&str>,
    color: ColorMode,
) -> std::io::Result<()> {
    let strategy = strategy.unwrap_or("none");
    let location = match (reference.chapter_id.as_str(), reference.verse_number.as_str()) {
        ("", "") => "-".to_string(),
        (chapter, "") => chapter.to_string(),
        ("", verse) => verse.to_string(),
        (chapter, verse) => format!("{} {}", chapter, verse),
    };

    if color.enabled() {
        let strategy = if strategy == "none" {
            strategy.red().to_string()
        } else {
            strategy.cyan().to_string()
        };
        writeln!(
            w,
            "[{}/{}] {} -> {} [{}]",
            index + 1,
            total,
            truncate(concept, 40).bold(),
            location,
            strategy
        )?;
    } else {
        writeln!(
            w,
            "[{}/{}] {} -> {} [{}]",
            index + 1,
            total,
            truncate(concept, 40),
            location,
            strategy
        )?;
    }
    if !reference.translation_text.is_empty() {
        let line = format!("    {}", truncate(&reference.translation_text, 100));
        if color.enabled() {
            writeln!(w, "{}", line.dimmed())?;
        } else {
            writeln!(w, "{}", line)?;
        }
    }
    Ok(())
}

/// Print the end-of-run summary.
pub fn print_summary(
    w: &mut dyn Write,
    summary: &RunSummary,
    enriched: bool,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w)?;
    let sep = "=".repeat(60);
    if color.enabled() {
        writeln!(w, "{}", sep.bold())?;
        writeln!(w, "{}", "SUMMARY".bold())?;
        writeln!(w, "{}", sep.bold())?;
    } else {
        writeln!(w, "{}", sep)?;
        writeln!(w, "SUMMARY")?;
        writeln!(w, "{}", sep)?;
    }

    writeln!(w, "  Rows: {}", summary.total_rows)?;
    if summary.cancelled {
        let msg = "Run was cancelled; trailing rows were not enriched";
        if color.enabled() {
            writeln!(w, "  {}", msg.yellow())?;
        } else {
            writeln!(w, "  {}", msg)?;
        }
    }
    writeln!(w)?;

    writeln!(w, "  Parse strategies:")?;
    for (name, count) in &summary.strategies {
        writeln!(w, "    {:<20} {}", name, count)?;
    }
    writeln!(w)?;

    writeln!(w, "  Fields (filled / missing):")?;
    for (column, counts) in summary.fields() {
        if !enriched && matches!(column, "CanonicalText" | "AudioUrl" | "TafsirUrl") {
            continue;
        }
        let line = format!("    {:<14} {:>6} / {}", column, counts.filled, counts.missing);
        if color.enabled() && counts.missing > 0 {
            writeln!(w, "{}", line.yellow())?;
        } else {
            writeln!(w, "{}", line)?;
        }
    }

    if enriched {
        writeln!(w)?;
        if color.enabled() {
            writeln!(w, "  {} {}", "Resolved:".green(), summary.resolved)?;
        } else {
            writeln!(w, "  Resolved: {}", summary.resolved)?;
        }
        writeln!(w, "  No match: {}", summary.no_match)?;
        writeln!(w, "  Unresolvable: {}", summary.unresolvable)?;
        if summary.transport_failures > 0 {
            if color.enabled() {
                writeln!(
                    w,
                    "  {} {}",
                    "Transport failures:".red(),
                    summary.transport_failures
                )?;
            } else {
                writeln!(w, "  Transport failures: {}", summary.transport_failures)?;
            }
        }
        if summary.skipped > 0 {
            writeln!(w, "  Not enriched: {}", summary.skipped)?;
        }
        let msg = format!(
            "Cache hits: {}, requests sent: {}, enrichment rate: {:.0}%",
            summary.cache_hits,
            summary.network_calls,
            summary.enrichment_rate() * 100.0
        );
        if color.enabled() {
            writeln!(w, "  {}", msg.dimmed())?;
        } else {
            writeln!(w, "  {}", msg)?;
        }
    }

    if summary.faults > 0 {
        if color.enabled() {
            writeln!(w, "  {} {}", "Row faults:".red(), summary.faults)?;
        } else {
            writeln!(w, "  Row faults: {}", summary.faults)?;
        }
    }

    writeln!(w)?;
    Ok(())
}

/// Shorten to `max` characters, never splitting a character.
fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
