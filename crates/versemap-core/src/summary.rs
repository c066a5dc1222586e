//! Aggregate statistics for one batch run.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{EnrichedRecord, Resolution, ResolveOutcome};

/// Label used for rows where no parse strategy produced anything.
pub const NO_STRATEGY: &str = "none";

/// Filled / missing tally for one output column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FieldCounts {
    pub filled: usize,
    pub missing: usize,
}

impl FieldCounts {
    fn record(&mut self, value: &str) {
        if value.is_empty() {
            self.missing += 1;
        } else {
            self.filled += 1;
        }
    }
}

/// Summary of a batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub total_rows: usize,
    pub chapter: FieldCounts,
    pub verse: FieldCounts,
    pub translation: FieldCounts,
    pub relation: FieldCounts,
    pub canonical_text: FieldCounts,
    pub audio_url: FieldCounts,
    pub tafsir_url: FieldCounts,
    /// Rows per winning parse strategy.
    pub strategies: BTreeMap<&'static str, usize>,
    pub resolved: usize,
    pub no_match: usize,
    pub unresolvable: usize,
    pub transport_failures: usize,
    pub skipped: usize,
    pub cache_hits: usize,
    /// Rows that hit a processing fault in any stage.
    pub faults: usize,
    pub network_calls: u64,
    pub cancelled: bool,
}

impl RunSummary {
    /// Tally one emitted row.
    pub fn record_row(
        &mut self,
        record: &EnrichedRecord,
        strategy: Option<&'static str>,
        resolution: &Resolution,
    ) {
        self.total_rows += 1;
        self.chapter.record(&record.chapter_id);
        self.verse.record(&record.verse_number);
        self.translation.record(&record.translation_text);
        self.relation.record(&record.relation_text);
        self.canonical_text.record(&record.canonical_text);
        self.audio_url.record(&record.audio_url);
        self.tafsir_url.record(&record.tafsir_url);

        *self
            .strategies
            .entry(strategy.unwrap_or(NO_STRATEGY))
            .or_default() += 1;

        match resolution.outcome {
            ResolveOutcome::Resolved => self.resolved += 1,
            ResolveOutcome::NoMatch => self.no_match += 1,
            ResolveOutcome::Unresolvable => self.unresolvable += 1,
            ResolveOutcome::TransportFailure { .. } => self.transport_failures += 1,
            ResolveOutcome::Skipped => self.skipped += 1,
        }
        if resolution.cached {
            self.cache_hits += 1;
        }
        self.network_calls += u64::from(resolution.network_calls);
    }

    pub fn record_fault(&mut self) {
        self.faults += 1;
    }

    /// `(column, counts)` pairs in output column order.
    pub fn fields(&self) -> [(&'static str, FieldCounts); 7] {
        [
            ("Surah", self.chapter),
            ("Verse", self.verse),
            ("Translation", self.translation),
            ("Relation", self.relation),
            ("CanonicalText", self.canonical_text),
            ("AudioUrl", self.audio_url),
            ("TafsirUrl", self.tafsir_url),
        ]
    }

    /// Fraction of rows that ended with canonical text.
    pub fn enrichment_rate(&self) -> f64 {
        if self.total_rows == 0 {
            0.0
        } else {
            self.canonical_text.filled as f64 / self.total_rows as f64
        }
    }
}
