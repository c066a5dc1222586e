//! Sequential batch pipeline: generate (optional) → parse → enrich → merge.
//!
//! Every input row produces exactly one output row, in input order. Faults in
//! any stage are caught at the row boundary; the row is emitted with whatever
//! was recovered before the fault.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::retry::{Sleeper, TokioSleeper};
use crate::source::{SYSTEM_PROMPT, TextSource, build_prompt};
use crate::{
    EnrichedRecord, EnrichmentClient, FaultStage, ProgressEvent, RawConcept, Resolution,
    ResolveOutcome, RunSummary, VerseReference,
};

/// Output of a [`ReferenceParser`] for one text block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedBlock {
    pub reference: VerseReference,
    /// Name of the strategy that produced `reference`, if any did.
    pub strategy: Option<&'static str>,
}

/// Turns a free-text block into a [`VerseReference`]. Must not fail; fields
/// that cannot be found are left empty.
pub trait ReferenceParser: Send + Sync {
    fn parse_block(&self, raw_text: &str) -> ParsedBlock;
}

/// Records plus summary statistics for one run.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub records: Vec<EnrichedRecord>,
    pub summary: RunSummary,
}

/// Drives rows through parsing and enrichment one at a time.
pub struct BatchPipeline {
    parser: Arc<dyn ReferenceParser>,
    client: Arc<EnrichmentClient>,
    source: Option<Arc<dyn TextSource>>,
    sleeper: Arc<dyn Sleeper>,
    pacing: Duration,
}

impl BatchPipeline {
    /// Pacing delay is taken from the client's configuration.
    pub fn new(parser: Arc<dyn ReferenceParser>, client: Arc<EnrichmentClient>) -> Self {
        let pacing = client.config().pacing_delay();
        Self {
            parser,
            client,
            source: None,
            sleeper: Arc::new(TokioSleeper),
            pacing,
        }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Ask `source` for a text block when a row arrives without one.
    pub fn with_text_source(mut self, source: Arc<dyn TextSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Process every row and return the records with summary statistics.
    pub async fn run(&self, rows: Vec<RawConcept>) -> BatchReport {
        self.run_with_progress(rows, |_| {}, CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), emitting progress events.
    ///
    /// After `cancel` fires, remaining rows are still parsed and emitted but
    /// no longer enriched or generated, so the output stays one-to-one with
    /// the input.
    pub async fn run_with_progress(
        &self,
        rows: Vec<RawConcept>,
        progress: impl Fn(ProgressEvent) + Send + Sync,
        cancel: CancellationToken,
    ) -> BatchReport {
        let total = rows.len();
        let mut report = BatchReport {
            records: Vec::with_capacity(total),
            summary: RunSummary::default(),
        };

        for (index, concept) in rows.iter().enumerate() {
            let cancelled = cancel.is_cancelled();
            if cancelled && !report.summary.cancelled {
                tracing::info!(remaining = total - index, "run cancelled, emitting remaining rows unenriched");
                report.summary.cancelled = true;
                progress(ProgressEvent::Cancelled {
                    remaining: total - index,
                });
            }

            progress(ProgressEvent::RowStarted {
                index,
                total,
                concept: concept.name.clone(),
            });

            let mut faulted = false;
            let mut touched_network = false;
            let mut fault = |stage: FaultStage, message: String| {
                tracing::error!(index, concept = %concept.name, %stage, error = %message, "row processing fault");
                progress(ProgressEvent::RowFault {
                    index,
                    total,
                    concept: concept.name.clone(),
                    stage,
                    message,
                });
                faulted = true;
            };

            // Generate
            let mut text = concept.raw_reference_text.clone();
            if text.trim().is_empty()
                && !cancelled
                && let Some(source) = &self.source
            {
                touched_network = true;
                match self.generate(source.clone(), concept).await {
                    Ok(generated) => text = generated,
                    Err(message) => fault(FaultStage::Generate, message),
                }
            }

            // Parse
            let parser = self.parser.as_ref();
            let parsed = match catch_unwind(AssertUnwindSafe(|| parser.parse_block(&text))) {
                Ok(parsed) => parsed,
                Err(payload) => {
                    fault(FaultStage::Parse, panic_message(payload.as_ref()));
                    ParsedBlock::default()
                }
            };

            // Enrich
            let resolution = if cancelled {
                Resolution::skipped()
            } else {
                let client = self.client.clone();
                let reference = parsed.reference.clone();
                match tokio::spawn(async move { client.resolve_detailed(&reference).await }).await
                {
                    Ok(resolution) => resolution,
                    Err(e) => {
                        touched_network = true;
                        let message = if e.is_panic() {
                            panic_message(e.into_panic().as_ref())
                        } else {
                            e.to_string()
                        };
                        fault(FaultStage::Enrich, message);
                        Resolution::skipped()
                    }
                }
            };
            touched_network |= resolution.performed_network();

            if let ResolveOutcome::TransportFailure { error } = &resolution.outcome {
                progress(ProgressEvent::TransportFailure {
                    index,
                    key: resolution.key.map(|k| k.to_string()).unwrap_or_default(),
                    attempts: resolution.attempts,
                    error: error.clone(),
                });
            }

            // Merge
            let record = EnrichedRecord::new(concept, parsed.reference, resolution.result.clone());
            if faulted {
                report.summary.record_fault();
            }
            report
                .summary
                .record_row(&record, parsed.strategy, &resolution);
            tracing::debug!(
                index,
                concept = %concept.name,
                strategy = parsed.strategy.unwrap_or("none"),
                outcome = resolution.outcome.label(),
                "row complete"
            );
            progress(ProgressEvent::RowComplete {
                index,
                total,
                record: Box::new(record.clone()),
                strategy: parsed.strategy,
                outcome: resolution.outcome,
            });
            report.records.push(record);

            if touched_network && index + 1 < total && !self.pacing.is_zero() {
                progress(ProgressEvent::Pacing { wait: self.pacing });
                tokio::select! {
                    _ = self.sleeper.sleep(self.pacing) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }

        tracing::info!(
            rows = report.summary.total_rows,
            resolved = report.summary.resolved,
            faults = report.summary.faults,
            transport_failures = report.summary.transport_failures,
            "batch complete"
        );
        report
    }

    /// Ask the text source for a block, isolating panics in a task.
    async fn generate(
        &self,
        source: Arc<dyn TextSource>,
        concept: &RawConcept,
    ) -> Result<String, String> {
        let prompt = build_prompt(concept);
        tracing::debug!(concept = %concept.name, source = source.name(), "generating reference text");
        match tokio::spawn(async move { source.generate(SYSTEM_PROMPT, &prompt).await }).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) if e.is_panic() => Err(panic_message(e.into_panic().as_ref())),
            Err(e) => Err(e.to_string()),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::mock::{MockLookup, MockResponse};
    use crate::retry::RecordingSleeper;
    use crate::{Config, CoreError, EnrichmentResult, VerseKey};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    /// Takes the first `c:v` in the block as the verse; panics on "PANIC".
    struct KeyParser;

    impl ReferenceParser for KeyParser {
        fn parse_block(&self, raw_text: &str) -> ParsedBlock {
            if raw_text.contains("PANIC") {
                panic!("parser exploded");
            }
            match VerseKey::find_in(raw_text) {
                Some(key) => ParsedBlock {
                    reference: VerseReference {
                        verse_number: key.to_string(),
                        translation_text: raw_text.to_string(),
                        ..Default::default()
                    },
                    strategy: Some("key"),
                },
                None => ParsedBlock::default(),
            }
        }
    }

    struct FixedSource(Result<String, String>);

    impl TextSource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        fn generate<'a>(
            &'a self,
            _system: &'a str,
            _prompt: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<String, CoreError>> + Send + 'a>> {
            let out = self.0.clone().map_err(CoreError::Source);
            Box::pin(async move { out })
        }
    }

    fn row(name: &str, text: &str) -> RawConcept {
        RawConcept {
            name: name.into(),
            category: format!("{name}-category"),
            description: format!("{name}-description"),
            raw_reference_text: text.into(),
        }
    }

    fn pipeline(mock: Arc<MockLookup>) -> (BatchPipeline, Arc<RecordingSleeper>) {
        let client = EnrichmentClient::with_backend(Config::default(), mock)
            .with_sleeper(Arc::new(RecordingSleeper::default()));
        let pacing = Arc::new(RecordingSleeper::default());
        let pipeline = BatchPipeline::new(Arc::new(KeyParser), Arc::new(client))
            .with_sleeper(pacing.clone());
        (pipeline, pacing)
    }

    #[tokio::test]
    async fn parse_fault_keeps_row_and_order() {
        let mock = Arc::new(MockLookup::new(MockResponse::found("text")));
        let (pipeline, _) = pipeline(mock);

        let rows = vec![
            row("a", "Verse: 2:255"),
            row("b", "PANIC please"),
            row("c", "Verse: 94:5"),
            row("d", "nothing here"),
        ];
        let report = pipeline.run(rows).await;

        let names: Vec<_> = report.records.iter().map(|r| r.concept.as_str()).collect();
        assert_eq!(names, ["a", "b", "c", "d"]);

        let faulted = &report.records[1];
        assert_eq!(faulted.category, "b-category");
        assert_eq!(faulted.description, "b-description");
        assert_eq!(faulted.verse_number, "");
        assert_eq!(faulted.canonical_text, "");

        assert_eq!(report.records[0].canonical_text, "text");
        assert_eq!(report.records[2].verse_number, "94:5");
        assert_eq!(report.summary.faults, 1);
        assert_eq!(report.summary.total_rows, 4);
        assert_eq!(report.summary.verse.missing, 2);
    }

    #[tokio::test]
    async fn enrichment_panic_is_isolated() {
        let mock = Arc::new(MockLookup::with_sequence(vec![
            MockResponse::found("first"),
            MockResponse::Panic,
            MockResponse::found("third"),
        ]));
        let (pipeline, _) = pipeline(mock);

        let report = pipeline
            .run(vec![
                row("a", "1:1"),
                row("b", "1:2"),
                row("c", "1:3"),
            ])
            .await;

        assert_eq!(report.records.len(), 3);
        assert_eq!(report.records[0].canonical_text, "first");
        assert_eq!(report.records[1].verse_number, "1:2");
        assert_eq!(report.records[1].canonical_text, "");
        assert_eq!(report.records[2].canonical_text, "third");
        assert_eq!(report.summary.faults, 1);
    }

    #[tokio::test]
    async fn pacing_only_after_network_rows() {
        let mock = Arc::new(MockLookup::new(MockResponse::found("text")));
        let (pipeline, pacing) = pipeline(mock.clone());

        let report = pipeline
            .run(vec![
                row("a", "2:255"),
                row("b", "again 2:255"),
                row("c", "no reference"),
                row("d", "94:5"),
            ])
            .await;

        // a hits the network; b is memoized, c unresolvable, d is last
        assert_eq!(pacing.waits(), vec![Duration::from_secs(1)]);
        assert_eq!(mock.call_count(), 2);
        assert_eq!(report.summary.cache_hits, 1);
    }

    #[tokio::test]
    async fn zero_pacing_never_waits() {
        let mock = Arc::new(MockLookup::new(MockResponse::found("text")));
        let (pipeline, pacing) = pipeline(mock);
        let pipeline = pipeline.with_pacing(Duration::ZERO);

        pipeline.run(vec![row("a", "1:1"), row("b", "1:2")]).await;
        assert!(pacing.waits().is_empty());
    }

    #[tokio::test]
    async fn cancelled_run_still_emits_every_row() {
        let mock = Arc::new(MockLookup::new(MockResponse::found("text")));
        let (pipeline, _) = pipeline(mock.clone());
        let cancel = CancellationToken::new();

        let cancel_after_first = cancel.clone();
        let events = Mutex::new(Vec::new());
        let report = pipeline
            .run_with_progress(
                vec![row("a", "1:1"), row("b", "1:2"), row("c", "1:3")],
                |event| {
                    if let ProgressEvent::RowComplete { index: 0, .. } = event {
                        cancel_after_first.cancel();
                    }
                    if let ProgressEvent::Cancelled { remaining } = event {
                        events.lock().unwrap().push(remaining);
                    }
                },
                cancel,
            )
            .await;

        assert_eq!(report.records.len(), 3);
        assert_eq!(report.records[0].canonical_text, "text");
        assert_eq!(report.records[1].verse_number, "1:2");
        assert_eq!(report.records[1].canonical_text, "");
        assert_eq!(mock.call_count(), 1);
        assert!(report.summary.cancelled);
        assert_eq!(report.summary.skipped, 2);
        assert_eq!(*events.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn transport_failure_reported_as_event() {
        let mock = Arc::new(MockLookup::new(MockResponse::transport("refused")));
        let (pipeline, _) = pipeline(mock);
        let failures = Mutex::new(Vec::new());

        let report = pipeline
            .run_with_progress(
                vec![row("a", "2:255")],
                |event| {
                    if let ProgressEvent::TransportFailure { key, attempts, .. } = event {
                        failures.lock().unwrap().push((key, attempts));
                    }
                },
                CancellationToken::new(),
            )
            .await;

        assert_eq!(*failures.lock().unwrap(), vec![("2:255".to_string(), 3)]);
        assert_eq!(report.summary.transport_failures, 1);
        assert_eq!(
            EnrichmentResult {
                canonical_text: report.records[0].canonical_text.clone(),
                audio_url: report.records[0].audio_url.clone(),
                tafsir_url: report.records[0].tafsir_url.clone(),
            },
            EnrichmentResult::default()
        );
    }

    #[tokio::test]
    async fn text_source_fills_empty_rows() {
        let mock = Arc::new(MockLookup::new(MockResponse::found("text")));
        let (pipeline, _) = pipeline(mock);
        let pipeline =
            pipeline.with_text_source(Arc::new(FixedSource(Ok("Verse: 13:28".into()))));

        let report = pipeline
            .run(vec![row("a", ""), row("b", "Verse: 2:255")])
            .await;

        assert_eq!(report.records[0].verse_number, "13:28");
        assert_eq!(report.records[1].verse_number, "2:255");
    }

    #[tokio::test]
    async fn text_source_failure_is_a_row_fault() {
        let mock = Arc::new(MockLookup::new(MockResponse::found("text")));
        let (pipeline, _) = pipeline(mock);
        let pipeline =
            pipeline.with_text_source(Arc::new(FixedSource(Err("quota exceeded".into()))));

        let report = pipeline.run(vec![row("a", "")]).await;

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].concept, "a");
        assert_eq!(report.summary.faults, 1);
    }

    #[tokio::test]
    async fn empty_input_is_empty_report() {
        let mock = Arc::new(MockLookup::new(MockResponse::NoMatch));
        let (pipeline, _) = pipeline(mock);
        let report = pipeline.run(Vec::new()).await;
        assert!(report.records.is_empty());
        assert_eq!(report.summary.total_rows, 0);
    }
}
