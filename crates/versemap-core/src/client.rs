//! Enrichment of parsed references against the verse lookup service.
//!
//! [`EnrichmentClient::resolve`] is fail-soft: whatever goes wrong, the caller
//! receives an [`EnrichmentResult`], all-empty when nothing could be resolved.
//! Transport failures are retried per the configured [`RetryPolicy`](crate::RetryPolicy);
//! a valid "no data" answer is terminal and never retried.

use std::future::Future;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use reqwest::header::{HeaderMap, HeaderValue};

use crate::chapters::ChapterIndex;
use crate::key::{KeySource, embedded_key, key_from_fields, leading_number};
use crate::lookup::{LookupBackend, LookupError, LookupOutcome, QuranComBackend};
use crate::retry::{Sleeper, TokioSleeper};
use crate::{Config, CoreError, EnrichmentResult, VerseKey, VerseReference};

/// How a resolution ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// The service returned canonical text.
    Resolved,
    /// The service answered but has no data for the key.
    NoMatch,
    /// No key could be derived; no lookup was made.
    #[default]
    Unresolvable,
    /// Every attempt failed at the transport level.
    TransportFailure { error: String },
    /// Enrichment was not attempted (run cancelled or row fault).
    Skipped,
}

impl ResolveOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ResolveOutcome::Resolved => "resolved",
            ResolveOutcome::NoMatch => "no match",
            ResolveOutcome::Unresolvable => "unresolvable",
            ResolveOutcome::TransportFailure { .. } => "transport failure",
            ResolveOutcome::Skipped => "skipped",
        }
    }
}

/// Full account of one resolution, for logging and summary statistics.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub result: EnrichmentResult,
    pub outcome: ResolveOutcome,
    pub key: Option<VerseKey>,
    pub key_source: Option<KeySource>,
    /// Verse lookup attempts made for this reference.
    pub attempts: u32,
    /// All requests sent, including chapter list fetches.
    pub network_calls: u32,
    /// Answered from the in-run memo.
    pub cached: bool,
}

impl Resolution {
    pub fn skipped() -> Self {
        Self {
            outcome: ResolveOutcome::Skipped,
            ..Self::default()
        }
    }

    pub fn performed_network(&self) -> bool {
        self.network_calls > 0
    }
}

/// Resolves [`VerseReference`]s to canonical text and media links.
///
/// One client is scoped to one pipeline run: terminal lookup answers and the
/// chapter list are memoized for its lifetime.
pub struct EnrichmentClient {
    backend: Arc<dyn LookupBackend>,
    http: reqwest::Client,
    config: Config,
    sleeper: Arc<dyn Sleeper>,
    memo: DashMap<VerseKey, LookupOutcome>,
    chapters: OnceLock<ChapterIndex>,
}

impl EnrichmentClient {
    /// Client against the configured quran.com endpoint.
    pub fn new(config: Config) -> Result<Self, CoreError> {
        let http = build_http_client(&config)?;
        let backend = Arc::new(QuranComBackend::new(
            config.api_base_url.clone(),
            config.audio_base_url.clone(),
        ));
        Ok(Self::with_backend(config, backend).with_http(http))
    }

    /// Client against an arbitrary backend.
    pub fn with_backend(config: Config, backend: Arc<dyn LookupBackend>) -> Self {
        Self {
            backend,
            http: reqwest::Client::new(),
            config,
            sleeper: Arc::new(TokioSleeper),
            memo: DashMap::new(),
            chapters: OnceLock::new(),
        }
    }

    pub fn with_http(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Replace the delay used between retry attempts.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Commentary link for a key. Pure; never touches the network.
    pub fn tafsir_url(&self, key: VerseKey) -> String {
        format!(
            "{}/{}/{}/tafsirs/{}",
            self.config.tafsir_base_url.trim_end_matches('/'),
            key.chapter,
            key.verse,
            self.config.tafsir_slug
        )
    }

    /// Resolve a reference, returning only the enrichment.
    pub async fn resolve(&self, reference: &VerseReference) -> EnrichmentResult {
        self.resolve_detailed(reference).await.result
    }

    /// Resolve a reference, reporting how the result was obtained.
    pub async fn resolve_detailed(&self, reference: &VerseReference) -> Resolution {
        let mut network_calls = 0;
        let Some((key, key_source)) = self.derive_key(reference, &mut network_calls).await else {
            tracing::debug!(
                chapter = %reference.chapter_id,
                verse = %reference.verse_number,
                "no verse key derivable, skipping lookup"
            );
            return Resolution {
                network_calls,
                ..Resolution::default()
            };
        };

        let mut resolution = Resolution {
            key: Some(key),
            key_source: Some(key_source),
            network_calls,
            ..Resolution::default()
        };

        if let Some(hit) = self.memo.get(&key).map(|e| e.value().clone()) {
            tracing::trace!(key = %key, "lookup memo hit");
            resolution.cached = true;
            resolution.outcome = outcome_of(&hit);
            resolution.result = self.enrichment_from(key, &hit);
            return resolution;
        }

        let timeout = self.config.request_timeout();
        let (result, attempts) = self
            .with_retry("verse", || self.backend.lookup(key, &self.http, timeout))
            .await;
        resolution.attempts = attempts;
        resolution.network_calls += attempts;

        match result {
            Ok(outcome) => {
                tracing::debug!(key = %key, attempts, found = matches!(outcome, LookupOutcome::Found(_)), "lookup complete");
                resolution.outcome = outcome_of(&outcome);
                resolution.result = self.enrichment_from(key, &outcome);
                self.memo.insert(key, outcome);
            }
            Err(e) => {
                tracing::warn!(key = %key, attempts, error = %e, "lookup failed after retries");
                resolution.outcome = ResolveOutcome::TransportFailure {
                    error: e.to_string(),
                };
            }
        }
        resolution
    }

    fn enrichment_from(&self, key: VerseKey, outcome: &LookupOutcome) -> EnrichmentResult {
        match outcome {
            LookupOutcome::Found(record) => EnrichmentResult {
                canonical_text: record.text.clone(),
                audio_url: record.audio_url.clone().unwrap_or_default(),
                tafsir_url: self.tafsir_url(key),
            },
            LookupOutcome::NoMatch => EnrichmentResult::default(),
        }
    }

    /// Derive a key from the reference, in order: verse field `c:v`, numeric
    /// fields, named chapter via the chapter list, embedded `c:v` anywhere.
    async fn derive_key(
        &self,
        reference: &VerseReference,
        network_calls: &mut u32,
    ) -> Option<(VerseKey, KeySource)> {
        if let Some(found) = key_from_fields(reference) {
            return Some(found);
        }

        let chapter = reference.chapter_id.trim();
        if self.config.resolve_chapter_names
            && !chapter.is_empty()
            && let Some(verse) = leading_number(&reference.verse_number)
            && let Some(index) = self.chapter_index(network_calls).await
        {
            match index.find(chapter).and_then(|id| VerseKey::new(id, verse)) {
                Some(key) => return Some((key, KeySource::ChapterName)),
                None => tracing::debug!(chapter, "chapter name not recognised"),
            }
        }

        embedded_key(reference).map(|key| (key, KeySource::Embedded))
    }

    /// The chapter list, fetched on first use. Failures are not memoized so a
    /// later row may try again.
    async fn chapter_index(&self, network_calls: &mut u32) -> Option<&ChapterIndex> {
        if let Some(index) = self.chapters.get() {
            return Some(index);
        }

        let timeout = self.config.request_timeout();
        let (result, attempts) = self
            .with_retry("chapters", || self.backend.chapters(&self.http, timeout))
            .await;
        *network_calls += attempts;

        match result {
            Ok(list) => {
                let index = ChapterIndex::new(list);
                if index.is_empty() {
                    tracing::warn!("chapter list is empty, skipping name resolution");
                    return None;
                }
                tracing::debug!(chapters = index.len(), "loaded chapter list");
                let _ = self.chapters.set(index);
                self.chapters.get()
            }
            Err(e) => {
                tracing::warn!(attempts, error = %e, "chapter list unavailable, skipping name resolution");
                None
            }
        }
    }

    /// Run `op` until it succeeds or the retry budget is spent.
    /// Returns the last result and the number of attempts made.
    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> (Result<T, LookupError>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LookupError>>,
    {
        let policy = self.config.retry;
        let max = policy.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if attempt < max => {
                    let wait = policy.delay_before(e.retry_after(), self.config.request_timeout());
                    tracing::debug!(
                        what,
                        attempt,
                        max,
                        error = %e,
                        wait_ms = wait.as_millis() as u64,
                        "request failed, retrying"
                    );
                    self.sleeper.sleep(wait).await;
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }
}

fn outcome_of(outcome: &LookupOutcome) -> ResolveOutcome {
    match outcome {
        LookupOutcome::Found(_) => ResolveOutcome::Resolved,
        LookupOutcome::NoMatch => ResolveOutcome::NoMatch,
    }
}

/// Build the HTTP client, attaching optional credentials as default headers.
fn build_http_client(config: &Config) -> Result<reqwest::Client, CoreError> {
    let mut headers = HeaderMap::new();
    if let Some(token) = &config.api_token {
        let mut value = HeaderValue::from_str(token)
            .map_err(|e| CoreError::Config(format!("invalid API token: {}", e)))?;
        value.set_sensitive(true);
        headers.insert("x-auth-token", value);
    }
    if let Some(id) = &config.client_id {
        let value = HeaderValue::from_str(id)
            .map_err(|e| CoreError::Config(format!("invalid client id: {}", e)))?;
        headers.insert("x-client-id", value);
    }

    Ok(reqwest::Client::builder()
        .user_agent(concat!("versemap/", env!("CARGO_PKG_VERSION")))
        .default_headers(headers)
        .build()?)
}
