use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub mod chapters;
pub mod client;
pub mod config_file;
pub mod key;
pub mod lookup;
pub mod pipeline;
pub mod retry;
pub mod source;
pub mod summary;

// Re-export for convenience
pub use client::{EnrichmentClient, Resolution, ResolveOutcome};
pub use key::VerseKey;
pub use lookup::{LookupBackend, LookupError, LookupOutcome, VerseRecord};
pub use pipeline::{BatchPipeline, BatchReport, ParsedBlock, ReferenceParser};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use source::{TextSource, build_prompt};
pub use summary::{FieldCounts, RunSummary};

/// One upstream concept entry together with the free text generated for it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawConcept {
    #[serde(rename = "Concept", deserialize_with = "string_or_empty")]
    pub name: String,
    #[serde(rename = "Category", default, deserialize_with = "string_or_empty")]
    pub category: String,
    #[serde(rename = "Description", default, deserialize_with = "string_or_empty")]
    pub description: String,
    #[serde(
        rename = "Matching_Verse",
        alias = "raw_reference_text",
        default,
        deserialize_with = "string_or_empty"
    )]
    pub raw_reference_text: String,
}

/// A structured verse reference recovered from a text block.
///
/// Every field defaults to the empty string; a missing field is a normal
/// outcome, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerseReference {
    pub chapter_id: String,
    pub verse_number: String,
    pub translation_text: String,
    pub relation_text: String,
}

impl VerseReference {
    pub fn is_empty(&self) -> bool {
        self.chapter_id.is_empty()
            && self.verse_number.is_empty()
            && self.translation_text.is_empty()
            && self.relation_text.is_empty()
    }
}

/// Canonical text and media links for a resolved reference.
///
/// All-empty means "no data", whatever the cause.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub canonical_text: String,
    pub audio_url: String,
    pub tafsir_url: String,
}

impl EnrichmentResult {
    pub fn is_empty(&self) -> bool {
        self.canonical_text.is_empty() && self.audio_url.is_empty() && self.tafsir_url.is_empty()
    }
}

/// The unit stored in the output dataset: concept fields, parsed reference
/// and enrichment, flattened into the persisted column layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    #[serde(rename = "Concept")]
    pub concept: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Surah")]
    pub chapter_id: String,
    #[serde(rename = "Verse")]
    pub verse_number: String,
    #[serde(rename = "Translation")]
    pub translation_text: String,
    #[serde(rename = "Relation")]
    pub relation_text: String,
    #[serde(rename = "CanonicalText")]
    pub canonical_text: String,
    #[serde(rename = "AudioUrl")]
    pub audio_url: String,
    #[serde(rename = "TafsirUrl")]
    pub tafsir_url: String,
}

impl EnrichedRecord {
    /// Column names in persisted order.
    pub const COLUMNS: [&'static str; 10] = [
        "Concept",
        "Category",
        "Description",
        "Surah",
        "Verse",
        "Translation",
        "Relation",
        "CanonicalText",
        "AudioUrl",
        "TafsirUrl",
    ];

    pub fn new(
        concept: &RawConcept,
        reference: VerseReference,
        enrichment: EnrichmentResult,
    ) -> Self {
        Self {
            concept: concept.name.clone(),
            category: concept.category.clone(),
            description: concept.description.clone(),
            chapter_id: reference.chapter_id,
            verse_number: reference.verse_number,
            translation_text: reference.translation_text,
            relation_text: reference.relation_text,
            canonical_text: enrichment.canonical_text,
            audio_url: enrichment.audio_url,
            tafsir_url: enrichment.tafsir_url,
        }
    }

    /// Field values in [`COLUMNS`](Self::COLUMNS) order.
    pub fn values(&self) -> [&str; 10] {
        [
            &self.concept,
            &self.category,
            &self.description,
            &self.chapter_id,
            &self.verse_number,
            &self.translation_text,
            &self.relation_text,
            &self.canonical_text,
            &self.audio_url,
            &self.tafsir_url,
        ]
    }
}

/// Accept strings, numbers, booleans and null for a text column.
/// Upstream tables store blank cells as null and verse numbers as integers.
fn string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("text source error: {0}")]
    Source(String),
}

/// Which stage of row processing a fault was caught in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultStage {
    Generate,
    Parse,
    Enrich,
}

impl fmt::Display for FaultStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultStage::Generate => write!(f, "generate"),
            FaultStage::Parse => write!(f, "parse"),
            FaultStage::Enrich => write!(f, "enrich"),
        }
    }
}

/// Progress events emitted during a batch run.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    RowStarted {
        index: usize,
        total: usize,
        concept: String,
    },
    RowComplete {
        index: usize,
        total: usize,
        record: Box<EnrichedRecord>,
        strategy: Option<&'static str>,
        outcome: ResolveOutcome,
    },
    RowFault {
        index: usize,
        total: usize,
        concept: String,
        stage: FaultStage,
        message: String,
    },
    TransportFailure {
        index: usize,
        key: String,
        attempts: u32,
        error: String,
    },
    Pacing {
        wait: Duration,
    },
    Cancelled {
        remaining: usize,
    },
}

/// Configuration for one pipeline run.
#[derive(Clone)]
pub struct Config {
    /// Base URL of the verse lookup API (no trailing slash).
    pub api_base_url: String,
    /// Prefix joined onto relative audio paths returned by the API.
    pub audio_base_url: String,
    pub tafsir_base_url: String,
    pub tafsir_slug: String,
    pub api_token: Option<String>,
    pub client_id: Option<String>,
    pub request_timeout_secs: u64,
    pub retry: RetryPolicy,
    /// Fixed wait between rows that touched the network.
    pub pacing_delay_ms: u64,
    /// Resolve named chapters ("Al-Baqarah") through the chapter list endpoint.
    pub resolve_chapter_names: bool,
    pub checkpoint_every: Option<usize>,
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }

    /// Apply values from an on-disk config over `self`.
    pub fn with_file(mut self, file: &config_file::ConfigFile) -> Self {
        if let Some(api) = &file.api {
            if let Some(url) = &api.base_url {
                self.api_base_url = url.trim_end_matches('/').to_string();
            }
            if let Some(url) = &api.audio_base_url {
                self.audio_base_url = url.clone();
            }
            if let Some(token) = &api.token {
                self.api_token = Some(token.clone());
            }
            if let Some(id) = &api.client_id {
                self.client_id = Some(id.clone());
            }
            if let Some(secs) = api.timeout_secs {
                self.request_timeout_secs = secs;
            }
        }
        if let Some(retry) = &file.retry {
            if let Some(n) = retry.max_attempts {
                self.retry.max_attempts = n;
            }
            if let Some(ms) = retry.delay_ms {
                self.retry.delay = Duration::from_millis(ms);
            }
        }
        if let Some(pipeline) = &file.pipeline {
            if let Some(ms) = pipeline.pacing_delay_ms {
                self.pacing_delay_ms = ms;
            }
            if let Some(flag) = pipeline.resolve_chapter_names {
                self.resolve_chapter_names = flag;
            }
            if let Some(n) = pipeline.checkpoint_every {
                self.checkpoint_every = Some(n);
            }
        }
        if let Some(output) = &file.output {
            if let Some(url) = &output.tafsir_base_url {
                self.tafsir_base_url = url.trim_end_matches('/').to_string();
            }
            if let Some(slug) = &output.tafsir_slug {
                self.tafsir_slug = slug.clone();
            }
        }
        self
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_base_url", &self.api_base_url)
            .field("audio_base_url", &self.audio_base_url)
            .field("tafsir_base_url", &self.tafsir_base_url)
            .field("tafsir_slug", &self.tafsir_slug)
            .field("api_token", &self.api_token.as_ref().map(|_| "***"))
            .field("client_id", &self.client_id.as_ref().map(|_| "***"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("retry", &self.retry)
            .field("pacing_delay_ms", &self.pacing_delay_ms)
            .field("resolve_chapter_names", &self.resolve_chapter_names)
            .field("checkpoint_every", &self.checkpoint_every)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.quran.com/api/v4".into(),
            audio_base_url: "https://verses.quran.com/".into(),
            tafsir_base_url: "https://quran.com".into(),
            tafsir_slug: "en-tafsir-ibn-kathir".into(),
            api_token: None,
            client_id: None,
            request_timeout_secs: 10,
            retry: RetryPolicy::default(),
            pacing_delay_ms: 1000,
            resolve_chapter_names: true,
            checkpoint_every: None,
        }
    }
}
