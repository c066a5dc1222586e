//! Mock lookup backend for testing.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{LookupBackend, LookupError, LookupOutcome, VerseRecord};
use crate::VerseKey;
use crate::chapters::Chapter;

/// A configurable mock response for [`MockLookup`].
#[derive(Clone, Debug)]
pub enum MockResponse {
    Found {
        text: String,
        audio_url: Option<String>,
    },
    NoMatch,
    Fail(LookupError),
    /// Panic inside the lookup future.
    Panic,
}

impl MockResponse {
    pub fn found(text: &str) -> Self {
        MockResponse::Found {
            text: text.into(),
            audio_url: Some(format!("https://audio.test/{}.mp3", text.len())),
        }
    }

    pub fn transport(msg: &str) -> Self {
        MockResponse::Fail(LookupError::Transport(msg.into()))
    }
}

/// A hand-rolled mock implementing [`LookupBackend`].
///
/// Returns scripted responses in order, repeating the last one once the
/// script is exhausted, and records every key it was asked for.
pub struct MockLookup {
    responses: Mutex<Vec<MockResponse>>,
    fallback: MockResponse,
    chapters: Result<Vec<Chapter>, LookupError>,
    keys: Mutex<Vec<VerseKey>>,
    call_count: AtomicUsize,
    chapter_calls: AtomicUsize,
}

impl MockLookup {
    /// Always answer with `response`.
    pub fn new(response: MockResponse) -> Self {
        Self::with_sequence(vec![response])
    }

    /// Answer with `responses` in order, repeating the last.
    pub fn with_sequence(mut responses: Vec<MockResponse>) -> Self {
        assert!(
            !responses.is_empty(),
            "sequence must have at least one response"
        );
        responses.reverse();
        let fallback = responses.first().cloned().unwrap();
        Self {
            responses: Mutex::new(responses),
            fallback,
            chapters: Ok(Vec::new()),
            keys: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
            chapter_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_chapters(mut self, chapters: Result<Vec<Chapter>, LookupError>) -> Self {
        self.chapters = chapters;
        self
    }

    /// How many times `lookup()` has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn chapter_calls(&self) -> usize {
        self.chapter_calls.load(Ordering::SeqCst)
    }

    pub fn keys(&self) -> Vec<VerseKey> {
        self.keys.lock().unwrap().clone()
    }

    fn next_response(&self) -> MockResponse {
        self.responses
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl LookupBackend for MockLookup {
    fn name(&self) -> &str {
        "mock"
    }

    fn lookup<'a>(
        &'a self,
        key: VerseKey,
        _client: &'a reqwest::Client,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<LookupOutcome, LookupError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.keys.lock().unwrap().push(key);
        let response = self.next_response();

        Box::pin(async move {
            match response {
                MockResponse::Found { text, audio_url } => {
                    Ok(LookupOutcome::Found(VerseRecord { text, audio_url }))
                }
                MockResponse::NoMatch => Ok(LookupOutcome::NoMatch),
                MockResponse::Fail(err) => Err(err),
                MockResponse::Panic => panic!("mock lookup panicked for {}", key),
            }
        })
    }

    fn chapters<'a>(
        &'a self,
        _client: &'a reqwest::Client,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Chapter>, LookupError>> + Send + 'a>> {
        self.chapter_calls.fetch_add(1, Ordering::SeqCst);
        let chapters = self.chapters.clone();
        Box::pin(async move { chapters })
    }
}
