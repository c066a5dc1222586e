//! Lookup backend trait and implementations for the verse reference service.

#[cfg(test)]
pub(crate) mod mock;
pub mod quran_com;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

use crate::VerseKey;
use crate::chapters::Chapter;

pub use quran_com::QuranComBackend;

/// Canonical data returned for one verse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerseRecord {
    pub text: String,
    /// Absolute audio URL, if the service offered one.
    pub audio_url: Option<String>,
}

/// A well-formed answer from the lookup service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Found(VerseRecord),
    /// Valid response, but the service has no data for this key. Terminal.
    NoMatch,
}

/// Transport-level failure talking to the lookup service. Always retryable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("HTTP {status}")]
    Http { status: u16 },
    #[error("rate limited (429){}", retry_after_suffix(.retry_after))]
    RateLimited { retry_after: Option<Duration> },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Decode(String),
}

impl LookupError {
    /// Server-suggested wait before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LookupError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

fn retry_after_suffix(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(", retry after {:.1}s", d.as_secs_f64()))
        .unwrap_or_default()
}

/// A verse lookup service.
pub trait LookupBackend: Send + Sync {
    /// Short name used in logs (e.g., "quran.com").
    fn name(&self) -> &str;

    /// Fetch canonical text and audio for one key.
    fn lookup<'a>(
        &'a self,
        key: VerseKey,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<LookupOutcome, LookupError>> + Send + 'a>>;

    /// Fetch the chapter list used to resolve chapter names to numbers.
    fn chapters<'a>(
        &'a self,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Chapter>, LookupError>> + Send + 'a>>;
}

/// Map a non-success HTTP response to a [`LookupError`].
///
/// 404 is not handled here; callers treat it as [`LookupOutcome::NoMatch`].
pub fn check_response(resp: &reqwest::Response) -> Result<(), LookupError> {
    let status = resp.status();
    if status.as_u16() == 429 {
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        return Err(LookupError::RateLimited { retry_after });
    }
    if !status.is_success() {
        return Err(LookupError::Http {
            status: status.as_u16(),
        });
    }
    Ok(())
}

/// Wait requested by a `Retry-After` header, in delta-seconds.
///
/// Fractional values are accepted. The HTTP-date form yields `None`, so the
/// retry falls back to the configured delay.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_in_seconds() {
        assert_eq!(parse_retry_after("5"), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after(" 1.5 "), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn retry_after_date_or_garbage_uses_configured_delay() {
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(parse_retry_after("-3"), None);
        assert_eq!(parse_retry_after("inf"), None);
    }

    #[test]
    fn ok_on_200() {
        let http_resp = http::Response::builder().status(200).body("").unwrap();
        let resp = reqwest::Response::from(http_resp);
        assert!(check_response(&resp).is_ok());
    }

    #[test]
    fn server_error_is_http() {
        let http_resp = http::Response::builder().status(503).body("").unwrap();
        let resp = reqwest::Response::from(http_resp);
        assert_eq!(
            check_response(&resp).unwrap_err(),
            LookupError::Http { status: 503 }
        );
    }

    #[test]
    fn rate_limited_with_header() {
        let http_resp = http::Response::builder()
            .status(429)
            .header("retry-after", "10")
            .body("")
            .unwrap();
        let resp = reqwest::Response::from(http_resp);
        let err = check_response(&resp).unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn error_display() {
        assert_eq!(LookupError::Http { status: 500 }.to_string(), "HTTP 500");
        assert_eq!(
            LookupError::RateLimited { retry_after: None }.to_string(),
            "rate limited (429)"
        );
    }
}
