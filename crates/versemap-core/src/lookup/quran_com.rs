use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use super::{LookupBackend, LookupError, LookupOutcome, VerseRecord, check_response};
use crate::VerseKey;
use crate::chapters::Chapter;

/// Backend for the quran.com v4 REST API.
pub struct QuranComBackend {
    /// API root, e.g. `https://api.quran.com/api/v4`.
    pub base_url: String,
    /// Prefix for the relative audio paths the API returns.
    pub audio_base_url: String,
}

impl QuranComBackend {
    pub fn new(base_url: impl Into<String>, audio_base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            audio_base_url: audio_base_url.into(),
        }
    }

    fn verse_url(&self, key: VerseKey) -> String {
        format!(
            "{}/verses/by_key/{}?language=en&words=false&fields=text_uthmani&audio=1",
            self.base_url, key
        )
    }

    fn chapters_url(&self) -> String {
        format!("{}/chapters?language=en", self.base_url)
    }
}

impl LookupBackend for QuranComBackend {
    fn name(&self) -> &str {
        "quran.com"
    }

    fn lookup<'a>(
        &'a self,
        key: VerseKey,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<LookupOutcome, LookupError>> + Send + 'a>> {
        Box::pin(async move {
            let resp = client
                .get(self.verse_url(key))
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| LookupError::Transport(e.to_string()))?;

            if resp.status().as_u16() == 404 {
                return Ok(LookupOutcome::NoMatch);
            }
            check_response(&resp)?;

            let data: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| LookupError::Decode(e.to_string()))?;
            Ok(parse_verse_payload(&data, &self.audio_base_url))
        })
    }

    fn chapters<'a>(
        &'a self,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Chapter>, LookupError>> + Send + 'a>> {
        Box::pin(async move {
            let resp = client
                .get(self.chapters_url())
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| LookupError::Transport(e.to_string()))?;
            check_response(&resp)?;

            let data: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| LookupError::Decode(e.to_string()))?;
            parse_chapters_payload(&data)
        })
    }
}

/// Interpret a `/verses/by_key` response body.
///
/// A missing, null or empty `verse` object, or one without text, is a
/// no-match rather than an error.
pub fn parse_verse_payload(data: &serde_json::Value, audio_base_url: &str) -> LookupOutcome {
    let verse = &data["verse"];
    let text = verse["text_uthmani"]
        .as_str()
        .map(str::trim)
        .unwrap_or("");
    if text.is_empty() {
        return LookupOutcome::NoMatch;
    }

    let audio_url = verse["audio"]["url"]
        .as_str()
        .filter(|u| !u.trim().is_empty())
        .map(|u| absolute_audio_url(u.trim(), audio_base_url));

    LookupOutcome::Found(VerseRecord {
        text: text.to_string(),
        audio_url,
    })
}

fn absolute_audio_url(path: &str, base: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else if let Some(rest) = path.strip_prefix("//") {
        format!("https://{}", rest)
    } else {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Interpret a `/chapters` response body.
pub fn parse_chapters_payload(data: &serde_json::Value) -> Result<Vec<Chapter>, LookupError> {
    let items = data["chapters"]
        .as_array()
        .ok_or_else(|| LookupError::Decode("missing chapters array".into()))?;

    Ok(items
        .iter()
        .filter_map(|item| {
            let id = u16::try_from(item["id"].as_u64()?).ok()?;
            Some(Chapter {
                id,
                name_simple: item["name_simple"].as_str().unwrap_or("").to_string(),
                name_complex: item["name_complex"].as_str().unwrap_or("").to_string(),
                translated_name: item["translated_name"]["name"]
                    .as_str()
                    .unwrap_or("")
                    .to_string(),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const AUDIO_BASE: &str = "https://verses.quran.com/";

    #[test]
    fn verse_url_shape() {
        let backend = QuranComBackend::new("https://api.quran.com/api/v4/", AUDIO_BASE);
        let url = backend.verse_url(VerseKey::new(2, 255).unwrap());
        assert!(url.starts_with("https://api.quran.com/api/v4/verses/by_key/2:255?"));
        assert!(url.contains("fields=text_uthmani"));
        assert!(url.contains("audio=1"));
    }

    #[test]
    fn found_with_relative_audio() {
        let data = json!({
            "verse": {
                "verse_key": "2:255",
                "text_uthmani": "ٱللَّهُ لَآ إِلَـٰهَ إِلَّا هُوَ",
                "audio": { "url": "AbdulBaset/Mujawwad/mp3/002255.mp3" }
            }
        });
        match parse_verse_payload(&data, AUDIO_BASE) {
            LookupOutcome::Found(record) => {
                assert!(record.text.starts_with("ٱللَّهُ"));
                assert_eq!(
                    record.audio_url.as_deref(),
                    Some("https://verses.quran.com/AbdulBaset/Mujawwad/mp3/002255.mp3")
                );
            }
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[test]
    fn found_without_audio() {
        let data = json!({ "verse": { "text_uthmani": "text", "audio": null } });
        match parse_verse_payload(&data, AUDIO_BASE) {
            LookupOutcome::Found(record) => assert!(record.audio_url.is_none()),
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[test]
    fn protocol_relative_and_absolute_audio() {
        assert_eq!(
            absolute_audio_url("//mirrors.quranicaudio.com/a.mp3", AUDIO_BASE),
            "https://mirrors.quranicaudio.com/a.mp3"
        );
        assert_eq!(
            absolute_audio_url("https://cdn.example/a.mp3", AUDIO_BASE),
            "https://cdn.example/a.mp3"
        );
    }

    #[test]
    fn empty_verse_is_no_match() {
        assert_eq!(
            parse_verse_payload(&json!({ "verse": {} }), AUDIO_BASE),
            LookupOutcome::NoMatch
        );
        assert_eq!(
            parse_verse_payload(&json!({}), AUDIO_BASE),
            LookupOutcome::NoMatch
        );
    }

    #[test]
    fn chapters_payload() {
        let data = json!({
            "chapters": [
                { "id": 1, "name_simple": "Al-Fatihah", "name_complex": "Al-Fātiĥah",
                  "translated_name": { "name": "The Opener" } },
                { "id": 2, "name_simple": "Al-Baqarah", "name_complex": "Al-Baqarah",
                  "translated_name": { "name": "The Cow" } }
            ]
        });
        let chapters = parse_chapters_payload(&data).unwrap();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[1].id, 2);
        assert_eq!(chapters[1].translated_name, "The Cow");
    }

    #[test]
    fn chapters_payload_missing_array() {
        assert!(matches!(
            parse_chapters_payload(&json!({ "error": "x" })),
            Err(LookupError::Decode(_))
        ));
    }
}
