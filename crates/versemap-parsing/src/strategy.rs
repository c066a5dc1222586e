//! The extraction strategies tried, in order, by [`TextBlockParser`](crate::TextBlockParser).
//!
//! Each strategy returns raw, uncleaned field values; cleaning and
//! normalization happen once in the parser after a strategy wins.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use versemap_core::VerseReference;

use crate::literal::parse_literal;

/// One way of reading a text block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseStrategy {
    /// The block is a serialized mapping (JSON or scripting-language literal).
    StructuredLiteral,
    /// Line-anchored `Surah:` / `Verse:` / `Translation:` / `Relation to concept:` labels.
    LabeledFields,
    /// Generic `Key: value` lines with wrapped continuations.
    KeyValue,
}

impl ParseStrategy {
    /// Default priority order.
    pub const ALL: [ParseStrategy; 3] = [
        ParseStrategy::StructuredLiteral,
        ParseStrategy::LabeledFields,
        ParseStrategy::KeyValue,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ParseStrategy::StructuredLiteral => "structured-literal",
            ParseStrategy::LabeledFields => "labeled-fields",
            ParseStrategy::KeyValue => "key-value",
        }
    }

    /// Run this strategy. `None` means it did not recognize the block.
    pub fn apply(&self, text: &str) -> Option<VerseReference> {
        match self {
            ParseStrategy::StructuredLiteral => structured_literal(text),
            ParseStrategy::LabeledFields => labeled_fields(text),
            ParseStrategy::KeyValue => key_value_lines(text),
        }
    }
}

/// Which reference field a key or label names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Chapter,
    Verse,
    Translation,
    Relation,
}

/// Map a free-form key to a field. Keys are compared after folding to
/// lowercase alphanumerics, so `Surah/Chapter`, `surah_chapter` and
/// `SURAH CHAPTER` are the same key.
fn field_for_key(key: &str) -> Option<Field> {
    let folded: String = key
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();
    match folded.as_str() {
        "surah" | "sura" | "surat" | "chapter" | "surahchapter" | "chaptersurah" | "surahname"
        | "chaptername" | "chapterid" | "surahnumber" | "chapternumber" => Some(Field::Chapter),
        "verse" | "verses" | "ayah" | "aya" | "ayat" | "versenumber" | "ayahnumber" | "versekey"
        | "reference" => Some(Field::Verse),
        "translation" | "englishtranslation" | "translationtext" | "versetext" | "text" => {
            Some(Field::Translation)
        }
        "relation" | "relationtoconcept" | "relationtotheconcept" | "relationtext"
        | "explanation" | "connection" | "relevance" => Some(Field::Relation),
        _ => None,
    }
}

fn set_once(reference: &mut VerseReference, field: Field, value: String) {
    let slot = match field {
        Field::Chapter => &mut reference.chapter_id,
        Field::Verse => &mut reference.verse_number,
        Field::Translation => &mut reference.translation_text,
        Field::Relation => &mut reference.relation_text,
    };
    if slot.is_empty() {
        *slot = value;
    }
}

// ---------------------------------------------------------------------------
// Structured literal
// ---------------------------------------------------------------------------

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*\n?(.*?)\n?\s*```$").unwrap());

fn structured_literal(text: &str) -> Option<VerseReference> {
    let text = text.trim();
    let body = FENCE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map_or(text, |m| m.as_str().trim());

    let map = parse_mapping(body).or_else(|| {
        // A mapping embedded in surrounding prose.
        let start = body.find('{')?;
        let end = body.rfind('}')?;
        (start < end)
            .then(|| parse_mapping(&body[start..=end]))
            .flatten()
    })?;

    Some(reference_from_map(&map))
}

fn parse_mapping(body: &str) -> Option<Map<String, Value>> {
    let value = serde_json::from_str::<Value>(body)
        .ok()
        .or_else(|| parse_literal(body).ok())?;
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn reference_from_map(map: &Map<String, Value>) -> VerseReference {
    let mut reference = VerseReference::default();
    let mut recognized = false;
    for (key, value) in map {
        if let Some(field) = field_for_key(key) {
            recognized = true;
            set_once(&mut reference, field, value_text(value));
        }
    }

    // Batch answers wrap each reference under its concept name.
    if !recognized
        && map.len() == 1
        && let Some(Value::Object(inner)) = map.values().next()
    {
        return reference_from_map(inner);
    }
    reference
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Labeled fields
// ---------------------------------------------------------------------------

/// A label at the start of a line (or after a comma/semicolon on the same
/// line), allowing list markers, markdown emphasis and quotes around it.
static LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?im)(?:^|[,;])[ \t]*(?:[-*•>#]+[ \t]*)?\**["']?(surah(?:\s*/\s*chapter)?|verse|translation|relation(?:\s+to\s+(?:the\s+)?concept)?)["']?\**[ \t]*:[ \t]*\**"#,
    )
    .unwrap()
});

fn labeled_fields(text: &str) -> Option<VerseReference> {
    let labels: Vec<_> = LABEL_RE.captures_iter(text).collect();
    if labels.is_empty() {
        return None;
    }

    let mut reference = VerseReference::default();
    for (i, caps) in labels.iter().enumerate() {
        let (Some(whole), Some(label)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = labels
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(text.len(), |m| m.start());
        let value = text[whole.end()..end]
            .trim()
            .trim_end_matches([',', ';', '*'])
            .trim();
        if let Some(field) = field_for_key(label.as_str()) {
            set_once(&mut reference, field, value.to_string());
        }
    }
    Some(reference)
}

// ---------------------------------------------------------------------------
// Key: value lines
// ---------------------------------------------------------------------------

/// Left-hand sides longer than this are prose, not keys.
const MAX_KEY_LEN: usize = 40;

fn key_value_lines(text: &str) -> Option<VerseReference> {
    let mut entries: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match split_key(line) {
            Some((key, value)) => entries.push((key.to_string(), value.to_string())),
            None => {
                if let Some((_, value)) = entries.last_mut() {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(line);
                }
            }
        }
    }

    let mut reference = VerseReference::default();
    let mut found = false;
    for (key, value) in entries {
        if let Some(field) = field_for_key(&key) {
            found = true;
            set_once(&mut reference, field, value);
        }
    }
    found.then_some(reference)
}

/// Split at the first `:` when the left side looks like a key. A colon between
/// two digits is a chapter:verse pair inside running text, not a separator.
fn split_key(line: &str) -> Option<(&str, &str)> {
    let idx = line.find(':')?;
    let (left, right) = (&line[..idx], &line[idx + 1..]);
    let digit_pair = left.ends_with(|c: char| c.is_ascii_digit())
        && right.starts_with(|c: char| c.is_ascii_digit());
    let key = left.trim().trim_start_matches(['-', '*', '•']).trim();
    if digit_pair || key.is_empty() || key.len() > MAX_KEY_LEN {
        return None;
    }
    Some((key.trim_matches(['"', '\'', '*']), right.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_keys_fold() {
        assert_eq!(field_for_key("Surah/Chapter"), Some(Field::Chapter));
        assert_eq!(field_for_key("relation_to_concept"), Some(Field::Relation));
        assert_eq!(field_for_key("AYAH"), Some(Field::Verse));
        assert_eq!(field_for_key("Concept"), None);
    }

    #[test]
    fn structured_json() {
        let r = structured_literal(r#"{"Surah":"Al-Baqarah","Verse":"2:255","Translation":"t","Relation":"r"}"#)
            .unwrap();
        assert_eq!(r.chapter_id, "Al-Baqarah");
        assert_eq!(r.verse_number, "2:255");
        assert_eq!(r.translation_text, "t");
        assert_eq!(r.relation_text, "r");
    }

    #[test]
    fn structured_missing_keys_are_empty() {
        let r = structured_literal("{'Verse': 255, 'Surah/Chapter': 2}").unwrap();
        assert_eq!(r.chapter_id, "2");
        assert_eq!(r.verse_number, "255");
        assert_eq!(r.translation_text, "");
    }

    #[test]
    fn structured_in_code_fence() {
        let text = "```json\n{\"Surah\": \"Ar-Ra'd\", \"Verse\": \"13:28\"}\n```";
        assert_eq!(structured_literal(text).unwrap().verse_number, "13:28");
    }

    #[test]
    fn structured_embedded_in_prose() {
        let text = "Here is the verse: {'Surah': 'Ash-Sharh', 'Verse': '94:5'} Hope it helps.";
        assert_eq!(structured_literal(text).unwrap().chapter_id, "Ash-Sharh");
    }

    #[test]
    fn structured_batch_wrapper() {
        let text = r#"{"Resilience": {"Surah": "Ash-Sharh", "Verse": "94:5"}}"#;
        assert_eq!(structured_literal(text).unwrap().verse_number, "94:5");
    }

    #[test]
    fn structured_rejects_non_mapping() {
        assert!(structured_literal("Surah: Al-Baqarah").is_none());
        assert!(structured_literal("[1, 2]").is_none());
        assert!(structured_literal("").is_none());
    }

    #[test]
    fn labeled_multiline_values() {
        let text = "Surah: Al-Baqarah\nVerse: [2:255]\nTranslation: \"Allah - there is no deity\nexcept Him\"\nRelation to concept: Trust.";
        let r = labeled_fields(text).unwrap();
        assert_eq!(r.chapter_id, "Al-Baqarah");
        assert_eq!(r.verse_number, "[2:255]");
        assert_eq!(r.translation_text, "\"Allah - there is no deity\nexcept Him\"");
        assert_eq!(r.relation_text, "Trust.");
    }

    #[test]
    fn labeled_markdown_and_inline() {
        let text = "**Surah:** Al-Imran, Verse: 3:200\n- **Relation to the concept:** endurance";
        let r = labeled_fields(text).unwrap();
        assert_eq!(r.chapter_id, "Al-Imran");
        assert_eq!(r.verse_number, "3:200");
        assert_eq!(r.relation_text, "endurance");
    }

    #[test]
    fn labeled_missing_label_is_empty() {
        let r = labeled_fields("Verse: 94:5").unwrap();
        assert_eq!(r.verse_number, "94:5");
        assert_eq!(r.chapter_id, "");
        assert!(labeled_fields("Ayah: 94:5").is_none());
    }

    #[test]
    fn key_value_with_continuation() {
        let text = "Chapter: Ash-Sharh\nAyah: 94:5\nText: For indeed, with hardship\nwill be ease.";
        let r = key_value_lines(text).unwrap();
        assert_eq!(r.chapter_id, "Ash-Sharh");
        assert_eq!(r.verse_number, "94:5");
        assert_eq!(r.translation_text, "For indeed, with hardship will be ease.");
    }

    #[test]
    fn key_value_ignores_digit_pairs_in_prose() {
        let text = "Explanation: see also\n2:286 for the same idea";
        let r = key_value_lines(text).unwrap();
        assert_eq!(r.relation_text, "see also 2:286 for the same idea");
    }

    #[test]
    fn key_value_nothing_known() {
        assert!(key_value_lines("Hello: world\nno fields here").is_none());
        assert!(key_value_lines("").is_none());
    }
}
