//! Verse keys and their derivation from loosely-filled references.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::VerseReference;

/// Number of chapters in the corpus.
pub const CHAPTER_COUNT: u16 = 114;

/// A validated `chapter:verse` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VerseKey {
    pub chapter: u16,
    pub verse: u16,
}

impl VerseKey {
    /// Build a key, rejecting chapter numbers outside the corpus and verse 0.
    pub fn new(chapter: u16, verse: u16) -> Option<Self> {
        if (1..=CHAPTER_COUNT).contains(&chapter) && verse >= 1 {
            Some(Self { chapter, verse })
        } else {
            None
        }
    }

    /// Parse an exact `c:v` string (surrounding whitespace allowed).
    pub fn parse(s: &str) -> Option<Self> {
        static FULL_RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^\s*(\d{1,3})\s*:\s*(\d{1,3})\s*$").unwrap());
        let caps = FULL_RE.captures(s)?;
        Self::new(caps[1].parse().ok()?, caps[2].parse().ok()?)
    }

    /// Find the first valid `digits:digits` pair embedded anywhere in `text`.
    pub fn find_in(text: &str) -> Option<Self> {
        static PAIR_RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"(?:^|[^\d])(\d{1,3})\s*:\s*(\d{1,3})").unwrap());
        PAIR_RE.captures_iter(text).find_map(|caps| {
            Self::new(caps[1].parse().ok()?, caps[2].parse().ok()?)
        })
    }
}

impl fmt::Display for VerseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chapter, self.verse)
    }
}

/// Where a derived key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// The verse field already held `c:v`.
    VerseField,
    /// Numeric chapter field plus numeric verse field.
    NumericFields,
    /// Named chapter resolved through the chapter list.
    ChapterName,
    /// A `c:v` pair found inside one of the text fields.
    Embedded,
}

/// Leading verse number of a field such as `"255"`, `"255-257"` or `"Verse 255"`.
pub fn leading_number(s: &str) -> Option<u16> {
    static NUM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\D{0,12}?(\d{1,3})(?:\D|$)").unwrap());
    NUM_RE.captures(s.trim())?[1].parse().ok()
}

/// Keys derivable without any network call.
///
/// Tries the verse field as `c:v`, then numeric chapter + verse fields.
pub fn key_from_fields(reference: &VerseReference) -> Option<(VerseKey, KeySource)> {
    if let Some(key) = VerseKey::parse(&reference.verse_number) {
        return Some((key, KeySource::VerseField));
    }
    let chapter = reference.chapter_id.trim();
    if !chapter.is_empty() && chapter.chars().all(|c| c.is_ascii_digit()) {
        let verse = leading_number(&reference.verse_number)?;
        let key = VerseKey::new(chapter.parse().ok()?, verse)?;
        return Some((key, KeySource::NumericFields));
    }
    None
}

/// Fallback: scan every field for an embedded `c:v` pair.
pub fn embedded_key(reference: &VerseReference) -> Option<VerseKey> {
    [
        &reference.chapter_id,
        &reference.verse_number,
        &reference.translation_text,
        &reference.relation_text,
    ]
    .into_iter()
    .find_map(|field| VerseKey::find_in(field))
}
