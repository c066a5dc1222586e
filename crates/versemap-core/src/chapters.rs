//! Chapter list and name-to-number resolution.
//!
//! Generated text names chapters in many transliterations ("Al-Baqarah",
//! "Surah Al Baqara", "The Cow"). Names are folded to lowercase ASCII
//! alphanumerics before comparison; exact matches win, then matches with the
//! Arabic article removed, then the closest fuzzy match above a threshold.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Minimum fuzzy ratio for a chapter name match.
const FUZZY_THRESHOLD: f64 = 0.85;

/// One chapter as listed by the lookup service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub id: u16,
    pub name_simple: String,
    pub name_complex: String,
    pub translated_name: String,
}

struct Entry {
    id: u16,
    names: Vec<String>,
}

/// Index over chapter names for resolving free-text chapter identifiers.
pub struct ChapterIndex {
    entries: Vec<Entry>,
}

impl ChapterIndex {
    pub fn new(chapters: Vec<Chapter>) -> Self {
        let entries = chapters
            .into_iter()
            .map(|c| {
                let mut names = Vec::new();
                for raw in [&c.name_simple, &c.name_complex, &c.translated_name] {
                    let folded = fold_name(raw);
                    if !folded.is_empty() && !names.contains(&folded) {
                        names.push(folded);
                    }
                    let stripped = fold_name(&strip_article(raw));
                    if !stripped.is_empty() && !names.contains(&stripped) {
                        names.push(stripped);
                    }
                }
                Entry { id: c.id, names }
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a chapter name to its number.
    pub fn find(&self, name: &str) -> Option<u16> {
        for candidate in candidate_names(name) {
            if let Some(id) = self.find_exact(&candidate) {
                return Some(id);
            }
        }
        candidate_names(name)
            .iter()
            .filter_map(|candidate| self.find_fuzzy(candidate))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    fn find_exact(&self, folded: &str) -> Option<u16> {
        self.entries
            .iter()
            .find(|e| e.names.iter().any(|n| n == folded))
            .map(|e| e.id)
    }

    fn find_fuzzy(&self, folded: &str) -> Option<(u16, f64)> {
        let mut best: Option<(u16, f64)> = None;
        for entry in &self.entries {
            for n in &entry.names {
                let score = rapidfuzz::fuzz::ratio(folded.chars(), n.chars());
                if score >= FUZZY_THRESHOLD && best.is_none_or(|(_, s)| score > s) {
                    best = Some((entry.id, score));
                }
            }
        }
        best
    }
}

/// Folded forms of a user-supplied chapter name worth trying, in order.
fn candidate_names(name: &str) -> Vec<String> {
    static PAREN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(([^)]*)\)").unwrap());
    static PREFIX_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)^\s*(?:surah|surat|sura|chapter)\b[\s.:\-]*").unwrap());

    let outside = PAREN_RE.replace_all(name, " ");
    let outside = PREFIX_RE.replace(&outside, "").to_string();

    let mut raw = vec![outside.clone(), strip_article(&outside)];
    for caps in PAREN_RE.captures_iter(name) {
        raw.push(caps[1].to_string());
    }

    let mut out: Vec<String> = Vec::new();
    for r in raw {
        let folded = fold_name(&r);
        if !folded.is_empty() && !out.contains(&folded) {
            out.push(folded);
        }
    }
    out
}

/// Remove a leading Arabic definite article ("Al-", "An-", "Ash-", ...).
fn strip_article(name: &str) -> String {
    static ARTICLE_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)^\s*(?:a[lnrstdz]|ash|adh|ath|az|ad)[\s\-'‘’]+").unwrap());
    ARTICLE_RE.replace(name, "").to_string()
}

/// Lowercase ASCII alphanumerics only, with diacritics removed.
pub fn fold_name(name: &str) -> String {
    name.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
