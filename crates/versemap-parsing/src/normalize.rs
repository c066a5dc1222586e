//! Normalization of chapter:verse identifiers and free-text fields.

use once_cell::sync::Lazy;
use regex::Regex;

/// Whitespace or a spaced dot between two digits, or a colon with any
/// whitespace around it.
static SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d)(?:\s*:\s*|\s+\.\s*|\s*\.\s+|\s+)(\d)").unwrap());

/// Zero sub-verse markers after a chapter:verse pair (`2:255:00`, `2:255:0:00`).
static TRAILING_ZERO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+:\d+)(?::0+)+\s*$").unwrap());

/// Every layer of enclosing brackets at once.
static BRACKETS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\[\s*)+(.*?)(?:\s*\])+$").unwrap());

static DOT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d)\.(\d)").unwrap());

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Normalize a chapter:verse identifier to `chapter:verse` form.
///
/// Total and idempotent: any string is accepted, and normalizing an already
/// normalized value returns it unchanged.
///
/// ```
/// use versemap_parsing::normalize;
///
/// assert_eq!(normalize("2 : 255"), "2:255");
/// assert_eq!(normalize("[2:255]"), "2:255");
/// assert_eq!(normalize("2:255:00"), "2:255");
/// assert_eq!(normalize("2.255"), "2:255");
/// ```
pub fn normalize(raw: &str) -> String {
    let mut current = raw.trim().to_string();
    // Each changing pass either shortens the string or turns a non-colon
    // separator into `:`, so this reaches a fixed point.
    loop {
        let next = normalize_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// One application of the rule chain, in order.
fn normalize_pass(s: &str) -> String {
    let s = SEPARATOR_RE.replace_all(s, "$1:$2");
    let s = TRAILING_ZERO_RE.replace(&s, "$1");
    let s = BRACKETS_RE.replace(&s, "$1");
    let s = DOT_RE.replace_all(&s, "$1:$2");
    s.trim().to_string()
}

/// Collapse whitespace, trim, and drop stray quote characters.
///
/// Double quotes are removed wherever they appear. Single quotes are only
/// removed at the ends so apostrophes inside names ("Ra'd") survive.
pub fn clean_text(s: &str) -> String {
    let without_double: String = s
        .chars()
        .filter(|c| !matches!(c, '"' | '\u{201C}' | '\u{201D}'))
        .collect();
    let collapsed = WHITESPACE_RE.replace_all(&without_double, " ");
    collapsed
        .trim()
        .trim_matches(|c| matches!(c, '\'' | '\u{2018}' | '\u{2019}'))
        .trim()
        .to_string()
}

/// Clean then normalize; used for the chapter and verse fields.
///
/// Repeats until stable, since unwrapping brackets can expose quotes that
/// cleaning removes (`[ 'x' ]`).
pub fn clean_reference(s: &str) -> String {
    let mut current = normalize(&clean_text(s));
    loop {
        let next = normalize(&clean_text(&current));
        if next == current {
            return current;
        }
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn spaced_colon() {
        assert_eq!(normalize("2 : 255"), "2:255");
        assert_eq!(normalize("  2:  255 "), "2:255");
    }

    #[test]
    fn bracketed() {
        assert_eq!(normalize("[2:255]"), "2:255");
        assert_eq!(normalize("[ 13 : 28 ]"), "13:28");
    }

    #[test]
    fn trailing_zero_sub_verse() {
        assert_eq!(normalize("2:255:00"), "2:255");
        assert_eq!(normalize("[2:255:00]"), "2:255");
    }

    #[test]
    fn dot_separator() {
        assert_eq!(normalize("2.255"), "2:255");
        assert_eq!(normalize("2 . 255"), "2:255");
        assert_eq!(normalize("2. 255"), "2:255");
    }

    #[test]
    fn space_separator() {
        assert_eq!(normalize("94 5"), "94:5");
    }

    #[test]
    fn leaves_names_and_ranges_alone() {
        assert_eq!(normalize("Al-Baqarah"), "Al-Baqarah");
        assert_eq!(normalize("2:255-257"), "2:255-257");
        assert_eq!(normalize("255"), "255");
    }

    #[test]
    fn empty_and_whitespace() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \n\t"), "");
    }

    #[test]
    fn idempotent_over_samples() {
        let samples = [
            "",
            "2 : 255",
            "[2:255]",
            "2:255:00",
            "2.255",
            "[ 2 . 255 ]:00",
            "1 2 3",
            "Surah 2, Verse 255",
            "[]",
            "[[2:255]]",
            "١٢:٣",
            "::",
            "2:255:00:00",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn deeply_bracketed_reaches_canonical_form() {
        let wrapped = format!("{}2:255{}", "[".repeat(20), "]".repeat(20));
        assert_eq!(normalize(&wrapped), "2:255");
        let spaced = format!("{}2 : 255{}", "[ ".repeat(50), " ]".repeat(50));
        assert_eq!(normalize(&spaced), "2:255");
    }

    #[test]
    fn repeated_zero_markers_are_all_removed() {
        let marked = format!("2:255{}", ":00".repeat(20));
        assert_eq!(normalize(&marked), "2:255");
        assert_eq!(normalize("[2:255:0:000]"), "2:255");
    }

    #[test]
    fn clean_text_collapses_and_strips_quotes() {
        assert_eq!(clean_text("  \"Allah  -  there is\n no deity\"  "), "Allah - there is no deity");
        assert_eq!(clean_text("“Indeed”"), "Indeed");
        assert_eq!(clean_text("'Ar-Ra'd'"), "Ar-Ra'd");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn clean_reference_handles_quoted_verse() {
        assert_eq!(clean_reference("\"[2:255]\""), "2:255");
        assert_eq!(clean_reference(" '94 : 5' "), "94:5");
        assert_eq!(clean_reference("[ '2:255' ]"), "2:255");
    }

    /// Strings drawn mostly from the characters the rewrite rules act on.
    fn reference_like() -> impl Strategy<Value = String> {
        prop::collection::vec(
            prop_oneof![
                4 => prop::sample::select(vec!['[', ']', ':', '.', ' ', '\t', '\n', '0', '2', '5']),
                1 => any::<char>(),
            ],
            0..64,
        )
        .prop_map(|chars| chars.into_iter().collect())
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(input in reference_like()) {
            let once = normalize(&input);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn normalize_is_idempotent_on_any_string(input in any::<String>()) {
            let once = normalize(&input);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn clean_reference_is_idempotent(input in reference_like()) {
            let once = clean_reference(&input);
            prop_assert_eq!(clean_reference(&once), once);
        }
    }
}
