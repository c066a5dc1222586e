use versemap_core::{ParsedBlock, ReferenceParser, VerseReference};

use crate::normalize::{clean_reference, clean_text};
use crate::strategy::ParseStrategy;

/// Extracts a [`VerseReference`] from one free-text block by trying each
/// strategy in order. The first strategy that recognizes the block wins; its
/// fields are never merged with another strategy's.
#[derive(Debug, Clone)]
pub struct TextBlockParser {
    strategies: Vec<ParseStrategy>,
}

impl Default for TextBlockParser {
    fn default() -> Self {
        Self {
            strategies: ParseStrategy::ALL.to_vec(),
        }
    }
}

impl TextBlockParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom strategy order.
    pub fn with_strategies(strategies: Vec<ParseStrategy>) -> Self {
        Self { strategies }
    }

    pub fn strategies(&self) -> &[ParseStrategy] {
        &self.strategies
    }

    /// Parse a block. Never fails; unrecognized fields are empty.
    pub fn parse(&self, raw_text: &str) -> VerseReference {
        self.parse_with_strategy(raw_text).0
    }

    /// Parse a block and report which strategy produced the result.
    pub fn parse_with_strategy(&self, raw_text: &str) -> (VerseReference, Option<ParseStrategy>) {
        if raw_text.trim().is_empty() {
            return (VerseReference::default(), None);
        }

        for strategy in &self.strategies {
            if let Some(raw) = strategy.apply(raw_text) {
                tracing::trace!(strategy = strategy.name(), "strategy matched");
                return (clean_fields(raw), Some(*strategy));
            }
        }

        tracing::debug!(
            preview = %raw_text.chars().take(60).collect::<String>(),
            "no strategy recognized the text block"
        );
        (VerseReference::default(), None)
    }
}

impl ReferenceParser for TextBlockParser {
    fn parse_block(&self, raw_text: &str) -> ParsedBlock {
        let (reference, strategy) = self.parse_with_strategy(raw_text);
        ParsedBlock {
            reference,
            strategy: strategy.map(|s| s.name()),
        }
    }
}

fn clean_fields(raw: VerseReference) -> VerseReference {
    VerseReference {
        chapter_id: clean_reference(&raw.chapter_id),
        verse_number: clean_reference(&raw.verse_number),
        translation_text: clean_text(&raw.translation_text),
        relation_text: clean_text(&raw.relation_text),
    }
}
