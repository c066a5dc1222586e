//! Recovery of structured verse references from generated free text.
//!
//! Text blocks arrive in whatever shape the generator chose for that run: a
//! JSON object, a scripting-language mapping literal, labeled lines, or loose
//! `Key: value` pairs. [`TextBlockParser`] tries a fixed chain of strategies
//! and normalizes whatever the winning strategy found.

pub mod literal;
pub mod normalize;
pub mod parser;
pub mod strategy;

pub use literal::{LiteralError, parse_literal};
pub use normalize::{clean_reference, clean_text, normalize};
pub use parser::TextBlockParser;
pub use strategy::ParseStrategy;
// Re-export the shared domain types so callers need only this crate to parse.
pub use versemap_core::{ParsedBlock, ReferenceParser, VerseReference};

/// Parse one block with the default strategy chain.
pub fn parse(raw_text: &str) -> VerseReference {
    TextBlockParser::default().parse(raw_text)
}
