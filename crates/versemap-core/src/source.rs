//! Interface to the service that generates free-text reference blocks.
//!
//! No concrete generator ships with this crate. A [`BatchPipeline`](crate::BatchPipeline)
//! configured with a [`TextSource`] asks it for text only when a row arrives
//! without any.

use std::future::Future;
use std::pin::Pin;

use crate::{CoreError, RawConcept};

/// System message sent alongside every prompt.
pub const SYSTEM_PROMPT: &str =
    "You are a helpful assistant that finds relevant Quranic verses for psychological concepts.";

/// A text-producing collaborator.
pub trait TextSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Produce one free-text block for `prompt`.
    fn generate<'a>(
        &'a self,
        system: &'a str,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, CoreError>> + Send + 'a>>;
}

/// The user prompt for one concept. The answer format requested here is the
/// one the labeled-field parse strategy expects.
pub fn build_prompt(concept: &RawConcept) -> String {
    format!(
        "The psychological concept is \"{name}\" from the category \"{category}\".\n\
         Description: {description}\n\
         \n\
         Please provide a relevant verse from the Quran that relates to this concept. \
         Include the Surah name, verse number (in the format chapter:verse), \
         the English translation of the verse, and a detailed explanation of how \
         the verse relates to the psychological concept.\n\
         \n\
         Format your response as follows:\n\
         Surah: [Surah Name]\n\
         Verse: [chapter:verse]\n\
         Translation: [English translation of the verse]\n\
         Relation to concept: [Detailed explanation]\n",
        name = concept.name,
        category = concept.category,
        description = concept.description,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_concept_and_format() {
        let concept = RawConcept {
            name: "Gratitude".into(),
            category: "Positive emotions".into(),
            description: "Thankfulness for what one has".into(),
            raw_reference_text: String::new(),
        };
        let prompt = build_prompt(&concept);
        assert!(prompt.contains("\"Gratitude\" from the category \"Positive emotions\""));
        assert!(prompt.contains("Description: Thankfulness for what one has"));
        for label in ["Surah:", "Verse:", "Translation:", "Relation to concept:"] {
            assert!(prompt.contains(label), "missing {label}");
        }
    }
}
