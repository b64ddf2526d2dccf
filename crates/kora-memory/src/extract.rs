//! Extraction boundary: the `Extractor` collaborator `remember` calls after
//! each turn, plus the cheap smalltalk filter that decides whether calling
//! it is worth an LLM round-trip at all.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Extraction;

/// Turn → structured facts/entities/edges. The production implementation is
/// an LLM call; tests use canned extractions.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, user_msg: &str, assistant_msg: &str) -> Result<Extraction>;
}

const GREETINGS: &[&str] = &[
    "hi", "hey", "hello", "yo", "sup", "good morning", "good evening", "good night",
    "thanks", "thank you", "ok", "okay", "cool", "nice", "great", "see you", "bye",
    "you're welcome", "no problem", "anytime",
];

/// Cheap heuristic for replies not worth extracting from: short greetings
/// and acknowledgements. Anything long or content-bearing passes through.
pub fn is_smalltalk(text: &str) -> bool {
    let t = text.trim().to_lowercase();
    if t.is_empty() {
        return true;
    }
    if t.len() > 80 {
        return false;
    }
    let stripped: String = t.chars().filter(|c| !"!?.,:;'\"()~ ".contains(*c)).collect();
    GREETINGS.iter().any(|g| {
        let g_stripped: String = g.chars().filter(|c| *c != ' ').collect();
        stripped == g_stripped || t.starts_with(g)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greetings_are_smalltalk() {
        assert!(is_smalltalk("Hey!"));
        assert!(is_smalltalk("good morning :)".trim()));
        assert!(is_smalltalk("Thanks!"));
        assert!(is_smalltalk(""));
    }

    #[test]
    fn content_is_not_smalltalk() {
        assert!(!is_smalltalk("I moved to LA last month and started a new job"));
        assert!(!is_smalltalk(
            "Here's the plan: book the flight on Tuesday, then confirm the hotel \
             and send Marta the itinerary."
        ));
    }
}
