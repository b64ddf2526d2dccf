//! LLM-backed extractor: turns one conversation turn into the structured
//! facts / entities / edges the memory engine persists.

use std::sync::Arc;

use async_trait::async_trait;
use kora_memory::error::{MemoryError, Result};
use kora_memory::extract::Extractor;
use kora_memory::types::Extraction;
use tracing::debug;

use crate::provider::{ChatRequest, LlmProvider, Message, Role};

const EXTRACTION_SYSTEM: &str = "\
You extract durable knowledge from one conversation turn of a personal \
assistant. Return ONLY a JSON object, no prose, shaped as:

{\"facts\": [{\"target\": \"user\"|\"agent\", \"domain\": 1-14, \"field\": \"...\", \
\"value\": \"...\", \"confidence\": 0.0-1.0, \"entity_name\": \"...\" (optional)}],
 \"entities\": [{\"name\": \"...\", \"type\": \
\"person\"|\"place\"|\"organization\"|\"concept\"|\"goal\"|\"event\", \"domain\": 1-14}],
 \"edges\": [{\"source_name\": \"...\", \"target_name\": \"...\", \"relation\": \"...\"}]}

Domains: 1 Identity, 2 Body/Health, 3 Mind/Emotions, 4 Beliefs, \
5 Knowledge/Skills, 6 Relationships, 7 Work/Career, 8 Finances, 9 Place, \
10 Goals, 11 Preferences, 12 Rhythms/Routines, 13 Life Events, \
14 Unconscious Patterns.

Rules:
- `target: agent` only for directives about how the assistant should behave.
- `field` is a short snake_case key; one durable statement per fact.
- Skip pleasantries, questions, and anything already implied by the reply.
- Empty arrays are fine; do not invent facts.";

pub struct LlmExtractor {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl LlmExtractor {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Extractor for LlmExtractor {
    async fn extract(&self, user_msg: &str, assistant_msg: &str) -> Result<Extraction> {
        let req = ChatRequest {
            model: self.model.clone(),
            system: EXTRACTION_SYSTEM.to_string(),
            messages: vec![Message {
                role: Role::User,
                content: format!("USER: {user_msg}\nASSISTANT: {assistant_msg}"),
            }],
            max_tokens: 1024,
            tools: Vec::new(),
            raw_messages: None,
        };

        let resp = self
            .provider
            .send(&req)
            .await
            .map_err(|e| MemoryError::Extractor(e.to_string()))?;

        let extraction = parse_extraction(&resp.content)?;
        debug!(
            facts = extraction.facts.len(),
            entities = extraction.entities.len(),
            edges = extraction.edges.len(),
            "extraction parsed"
        );
        Ok(extraction)
    }
}

/// Parse the model output, tolerating markdown code fences and leading
/// prose before the JSON object.
fn parse_extraction(raw: &str) -> Result<Extraction> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim_end_matches("```").trim())
        .unwrap_or(trimmed);

    // Fall back to the outermost braces when the model adds commentary.
    let candidate = match serde_json::from_str::<Extraction>(body) {
        Ok(e) => return Ok(e),
        Err(_) => {
            let start = body
                .find('{')
                .ok_or_else(|| MemoryError::Extractor("no JSON object in output".to_string()))?;
            let end = body
                .rfind('}')
                .ok_or_else(|| MemoryError::Extractor("unterminated JSON object".to_string()))?;
            &body[start..=end]
        }
    };
    serde_json::from_str(candidate).map_err(|e| MemoryError::Extractor(format!("bad JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kora_memory::types::FactTarget;

    #[test]
    fn parses_bare_json() {
        let out = r#"{"facts":[{"target":"user","domain":9,"field":"city","value":"LA","confidence":0.9}],"entities":[],"edges":[]}"#;
        let ex = parse_extraction(out).unwrap();
        assert_eq!(ex.facts.len(), 1);
        assert_eq!(ex.facts[0].target, FactTarget::User);
    }

    #[test]
    fn parses_fenced_json_with_prose() {
        let out = "Here is the extraction:\n```json\n{\"facts\":[],\"entities\":[],\"edges\":[]}\n```";
        let ex = parse_extraction(out).unwrap();
        assert!(ex.facts.is_empty());
    }

    #[test]
    fn rejects_non_json() {
        assert!(parse_extraction("I could not find any facts.").is_err());
    }
}
