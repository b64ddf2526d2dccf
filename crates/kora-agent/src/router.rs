//! Per-message domain routing: which of the 14 domains to recall from and
//! which model tier should answer.
//!
//! The LLM router is authoritative; the keyword heuristic is both its
//! fallback (provider failure, malformed output) and a zero-cost router
//! for deployments without a routing model.

use std::sync::Arc;

use async_trait::async_trait;
use kora_core::{DomainId, RouteDecision};
use kora_sessions::Turn;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::provider::{ChatRequest, LlmProvider, Message, Role};

#[async_trait]
pub trait DomainRouter: Send + Sync {
    /// Classify a message. Must not fail: routing errors collapse to a
    /// usable fallback decision internally.
    async fn route(&self, text: &str, recent_turns: &[Turn]) -> RouteDecision;
}

/// Keyword table: (substring, domain id). First two distinct hits become
/// primary; the rest related.
const DOMAIN_KEYWORDS: &[(&str, DomainId)] = &[
    ("my name", 1),
    ("i am", 1),
    ("sleep", 2),
    ("gym", 2),
    ("workout", 2),
    ("meds", 2),
    ("medication", 2),
    ("doctor", 2),
    ("feel", 3),
    ("anxious", 3),
    ("stress", 3),
    ("mood", 3),
    ("believe", 4),
    ("religion", 4),
    ("politics", 4),
    ("learn", 5),
    ("skill", 5),
    ("study", 5),
    ("course", 5),
    ("friend", 6),
    ("family", 6),
    ("partner", 6),
    ("wife", 6),
    ("husband", 6),
    ("mom", 6),
    ("dad", 6),
    ("work", 7),
    ("job", 7),
    ("career", 7),
    ("boss", 7),
    ("meeting", 7),
    ("money", 8),
    ("budget", 8),
    ("salary", 8),
    ("invest", 8),
    ("rent", 8),
    ("live", 9),
    ("city", 9),
    ("move", 9),
    ("home", 9),
    ("apartment", 9),
    ("goal", 10),
    ("plan to", 10),
    ("want to", 10),
    ("dream", 10),
    ("favorite", 11),
    ("prefer", 11),
    ("like", 11),
    ("hate", 11),
    ("routine", 12),
    ("every day", 12),
    ("morning", 12),
    ("habit", 12),
    ("remind", 12),
    // Medication is both health and routine; both domains get recalled.
    ("meds", 12),
    ("medication", 12),
    ("happened", 13),
    ("birthday", 13),
    ("wedding", 13),
    ("trip", 13),
    ("always end up", 14),
    ("keep doing", 14),
];

const DECISION_MARKERS: &[&str] = &["should i", "decide", "choose", "which one", "what do you think"];

/// Zero-cost keyword router.
pub struct HeuristicRouter;

#[async_trait]
impl DomainRouter for HeuristicRouter {
    async fn route(&self, text: &str, _recent_turns: &[Turn]) -> RouteDecision {
        let lowered = text.to_lowercase();

        let mut hits: Vec<DomainId> = Vec::new();
        for (kw, domain) in DOMAIN_KEYWORDS {
            if lowered.contains(kw) && !hits.contains(domain) {
                hits.push(*domain);
            }
        }
        let is_decision = DECISION_MARKERS.iter().any(|m| lowered.contains(m));

        let (primary, related) = if hits.is_empty() {
            (RouteDecision::fallback().primary, Vec::new())
        } else {
            let related = hits.split_off(hits.len().min(2));
            (hits, related)
        };

        let model_tier = if is_decision || text.len() > 400 {
            "deep".to_string()
        } else {
            "fast".to_string()
        };

        RouteDecision {
            primary,
            related,
            model_tier,
            is_decision,
        }
    }
}

const ROUTER_SYSTEM: &str = "\
Classify one message for a personal assistant's memory recall. Return ONLY \
JSON: {\"primary\": [domain ids], \"related\": [domain ids], \
\"model_tier\": \"fast\"|\"deep\", \"is_decision\": bool}.

Domains: 1 Identity, 2 Body/Health, 3 Mind/Emotions, 4 Beliefs, \
5 Knowledge/Skills, 6 Relationships, 7 Work/Career, 8 Finances, 9 Place, \
10 Goals, 11 Preferences, 12 Rhythms/Routines, 13 Life Events, \
14 Unconscious Patterns.

primary: 1-3 domains the message is about. related: up to 3 more worth a \
glance. model_tier deep only for decisions, analysis, or long-form asks.";

/// LLM-backed router with heuristic fallback.
pub struct LlmRouter {
    provider: Arc<dyn LlmProvider>,
    model: String,
    fallback: HeuristicRouter,
}

#[derive(Deserialize)]
struct RouterOutput {
    #[serde(default)]
    primary: Vec<DomainId>,
    #[serde(default)]
    related: Vec<DomainId>,
    #[serde(default)]
    model_tier: Option<String>,
    #[serde(default)]
    is_decision: bool,
}

impl LlmRouter {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            fallback: HeuristicRouter,
        }
    }
}

#[async_trait]
impl DomainRouter for LlmRouter {
    async fn route(&self, text: &str, recent_turns: &[Turn]) -> RouteDecision {
        let mut context = String::new();
        for t in recent_turns.iter().rev().take(4).rev() {
            context.push_str(&format!("{}: {}\n", t.role, truncate(&t.text, 200)));
        }

        let req = ChatRequest {
            model: self.model.clone(),
            system: ROUTER_SYSTEM.to_string(),
            messages: vec![Message {
                role: Role::User,
                content: format!("Recent turns:\n{context}\nMessage: {text}"),
            }],
            max_tokens: 256,
            tools: Vec::new(),
            raw_messages: None,
        };

        match self.provider.send(&req).await {
            Ok(resp) => match parse_route(&resp.content) {
                Some(decision) => {
                    debug!(primary = ?decision.primary, tier = %decision.model_tier, "routed");
                    decision
                }
                None => {
                    warn!("router output unparseable, using heuristic");
                    self.fallback.route(text, recent_turns).await
                }
            },
            Err(e) => {
                warn!(error = %e, "router call failed, using heuristic");
                self.fallback.route(text, recent_turns).await
            }
        }
    }
}

fn parse_route(raw: &str) -> Option<RouteDecision> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    let parsed: RouterOutput = serde_json::from_str(&raw[start..=end]).ok()?;

    let valid = |d: &DomainId| (1..=14).contains(d);
    let primary: Vec<DomainId> = parsed.primary.into_iter().filter(|d| valid(d)).collect();
    let related: Vec<DomainId> = parsed
        .related
        .into_iter()
        .filter(|d| valid(d) && !primary.contains(d))
        .collect();
    if primary.is_empty() {
        return None;
    }
    let model_tier = match parsed.model_tier.as_deref() {
        Some("deep") => "deep".to_string(),
        _ => "fast".to_string(),
    };
    Some(RouteDecision {
        primary,
        related,
        model_tier,
        is_decision: parsed.is_decision,
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn heuristic_picks_place_domain() {
        let r = HeuristicRouter.route("Where do I live?", &[]).await;
        assert!(r.primary.contains(&9));
        assert_eq!(r.model_tier, "fast");
    }

    #[tokio::test]
    async fn heuristic_flags_decisions_as_deep() {
        let r = HeuristicRouter
            .route("Should I take the new job or stay?", &[])
            .await;
        assert!(r.is_decision);
        assert_eq!(r.model_tier, "deep");
        assert!(r.primary.contains(&7));
    }

    #[tokio::test]
    async fn heuristic_falls_back_on_no_hits() {
        let r = HeuristicRouter.route("zzz qqq", &[]).await;
        assert_eq!(r.primary, RouteDecision::fallback().primary);
    }

    #[test]
    fn parse_route_filters_bad_domains() {
        let out = r#"{"primary": [9, 99], "related": [9, 6], "model_tier": "deep", "is_decision": false}"#;
        let d = parse_route(out).unwrap();
        assert_eq!(d.primary, vec![9]);
        assert_eq!(d.related, vec![6]);
        assert_eq!(d.model_tier, "deep");
    }

    #[test]
    fn parse_route_rejects_empty_primary() {
        assert!(parse_route(r#"{"primary": [], "related": [1]}"#).is_none());
        assert!(parse_route("not json").is_none());
    }
}
