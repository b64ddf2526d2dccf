use chrono::{DateTime, Datelike, Duration, Utc};
use kora_core::DomainId;
use serde::{Deserialize, Serialize};

/// Closed set of entity type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Person,
    Place,
    Organization,
    Concept,
    Goal,
    Event,
    Agent,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Person => write!(f, "person"),
            Self::Place => write!(f, "place"),
            Self::Organization => write!(f, "organization"),
            Self::Concept => write!(f, "concept"),
            Self::Goal => write!(f, "goal"),
            Self::Event => write!(f, "event"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "person" => Ok(Self::Person),
            "place" => Ok(Self::Place),
            "organization" => Ok(Self::Organization),
            "concept" => Ok(Self::Concept),
            "goal" => Ok(Self::Goal),
            "event" => Ok(Self::Event),
            "agent" => Ok(Self::Agent),
            other => Err(format!("unknown entity kind: {other}")),
        }
    }
}

/// Graph node: a person, place, organization, concept, goal, event, or the
/// assistant itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    pub name: String,
    pub kind: EntityKind,
    pub domain_id: DomainId,
    pub metadata: serde_json::Value,
    pub created_at: String,
    pub updated_at: String,
}

/// Atomic knowledge unit, optionally attached to an entity.
///
/// At most one active fact exists per (entity, domain, field); a new value
/// supersedes the old row, which stays on disk with `active = false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub id: i64,
    pub entity_id: Option<i64>,
    pub domain_id: DomainId,
    pub field: String,
    pub value: String,
    pub confidence: f64,
    pub access_count: i64,
    pub last_accessed: Option<String>,
    pub supersedes: Option<i64>,
    pub active: bool,
    /// Decay score; recomputed periodically with the recall formula.
    pub score: f64,
    pub created_at: String,
}

/// Typed directed relation between two entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: i64,
    pub source_id: i64,
    pub target_id: i64,
    pub relation: String,
    pub strength: f64,
    pub metadata: serde_json::Value,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteTier {
    Working,
    Archive,
}

impl std::fmt::Display for NoteTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Working => write!(f, "working"),
            Self::Archive => write!(f, "archive"),
        }
    }
}

impl std::str::FromStr for NoteTier {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "working" => Ok(Self::Working),
            "archive" => Ok(Self::Archive),
            other => Err(format!("unknown note tier: {other}")),
        }
    }
}

/// Key→content record of mutable working state. Working-note keys (never
/// content) are surfaced in the assembled context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub key: String,
    pub content: String,
    pub tier: NoteTier,
    pub updated_at: String,
}

/// Absolute time restriction on recalled facts (`created_at` within).
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeWindow {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl TimeWindow {
    /// Named windows: `today`, `week`, `month` (start of period → now).
    pub fn named(name: &str, now: DateTime<Utc>) -> Option<Self> {
        let date = now.date_naive();
        let since = match name {
            "today" => date.and_hms_opt(0, 0, 0)?,
            "week" => {
                let days_back = date.weekday().num_days_from_monday() as i64;
                (date - Duration::days(days_back)).and_hms_opt(0, 0, 0)?
            }
            "month" => date.with_day(1)?.and_hms_opt(0, 0, 0)?,
            _ => return None,
        };
        Some(Self {
            since: Some(since.and_utc()),
            until: Some(now),
        })
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        if let Some(since) = self.since {
            if t < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if t > until {
                return false;
            }
        }
        true
    }
}

/// Options for a recall call beyond the query and domain sets.
#[derive(Debug, Clone)]
pub struct RecallOptions {
    /// Graph expansion depth, clamped to 1..=3.
    pub depth: usize,
    pub window: Option<TimeWindow>,
    /// Agent self-load; on by default and independent of routing.
    pub include_agent: bool,
}

impl Default for RecallOptions {
    fn default() -> Self {
        Self {
            depth: 1,
            window: None,
            include_agent: true,
        }
    }
}

/// A recalled fact with its merge score.
#[derive(Debug, Clone)]
pub struct ScoredFact {
    pub fact: Fact,
    pub score: f64,
}

/// Everything one recall returns.
#[derive(Debug, Clone, Default)]
pub struct RecallResult {
    /// Top-scored facts, at most the requested limit, domains ⊆ P∪R.
    pub facts: Vec<ScoredFact>,
    /// Entities referenced by the top facts plus graph-expanded neighbors.
    pub entities: Vec<Entity>,
    /// Edges pulled during graph expansion.
    pub edges: Vec<Edge>,
    /// Active facts of 1-hop neighbor entities (capped per neighbor).
    pub neighbor_facts: Vec<Fact>,
    /// Agent-self facts; always loaded, never filtered by routing.
    pub agent_facts: Vec<Fact>,
    /// True when the semantic pass was skipped (embedder unreachable).
    pub degraded: bool,
}

/// Subgraph returned by `traverse`.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub entities: Vec<Entity>,
    pub edges: Vec<Edge>,
}

/// Who an extracted fact is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactTarget {
    User,
    Agent,
}

/// One fact emitted by the extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedFact {
    pub target: FactTarget,
    pub domain: DomainId,
    pub field: String,
    pub value: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub entity_name: Option<String>,
}

fn default_confidence() -> f64 {
    0.8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub domain: DomainId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEdge {
    pub source_name: String,
    pub target_name: String,
    pub relation: String,
}

/// Structured extractor output for one conversation turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    #[serde(default)]
    pub facts: Vec<ExtractedFact>,
    #[serde(default)]
    pub entities: Vec<ExtractedEntity>,
    #[serde(default)]
    pub edges: Vec<ExtractedEdge>,
}

/// A superseding event surfaced to the caller so the loop can ask
/// "you previously said X, now Y, keep which?".
#[derive(Debug, Clone)]
pub struct ContradictionPair {
    pub field: String,
    pub old_id: i64,
    pub old_value: String,
    pub new_id: i64,
    pub new_value: String,
}

/// Outcome of one `remember` call.
#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    pub facts_added: usize,
    pub facts_reinforced: usize,
    pub entities_created: usize,
    pub edges_added: usize,
    pub contradictions: Vec<ContradictionPair>,
    /// True when extraction was skipped (smalltalk or budget).
    pub skipped: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_windows() {
        let now = Utc::now();
        let today = TimeWindow::named("today", now).unwrap();
        assert!(today.contains(now));
        assert!(!today.contains(now - Duration::days(2)));

        assert!(TimeWindow::named("fortnight", now).is_none());
    }

    #[test]
    fn extraction_deserializes_with_defaults() {
        let raw = r#"{"facts":[{"target":"user","domain":9,"field":"city","value":"NYC"}]}"#;
        let ex: Extraction = serde_json::from_str(raw).unwrap();
        assert_eq!(ex.facts.len(), 1);
        assert_eq!(ex.facts[0].confidence, 0.8);
        assert!(ex.entities.is_empty());
    }

    #[test]
    fn entity_kind_roundtrip() {
        for k in ["person", "place", "organization", "concept", "goal", "event", "agent"] {
            let parsed: EntityKind = k.parse().unwrap();
            assert_eq!(parsed.to_string(), k);
        }
        assert!("robot".parse::<EntityKind>().is_err());
    }
}
