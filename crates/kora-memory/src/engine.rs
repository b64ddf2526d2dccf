//! The memory engine: the public Recall / Remember / Traverse / Decay
//! surface the agent loop consumes.
//!
//! Recall merges the keyword, semantic, and graph passes and always layers
//! agent-self facts on top. Remember runs the extractor and persists its
//! output with contradiction superseding. Both degrade instead of failing
//! when the embedder is unreachable.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use kora_core::DomainId;
use tracing::{debug, info, warn};

use crate::embed::{cosine_similarity, Embedder};
use crate::error::{MemoryError, Result};
use crate::extract::{is_smalltalk, Extractor};
use crate::store::{significant_words, FactUpsert, SqliteStore};
use crate::types::*;

/// Per-domain caps for the keyword pass.
const PRIMARY_DOMAIN_CAP: usize = 20;
const RELATED_DOMAIN_CAP: usize = 5;
/// Semantic pass result cap.
const SEMANTIC_CAP: usize = 20;
/// Graph expansion bounds.
const NEIGHBOR_CAP: usize = 5;
const NEIGHBOR_FACT_CAP: usize = 3;

pub const DEFAULT_RECALL_LIMIT: usize = 10;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Days until a fact's recency component reaches zero.
    pub stale_after_days: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stale_after_days: 90.0,
        }
    }
}

pub struct MemoryEngine {
    store: Arc<SqliteStore>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn Extractor>,
    config: EngineConfig,
}

impl MemoryEngine {
    pub fn new(
        store: Arc<SqliteStore>,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn Extractor>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            extractor,
            config,
        }
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    // --- recall ------------------------------------------------------------

    /// Retrieve facts, entities, and graph context for a query.
    ///
    /// `primary` domains contribute up to 20 keyword hits each, `related` up
    /// to 5. The semantic pass adds the 20 nearest fact vectors within
    /// P∪R; a dead embedder only flips `degraded`, and the keyword results
    /// still come back. Returned facts get their access count bumped.
    pub async fn recall(
        &self,
        query: &str,
        primary: &[DomainId],
        related: &[DomainId],
        limit: usize,
        opts: &RecallOptions,
    ) -> Result<RecallResult> {
        let limit = if limit == 0 { DEFAULT_RECALL_LIMIT } else { limit };
        let depth = opts.depth.clamp(1, 3);
        let now = Utc::now();

        let mut merged: HashMap<i64, Fact> = HashMap::new();

        // 1. Keyword pass.
        let words = significant_words(query);
        for d in primary {
            for f in self.store.keyword_search(*d, &words, PRIMARY_DOMAIN_CAP)? {
                merged.entry(f.id).or_insert(f);
            }
        }
        for d in related {
            for f in self.store.keyword_search(*d, &words, RELATED_DOMAIN_CAP)? {
                merged.entry(f.id).or_insert(f);
            }
        }

        // 2. Semantic pass. Embedder failure degrades to keyword-only.
        let mut degraded = false;
        let all_domains: Vec<DomainId> = primary
            .iter()
            .chain(related.iter())
            .copied()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        match self.embedder.embed(query).await {
            Ok(qvec) => {
                let mut scored: Vec<(i64, f32)> = self
                    .store
                    .candidate_vectors(&all_domains)?
                    .into_iter()
                    .map(|(id, v)| (id, cosine_similarity(&qvec, &v)))
                    .collect();
                scored.sort_by(|a, b| b.1.total_cmp(&a.1));
                scored.truncate(SEMANTIC_CAP);
                let ids: Vec<i64> = scored.iter().map(|(id, _)| *id).collect();
                for f in self.store.facts_by_ids(&ids)? {
                    if f.active {
                        merged.entry(f.id).or_insert(f);
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "embedder unavailable, semantic pass skipped");
                degraded = true;
            }
        }

        // 6. Time filter (before scoring so the cut respects the limit).
        if let Some(window) = &opts.window {
            merged.retain(|_, f| match parse_ts(&f.created_at) {
                Some(t) => window.contains(t),
                None => false,
            });
        }

        // 3. Merge & score.
        let mut facts: Vec<ScoredFact> = merged
            .into_values()
            .map(|fact| {
                let score = recall_score(&fact, now, self.config.stale_after_days);
                ScoredFact { fact, score }
            })
            .collect();
        facts.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(b.fact.confidence.total_cmp(&a.fact.confidence))
                .then(b.fact.created_at.cmp(&a.fact.created_at))
                .then(a.fact.id.cmp(&b.fact.id))
        });
        facts.truncate(limit);

        // 4. Graph expansion around the entities of the top facts.
        let seeds: Vec<i64> = facts.iter().filter_map(|sf| sf.fact.entity_id).collect();
        let (entities, edges, neighbor_facts) = self.expand_graph(&seeds, depth)?;

        // 5. Agent self-load, unconditional of routing.
        let agent_facts = if opts.include_agent {
            let agent = self.store.agent_entity()?;
            self.store.facts_for_entity(agent.id, usize::MAX / 2)?
        } else {
            Vec::new()
        };

        // 7. Side effect: record the retrieval.
        let ids: Vec<i64> = facts.iter().map(|sf| sf.fact.id).collect();
        self.store.bump_access(&ids)?;

        debug!(
            facts = facts.len(),
            entities = entities.len(),
            degraded,
            "recall complete"
        );
        Ok(RecallResult {
            facts,
            entities,
            edges,
            neighbor_facts,
            agent_facts,
            degraded,
        })
    }

    /// Breadth-first outbound expansion, bounded to 5 neighbors per entity
    /// and 3 facts per neighbor.
    fn expand_graph(
        &self,
        seeds: &[i64],
        depth: usize,
    ) -> Result<(Vec<Entity>, Vec<Edge>, Vec<Fact>)> {
        let mut seen: HashSet<i64> = HashSet::new();
        let mut entities = Vec::new();
        let mut edges = Vec::new();
        let mut neighbor_facts = Vec::new();

        let mut frontier: VecDeque<(i64, usize)> = VecDeque::new();
        for id in seeds {
            if seen.insert(*id) {
                frontier.push_back((*id, 0));
                if let Some(e) = self.store.get_entity(*id)? {
                    entities.push(e);
                }
            }
        }

        while let Some((id, dist)) = frontier.pop_front() {
            if dist >= depth {
                continue;
            }
            for edge in self.store.outbound_edges(id, None, NEIGHBOR_CAP)? {
                let target = edge.target_id;
                edges.push(edge);
                if seen.insert(target) {
                    if let Some(e) = self.store.get_entity(target)? {
                        entities.push(e);
                    }
                    neighbor_facts
                        .extend(self.store.facts_for_entity(target, NEIGHBOR_FACT_CAP)?);
                    frontier.push_back((target, dist + 1));
                }
            }
        }
        Ok((entities, edges, neighbor_facts))
    }

    // --- remember ----------------------------------------------------------

    /// Extract and persist facts/entities/edges from one conversation turn.
    ///
    /// Called from a background task; failures here must never reach the
    /// user-facing reply. Smalltalk replies skip the extractor call
    /// entirely.
    pub async fn remember(&self, user_msg: &str, assistant_msg: &str) -> Result<ExtractionReport> {
        if is_smalltalk(assistant_msg) {
            debug!("smalltalk reply, extraction skipped");
            return Ok(ExtractionReport {
                skipped: true,
                ..Default::default()
            });
        }

        let extraction = self.extractor.extract(user_msg, assistant_msg).await?;
        self.persist_extraction(extraction).await
    }

    /// Persist an already-extracted turn. Split out so tests and replay
    /// paths can bypass the LLM.
    pub async fn persist_extraction(&self, extraction: Extraction) -> Result<ExtractionReport> {
        let mut report = ExtractionReport::default();

        // Entities first, so facts and edges can resolve them by name.
        for ex in &extraction.entities {
            let (entity, created) = self.store.resolve_entity(&ex.name, ex.kind, ex.domain)?;
            if created {
                report.entities_created += 1;
                self.embed_and_store("entity", entity.id, entity.domain_id, &entity.name)
                    .await;
            }
        }

        let agent = self.store.agent_entity()?;
        for ef in &extraction.facts {
            let entity_id = match (ef.target, &ef.entity_name) {
                (FactTarget::Agent, _) => Some(agent.id),
                (FactTarget::User, Some(name)) => {
                    let kind = extraction
                        .entities
                        .iter()
                        .find(|e| e.name.eq_ignore_ascii_case(name))
                        .map(|e| e.kind)
                        .unwrap_or(EntityKind::Person);
                    let (entity, created) = self.store.resolve_entity(name, kind, ef.domain)?;
                    if created {
                        report.entities_created += 1;
                    }
                    Some(entity.id)
                }
                (FactTarget::User, None) => None,
            };

            match self
                .store
                .upsert_fact(entity_id, ef.domain, &ef.field, &ef.value, ef.confidence)?
            {
                FactUpsert::Inserted(fact) => {
                    report.facts_added += 1;
                    self.embed_and_store("fact", fact.id, fact.domain_id, &fact_text(&fact))
                        .await;
                }
                FactUpsert::Reinforced(_) => report.facts_reinforced += 1,
                FactUpsert::Superseded { old, new } => {
                    report.facts_added += 1;
                    report.contradictions.push(ContradictionPair {
                        field: new.field.clone(),
                        old_id: old.id,
                        old_value: old.value.clone(),
                        new_id: new.id,
                        new_value: new.value.clone(),
                    });
                    self.embed_and_store("fact", new.id, new.domain_id, &fact_text(&new))
                        .await;
                }
            }
        }

        for ee in &extraction.edges {
            let src = self.entity_by_name(&ee.source_name)?;
            let tgt = self.entity_by_name(&ee.target_name)?;
            match (src, tgt) {
                (Some(src), Some(tgt)) => {
                    self.store.upsert_edge(
                        src.id,
                        tgt.id,
                        &ee.relation,
                        0.8,
                        serde_json::json!({}),
                    )?;
                    report.edges_added += 1;
                }
                _ => {
                    warn!(
                        source = %ee.source_name,
                        target = %ee.target_name,
                        relation = %ee.relation,
                        "edge endpoints unresolved, skipping"
                    );
                }
            }
        }

        info!(
            facts = report.facts_added,
            reinforced = report.facts_reinforced,
            entities = report.entities_created,
            edges = report.edges_added,
            contradictions = report.contradictions.len(),
            "turn remembered"
        );
        Ok(report)
    }

    // --- explicit mutations -------------------------------------------------

    /// Explicit fact insertion (tool path). Same contradiction logic as
    /// remember; errors surface to the caller.
    pub async fn add_fact(
        &self,
        entity_id: Option<i64>,
        domain_id: DomainId,
        field: &str,
        value: &str,
        confidence: f64,
    ) -> Result<Fact> {
        let up = self
            .store
            .upsert_fact(entity_id, domain_id, field, value, confidence)?;
        if !matches!(up, FactUpsert::Reinforced(_)) {
            let f = up.fact();
            self.embed_and_store("fact", f.id, f.domain_id, &fact_text(f)).await;
        }
        Ok(up.fact().clone())
    }

    pub async fn create_entity(
        &self,
        name: &str,
        kind: EntityKind,
        domain_id: DomainId,
        metadata: serde_json::Value,
    ) -> Result<Entity> {
        let entity = self.store.create_entity(name, kind, domain_id, metadata)?;
        self.embed_and_store("entity", entity.id, entity.domain_id, &entity.name)
            .await;
        Ok(entity)
    }

    pub fn find_entities(
        &self,
        name: Option<&str>,
        kind: Option<EntityKind>,
        domain_id: Option<DomainId>,
    ) -> Result<Vec<Entity>> {
        self.store.find_entities(name, kind, domain_id)
    }

    pub fn add_edge(
        &self,
        source_id: i64,
        target_id: i64,
        relation: &str,
        strength: f64,
        metadata: serde_json::Value,
    ) -> Result<Edge> {
        self.store
            .upsert_edge(source_id, target_id, relation, strength, metadata)
    }

    /// Outbound subgraph from one entity. Depth 0 returns just the start
    /// node; each extra level includes one more hop of neighbors.
    pub fn traverse(
        &self,
        start: i64,
        depth: usize,
        relation_filter: Option<&str>,
    ) -> Result<Graph> {
        let start_entity = self
            .store
            .get_entity(start)?
            .ok_or_else(|| MemoryError::NotFound(format!("entity {start}")))?;

        let mut graph = Graph {
            entities: vec![start_entity],
            edges: Vec::new(),
        };
        let mut seen: HashSet<i64> = [start].into_iter().collect();
        let mut frontier: VecDeque<(i64, usize)> = VecDeque::from([(start, 0)]);

        while let Some((id, dist)) = frontier.pop_front() {
            if dist >= depth {
                continue;
            }
            for edge in self.store.outbound_edges(id, relation_filter, NEIGHBOR_CAP)? {
                let target = edge.target_id;
                graph.edges.push(edge);
                if seen.insert(target) {
                    if let Some(e) = self.store.get_entity(target)? {
                        graph.entities.push(e);
                    }
                    frontier.push_back((target, dist + 1));
                }
            }
        }
        Ok(graph)
    }

    // --- notes (passthrough) ------------------------------------------------

    pub fn save_note(&self, key: &str, content: &str) -> Result<Note> {
        self.store.save_note(key, content)
    }
    pub fn get_note(&self, key: &str) -> Result<Option<Note>> {
        self.store.get_note(key)
    }
    pub fn get_notes(&self, keys: &[String]) -> Result<Vec<Note>> {
        self.store.get_notes(keys)
    }
    pub fn archive_note(&self, old_key: &str, new_key: &str) -> Result<Note> {
        self.store.archive_note(old_key, new_key)
    }
    pub fn restore_note(&self, key: &str) -> Result<Note> {
        self.store.restore_note(key)
    }
    pub fn list_notes(&self) -> Result<Vec<Note>> {
        self.store.list_notes()
    }
    pub fn list_archived_notes(&self, pattern: &str) -> Result<Vec<Note>> {
        self.store.list_archived_notes(pattern)
    }
    pub fn delete_note(&self, key: &str) -> Result<()> {
        self.store.delete_note(key)
    }

    // --- decay --------------------------------------------------------------

    /// One decay pass. Returns the number of rescored facts.
    pub fn decay(&self) -> Result<usize> {
        let n = self.store.decay_scores(self.config.stale_after_days)?;
        info!(facts = n, "decay pass complete");
        Ok(n)
    }

    /// Long-lived decay task: one pass per interval until shutdown.
    pub async fn run_decay_loop(
        self: Arc<Self>,
        interval_secs: u64,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.decay() {
                        warn!(error = %e, "decay pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    // --- helpers ------------------------------------------------------------

    fn entity_by_name(&self, name: &str) -> Result<Option<Entity>> {
        let hits = self.store.find_entities(Some(name), None, None)?;
        Ok(hits
            .into_iter()
            .find(|e| e.name.eq_ignore_ascii_case(name)))
    }

    /// Embed text and store the vector; failure is logged, never fatal:
    /// the row simply stays invisible to the semantic pass.
    async fn embed_and_store(&self, kind: &str, ref_id: i64, domain_id: DomainId, text: &str) {
        match self.embedder.embed(text).await {
            Ok(v) => {
                if let Err(e) = self.store.put_vector(kind, ref_id, domain_id, &v) {
                    warn!(error = %e, kind, ref_id, "vector write failed");
                }
            }
            Err(e) => warn!(error = %e, kind, ref_id, "embedding failed, stored without vector"),
        }
    }
}

/// Merge score: `0.5·confidence + 0.3·recency + 0.2·frequency`.
pub fn recall_score(fact: &Fact, now: DateTime<Utc>, stale_after_days: f64) -> f64 {
    let age_days = parse_ts(&fact.created_at)
        .map(|t| (now - t).num_seconds() as f64 / 86_400.0)
        .unwrap_or(stale_after_days);
    let recency = (1.0 - age_days / stale_after_days).max(0.0);
    let frequency = (fact.access_count as f64 / 10.0).min(1.0);
    0.5 * fact.confidence + 0.3 * recency + 0.2 * frequency
}

fn fact_text(fact: &Fact) -> String {
    format!("{}: {}", fact.field, fact.value)
}

fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::embed::HashEmbedder;
    use async_trait::async_trait;

    const DIM: usize = 16;

    /// Extractor returning a canned result.
    struct FixedExtractor(Extraction);

    #[async_trait]
    impl Extractor for FixedExtractor {
        async fn extract(&self, _u: &str, _a: &str) -> Result<Extraction> {
            Ok(self.0.clone())
        }
    }

    /// Embedder that always fails, for degraded-mode tests.
    struct DeadEmbedder;

    #[async_trait]
    impl Embedder for DeadEmbedder {
        fn dim(&self) -> usize {
            DIM
        }
        async fn embed(&self, _t: &str) -> Result<Vec<f32>> {
            Err(MemoryError::Embedder("503 service unavailable".into()))
        }
    }

    fn engine_with(extraction: Extraction) -> MemoryEngine {
        MemoryEngine::new(
            Arc::new(SqliteStore::new(open_in_memory(DIM).unwrap())),
            Arc::new(HashEmbedder::new(DIM)),
            Arc::new(FixedExtractor(extraction)),
            EngineConfig::default(),
        )
    }

    fn engine() -> MemoryEngine {
        engine_with(Extraction::default())
    }

    fn city_fact(target: FactTarget, value: &str) -> ExtractedFact {
        ExtractedFact {
            target,
            domain: 9,
            field: "city".to_string(),
            value: value.to_string(),
            confidence: 0.9,
            entity_name: None,
        }
    }

    #[tokio::test]
    async fn empty_store_recall_still_returns_agent_facts() {
        let eng = engine();
        eng.add_fact(
            Some(eng.store.agent_entity().unwrap().id),
            1,
            "tone_preference",
            "concise",
            0.9,
        )
        .await
        .unwrap();

        let r = eng
            .recall("anything", &[9], &[], 10, &RecallOptions::default())
            .await
            .unwrap();
        assert!(r.facts.is_empty());
        assert_eq!(r.agent_facts.len(), 1);
        assert!(!r.degraded);
    }

    #[tokio::test]
    async fn contradiction_across_turns_returns_only_latest() {
        // "I live in NYC" one turn, "I moved to LA" the next: only the
        // move survives as the active city.
        let eng = engine_with(Extraction {
            facts: vec![city_fact(FactTarget::User, "NYC")],
            ..Default::default()
        });
        eng.remember("I live in NYC", "Noted, NYC it is.").await.unwrap();

        let report = eng
            .persist_extraction(Extraction {
                facts: vec![city_fact(FactTarget::User, "LA")],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(report.contradictions.len(), 1);
        assert_eq!(report.contradictions[0].old_value, "NYC");
        assert_eq!(report.contradictions[0].new_value, "LA");

        let r = eng
            .recall("Where do I live?", &[9], &[], 10, &RecallOptions::default())
            .await
            .unwrap();
        let values: Vec<&str> = r.facts.iter().map(|f| f.fact.value.as_str()).collect();
        assert_eq!(values, vec!["LA"]);
    }

    #[tokio::test]
    async fn recall_respects_limit_domains_and_bumps_access() {
        let eng = engine();
        for i in 0..15 {
            eng.add_fact(None, 9, &format!("place_{i}"), &format!("spot {i}"), 0.8)
                .await
                .unwrap();
        }
        eng.add_fact(None, 3, "mood", "a good spot mentally", 0.9)
            .await
            .unwrap();

        let r = eng
            .recall("spot", &[9], &[], 5, &RecallOptions::default())
            .await
            .unwrap();
        assert_eq!(r.facts.len(), 5);
        assert!(r.facts.iter().all(|f| f.fact.domain_id == 9));

        // Invariant 4: access_count incremented exactly once per return.
        let id = r.facts[0].fact.id;
        let before = r.facts[0].fact.access_count;
        let f = eng.store.get_fact(id).unwrap().unwrap();
        assert_eq!(f.access_count, before + 1);
        assert!(f.last_accessed.is_some());
    }

    #[tokio::test]
    async fn dead_embedder_degrades_to_keyword_pass() {
        let eng = MemoryEngine::new(
            Arc::new(SqliteStore::new(open_in_memory(DIM).unwrap())),
            Arc::new(DeadEmbedder),
            Arc::new(FixedExtractor(Extraction::default())),
            EngineConfig::default(),
        );
        eng.add_fact(None, 9, "city", "LA", 0.9).await.unwrap();
        let r = eng
            .recall("city", &[9], &[], 10, &RecallOptions::default())
            .await
            .unwrap();
        assert!(r.degraded);
        assert_eq!(r.facts.len(), 1);
    }

    #[tokio::test]
    async fn semantic_pass_finds_facts_the_keyword_pass_misses() {
        let eng = engine();
        eng.add_fact(None, 9, "home", "downtown LA apartment", 0.9)
            .await
            .unwrap();
        // "LA" is under the 3-char keyword cutoff, so only the vector pass
        // can surface this fact.
        let r = eng
            .recall("LA", &[9], &[], 10, &RecallOptions::default())
            .await
            .unwrap();
        assert_eq!(r.facts.len(), 1);
        assert_eq!(r.facts[0].fact.field, "home");
    }

    #[tokio::test]
    async fn remember_then_recall_roundtrip_keeps_confidence() {
        let eng = engine_with(Extraction {
            facts: vec![ExtractedFact {
                target: FactTarget::User,
                domain: 12,
                field: "medication".to_string(),
                value: "take meds".to_string(),
                confidence: 0.7,
                entity_name: None,
            }],
            ..Default::default()
        });
        let report = eng
            .remember("Remind me to take meds", "Will do, daily at 20:00.")
            .await
            .unwrap();
        assert_eq!(report.facts_added, 1);

        let r = eng
            .recall("meds", &[12], &[], 10, &RecallOptions::default())
            .await
            .unwrap();
        assert_eq!(r.facts.len(), 1);
        assert_eq!(r.facts[0].fact.confidence, 0.7);
    }

    #[tokio::test]
    async fn smalltalk_turn_skips_extraction() {
        let eng = engine_with(Extraction {
            facts: vec![city_fact(FactTarget::User, "NYC")],
            ..Default::default()
        });
        let report = eng.remember("thanks!", "Anytime!").await.unwrap();
        assert!(report.skipped);
        assert_eq!(report.facts_added, 0);
    }

    #[tokio::test]
    async fn agent_target_attaches_to_agent_entity() {
        // "Be more concise." becomes a fact on the agent entity itself.
        let eng = engine_with(Extraction {
            facts: vec![ExtractedFact {
                target: FactTarget::Agent,
                domain: 1,
                field: "tone_preference".to_string(),
                value: "concise".to_string(),
                confidence: 0.9,
                entity_name: None,
            }],
            ..Default::default()
        });
        eng.remember("Be more concise.", "Understood, keeping it short.")
            .await
            .unwrap();

        // Recall routed anywhere still carries the agent fact.
        let r = eng
            .recall("unrelated", &[8], &[], 10, &RecallOptions::default())
            .await
            .unwrap();
        assert_eq!(r.agent_facts.len(), 1);
        assert_eq!(r.agent_facts[0].value, "concise");
    }

    #[tokio::test]
    async fn entities_and_edges_resolve_and_expand() {
        let eng = engine_with(Extraction {
            facts: vec![ExtractedFact {
                target: FactTarget::User,
                domain: 7,
                field: "role".to_string(),
                value: "engineer at Acme".to_string(),
                confidence: 0.9,
                entity_name: Some("Dana".to_string()),
            }],
            entities: vec![
                ExtractedEntity {
                    name: "Dana".to_string(),
                    kind: EntityKind::Person,
                    domain: 6,
                },
                ExtractedEntity {
                    name: "Acme".to_string(),
                    kind: EntityKind::Organization,
                    domain: 7,
                },
            ],
            edges: vec![ExtractedEdge {
                source_name: "Dana".to_string(),
                target_name: "Acme".to_string(),
                relation: "works_at".to_string(),
            }],
        });
        let report = eng
            .remember("Dana works at Acme", "Got it, Dana is at Acme.")
            .await
            .unwrap();
        assert_eq!(report.entities_created, 2);
        assert_eq!(report.edges_added, 1);

        let r = eng
            .recall("Acme engineer", &[7], &[6], 10, &RecallOptions::default())
            .await
            .unwrap();
        assert_eq!(r.facts.len(), 1);
        assert!(r.entities.iter().any(|e| e.name == "Dana"));
        assert!(r.entities.iter().any(|e| e.name == "Acme"));
        assert_eq!(r.edges.len(), 1);
        assert_eq!(r.edges[0].relation, "works_at");
    }

    #[tokio::test]
    async fn traverse_depth_zero_is_start_and_grows_monotonically() {
        let eng = engine();
        let a = eng
            .create_entity("A", EntityKind::Person, 6, serde_json::json!({}))
            .await
            .unwrap();
        let b = eng
            .create_entity("B", EntityKind::Person, 6, serde_json::json!({}))
            .await
            .unwrap();
        let c = eng
            .create_entity("C", EntityKind::Organization, 7, serde_json::json!({}))
            .await
            .unwrap();
        eng.add_edge(a.id, b.id, "knows", 0.8, serde_json::json!({})).unwrap();
        eng.add_edge(b.id, c.id, "works_at", 0.8, serde_json::json!({})).unwrap();

        let g0 = eng.traverse(a.id, 0, None).unwrap();
        assert_eq!(g0.entities.len(), 1);
        assert!(g0.edges.is_empty());

        let g1 = eng.traverse(a.id, 1, None).unwrap();
        let g2 = eng.traverse(a.id, 2, None).unwrap();
        assert_eq!(g1.entities.len(), 2);
        assert_eq!(g2.entities.len(), 3);
        // Monotone: every entity at depth d appears at depth d+1.
        for e in &g1.entities {
            assert!(g2.entities.iter().any(|x| x.id == e.id));
        }

        let filtered = eng.traverse(a.id, 2, Some("mentors")).unwrap();
        assert_eq!(filtered.entities.len(), 1);
    }

    #[tokio::test]
    async fn time_window_filters_by_creation() {
        let eng = engine();
        eng.add_fact(None, 13, "event", "moved apartments", 0.9).await.unwrap();
        let now = Utc::now();

        let within = eng
            .recall(
                "moved",
                &[13],
                &[],
                10,
                &RecallOptions {
                    window: Some(TimeWindow::named("today", now).unwrap()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(within.facts.len(), 1);

        let past_only = eng
            .recall(
                "moved",
                &[13],
                &[],
                10,
                &RecallOptions {
                    window: Some(TimeWindow {
                        since: None,
                        until: Some(now - chrono::Duration::days(1)),
                    }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(past_only.facts.is_empty());
    }
}
