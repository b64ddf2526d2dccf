//! Context assembly: the system prompt for one turn, in the fixed order
//! the rest of the stack relies on:
//!
//! 1. static personality baseline
//! 2. agent-self facts (override the baseline on conflict)
//! 3. routed user facts, entities, and graph edges
//! 4. working-note keys with relative staleness (never content)
//! 5. current date/time in the configured zone
//!
//! The session buffer rides as chat messages between this prompt and the
//! new user turn, so the model sees it after everything above.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use kora_memory::types::{Note, RecallResult};
use kora_memory::Domain;

/// Build the system prompt for one turn.
pub fn assemble_system(
    baseline: &str,
    recall: &RecallResult,
    notes: &[Note],
    now: DateTime<Utc>,
    tz: Tz,
) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str(baseline);

    if !recall.agent_facts.is_empty() {
        out.push_str("\n\n## Your current self\n");
        out.push_str("These override anything above:\n");
        for f in &recall.agent_facts {
            out.push_str(&format!("- {}: {}\n", f.field, f.value));
        }
    }

    if !recall.facts.is_empty() || !recall.entities.is_empty() {
        out.push_str("\n\n## What you remember\n");
        for sf in &recall.facts {
            let domain = Domain::from_id(sf.fact.domain_id)
                .map(|d| d.name())
                .unwrap_or("?");
            out.push_str(&format!("- [{domain}] {}: {}\n", sf.fact.field, sf.fact.value));
        }
        for f in &recall.neighbor_facts {
            out.push_str(&format!("- {}: {}\n", f.field, f.value));
        }
        if !recall.edges.is_empty() {
            out.push_str("Connections:\n");
            for e in &recall.edges {
                let src = name_of(recall, e.source_id);
                let tgt = name_of(recall, e.target_id);
                out.push_str(&format!("- {src} {} {tgt}\n", e.relation));
            }
        }
        if recall.degraded {
            out.push_str("(semantic recall was unavailable for this turn)\n");
        }
    }

    if !notes.is_empty() {
        out.push_str("\n\n## Active notes\n");
        out.push_str("Keys only; use get_note to read one:\n");
        for n in notes {
            out.push_str(&format!("- {} ({})\n", n.key, humanize_age(&n.updated_at, now)));
        }
    }

    out.push_str(&format!(
        "\n\nCurrent time: {}",
        now.with_timezone(&tz).format("%A %Y-%m-%d %H:%M %Z")
    ));
    out
}

fn name_of(recall: &RecallResult, entity_id: i64) -> String {
    recall
        .entities
        .iter()
        .find(|e| e.id == entity_id)
        .map(|e| e.name.clone())
        .unwrap_or_else(|| format!("#{entity_id}"))
}

/// Relative staleness: "0s ago", "5h ago", "3d ago".
pub fn humanize_age(updated_at: &str, now: DateTime<Utc>) -> String {
    let Ok(t) = DateTime::parse_from_rfc3339(updated_at) else {
        return "unknown age".to_string();
    };
    let secs = (now - t.with_timezone(&Utc)).num_seconds().max(0);
    let rendered = if secs < 60 {
        format!("{secs}s")
    } else if secs < 60 * 60 {
        format!("{}m", secs / 60)
    } else if secs < 24 * 60 * 60 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86_400)
    };
    format!("{rendered} ago")
}

/// Wrap a user message with a timestamp envelope so the model sees when
/// each turn occurred. Assistant turns stay bare.
pub fn format_envelope(transport: &str, at: &str, content: &str) -> String {
    match DateTime::parse_from_rfc3339(at) {
        Ok(dt) => format!(
            "[{} {}] {}",
            transport,
            dt.with_timezone(&Utc).format("%Y-%m-%d %H:%M UTC"),
            content
        ),
        Err(_) => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kora_memory::types::{Fact, ScoredFact};

    fn fact(field: &str, value: &str, domain: i64) -> Fact {
        Fact {
            id: 1,
            entity_id: None,
            domain_id: domain,
            field: field.to_string(),
            value: value.to_string(),
            confidence: 0.9,
            access_count: 0,
            last_accessed: None,
            supersedes: None,
            active: true,
            score: 0.0,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn sections_appear_in_fixed_order() {
        let recall = RecallResult {
            facts: vec![ScoredFact {
                fact: fact("city", "LA", 9),
                score: 0.8,
            }],
            agent_facts: vec![fact("tone_preference", "concise", 1)],
            ..Default::default()
        };
        let notes = vec![Note {
            key: "meal_plan".to_string(),
            content: "{}".to_string(),
            tier: kora_memory::NoteTier::Working,
            updated_at: (Utc::now() - chrono::Duration::hours(5)).to_rfc3339(),
        }];

        let system = assemble_system(
            "Default tone: warm but direct.",
            &recall,
            &notes,
            Utc::now(),
            chrono_tz::UTC,
        );

        let baseline = system.find("warm but direct").unwrap();
        let agent = system.find("tone_preference: concise").unwrap();
        let facts = system.find("[Place] city: LA").unwrap();
        let note_keys = system.find("meal_plan (5h ago)").unwrap();
        let time = system.find("Current time:").unwrap();
        assert!(baseline < agent && agent < facts && facts < note_keys && note_keys < time);
        // Note keys only; the content stays behind get_note.
        assert!(!system[note_keys..].contains("{}"));
    }

    #[test]
    fn empty_recall_keeps_prompt_minimal() {
        let system = assemble_system(
            "baseline",
            &RecallResult::default(),
            &[],
            Utc::now(),
            chrono_tz::UTC,
        );
        assert!(system.starts_with("baseline"));
        assert!(!system.contains("## What you remember"));
        assert!(system.contains("Current time:"));
    }

    #[test]
    fn ages_render_human_scale() {
        let now = Utc::now();
        assert_eq!(humanize_age(&now.to_rfc3339(), now), "0s ago");
        assert_eq!(
            humanize_age(&(now - chrono::Duration::minutes(7)).to_rfc3339(), now),
            "7m ago"
        );
        assert_eq!(
            humanize_age(&(now - chrono::Duration::days(3)).to_rfc3339(), now),
            "3d ago"
        );
        assert_eq!(humanize_age("garbage", now), "unknown age");
    }
}
