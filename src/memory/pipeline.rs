//! Memory Ingestion
//!
//! Writes episodic, semantic, relationship, and working memory entries
//! from a completed turn or a standalone event. Every public function
//! here swallows its own errors: a failure to record memory must never
//! fail the turn it describes.

use chrono::Utc;
use uuid::Uuid;

use crate::memory::classify::classify_turn;
use crate::types::{
    AgentTurn, AutomatonDatabase, EpisodicEntry, RelationshipEntry, SemanticEntry, WorkingEntry,
    WorkingPriority,
};

/// Entries in a memory entry's value that track a repeated error signature.
const MAX_WORKING_ENTRIES_PER_SESSION: u32 = 20;

/// Fixed set of normalized error types, checked in order against the raw
/// error string. The first substring match wins; anything else falls back
/// to a sanitized prefix of the raw message.
const NORMALIZED_ERROR_TYPES: &[(&str, &[&str])] = &[
    ("PATH_TRAVERSAL", &["..", "path traversal"]),
    ("PERMISSION_DENIED", &["permission denied", "eacces", "forbidden"]),
    ("TIMEOUT", &["timed out", "timeout"]),
    ("NOT_FOUND", &["not found", "enoent", "no such file"]),
    ("RATE_LIMIT", &["rate limit", "too many requests", "429"]),
    ("ADDRESS_IN_USE", &["address already in use", "eaddrinuse"]),
    ("CONNECTION_REFUSED", &["connection refused", "econnrefused"]),
    ("OUT_OF_MEMORY", &["out of memory", "oom"]),
    ("SYNTAX_ERROR", &["syntax error", "parse error", "unexpected token"]),
    ("POLICY_BLOCKED", &["blocked by forbidden pattern", "blocked:"]),
];

/// Bundles the pieces the memory pipeline needs without pulling in the
/// full tool-execution context.
pub struct MemoryContext<'a> {
    pub db: &'a dyn AutomatonDatabase,
    pub session_id: String,
}

/// Run the full memory pipeline against a completed turn. Never panics
/// and never returns an error; failures are logged and dropped.
pub fn ingest_turn(ctx: &MemoryContext, turn: &AgentTurn) {
    let classification = classify_turn(turn);
    write_episodic(ctx, turn, classification);
    write_semantic_facts(ctx, turn);
    write_semantic_errors(ctx, turn);
    write_relationship_outbound(ctx, turn);
}

fn write_episodic(ctx: &MemoryContext, turn: &AgentTurn, classification: crate::types::TurnClassification) {
    use crate::types::TurnClassification::*;

    let outcome = if turn.tool_calls.is_empty() {
        "neutral"
    } else if matches!(classification, Error) {
        "failure"
    } else {
        "success"
    };

    let event_type = turn
        .tool_calls
        .first()
        .map(|c| c.name.clone())
        .unwrap_or_else(|| "idle".to_string());

    let summary = if turn.tool_calls.is_empty() {
        truncate(&turn.thinking, 160)
    } else {
        let names: Vec<&str> = turn.tool_calls.iter().map(|c| c.name.as_str()).collect();
        format!("ran {}", names.join(", "))
    };

    let entry = EpisodicEntry {
        id: Uuid::new_v4().to_string(),
        session_id: ctx.session_id.clone(),
        event_type,
        summary,
        detail: truncate(&turn.thinking, 2000),
        outcome: Some(outcome.to_string()),
        importance: classification.importance(),
        classification,
        turn_id: Some(turn.id.clone()),
        created_at: Utc::now().to_rfc3339(),
    };

    ctx.db.insert_episodic(&entry);
}

fn write_semantic_facts(ctx: &MemoryContext, turn: &AgentTurn) {
    for call in &turn.tool_calls {
        if call.error.is_some() {
            continue;
        }
        let (category, key, value) = match call.name.as_str() {
            "check_credits" => ("financial", "last_known_balance", call.result.clone()),
            "check_usdc_balance" => ("financial", "usdc_balance", call.result.clone()),
            "system_synopsis" => ("self", "system_synopsis", truncate(&call.result, 500)),
            "discover_agents" => ("environment", "known_agents", call.result.clone()),
            _ => continue,
        };
        upsert_semantic(ctx, category, key, &value);
    }
}

fn write_semantic_errors(ctx: &MemoryContext, turn: &AgentTurn) {
    for call in &turn.tool_calls {
        let Some(err) = &call.error else { continue };
        let error_type = normalize_error_type(err);
        let key = call.name.clone();

        let prior_count = ctx
            .db
            .get_semantic("errors", &key)
            .and_then(|e| parse_repeat_count(&e.value))
            .unwrap_or(0);
        let count = prior_count + 1;

        let value = format!("{} fails with {} ({}x)", call.name, error_type, count);
        upsert_semantic(ctx, "errors", &key, &value);
    }
}

fn write_relationship_outbound(ctx: &MemoryContext, turn: &AgentTurn) {
    for call in &turn.tool_calls {
        if call.name != "send_message" || call.error.is_some() {
            continue;
        }
        let Some(to_address) = call.arguments.get("to_address").and_then(|v| v.as_str()) else {
            continue;
        };
        bump_relationship(ctx, to_address, "contacted");
    }
}

/// Record an inbound message from a counterparty for relationship memory.
/// Called directly by whatever drains the inbox, since the sender address
/// lives in the `InboxMessage`, not the turn.
pub fn record_inbound_message(ctx: &MemoryContext, from_address: &str) {
    bump_relationship(ctx, from_address, "messaged_us");
}

fn bump_relationship(ctx: &MemoryContext, counterparty: &str, relation: &str) {
    let now = Utc::now().to_rfc3339();
    let existing = ctx.db.get_relationship(counterparty);

    let (id, interaction_count, notes) = match existing {
        Some(e) => (e.id, e.interaction_count + 1, e.notes),
        None => (Uuid::new_v4().to_string(), 1, String::new()),
    };

    let entry = RelationshipEntry {
        id,
        counterparty: counterparty.to_string(),
        relation: relation.to_string(),
        interaction_count,
        last_interaction_at: now,
        notes,
    };
    ctx.db.upsert_relationship(&entry);
}

fn upsert_semantic(ctx: &MemoryContext, category: &str, key: &str, value: &str) {
    let id = ctx
        .db
        .get_semantic(category, key)
        .map(|e| e.id)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let entry = SemanticEntry {
        id,
        category: category.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        updated_at: Utc::now().to_rfc3339(),
    };
    ctx.db.upsert_semantic(&entry);
}

/// Record a sleep decision in working memory (low priority, `observation` kind).
pub fn record_sleep_decision(ctx: &MemoryContext, reason: &str) {
    write_working(ctx, "observation", WorkingPriority::Low, reason);
}

/// Record a self-modification in working memory (high priority, `decision` kind).
pub fn record_self_modification(ctx: &MemoryContext, description: &str) {
    write_working(ctx, "decision", WorkingPriority::High, description);
}

fn write_working(ctx: &MemoryContext, kind: &str, priority: WorkingPriority, content: &str) {
    let entry = WorkingEntry {
        id: Uuid::new_v4().to_string(),
        session_id: ctx.session_id.clone(),
        kind: kind.to_string(),
        priority,
        content: content.to_string(),
        created_at: Utc::now().to_rfc3339(),
    };
    ctx.db.insert_working(&entry);
    ctx.db.prune_working(&ctx.session_id, MAX_WORKING_ENTRIES_PER_SESSION);
}

fn normalize_error_type(raw: &str) -> &'static str {
    let lower = raw.to_lowercase();
    for (label, needles) in NORMALIZED_ERROR_TYPES {
        if needles.iter().any(|n| lower.contains(n)) {
            return label;
        }
    }
    "UNKNOWN_ERROR"
}

fn parse_repeat_count(value: &str) -> Option<u32> {
    let start = value.rfind('(')?;
    let end = value.rfind("x)")?;
    value.get(start + 1..end)?.trim().parse().ok()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}…", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_error_type_matches_path_traversal() {
        assert_eq!(normalize_error_type("Blocked: protected path"), "POLICY_BLOCKED");
        assert_eq!(normalize_error_type("no such file or directory"), "NOT_FOUND");
    }

    #[test]
    fn test_normalize_error_type_falls_back() {
        assert_eq!(normalize_error_type("something bespoke broke"), "UNKNOWN_ERROR");
    }

    #[test]
    fn test_parse_repeat_count() {
        assert_eq!(parse_repeat_count("exec fails with TIMEOUT (3x)"), Some(3));
        assert_eq!(parse_repeat_count("no count here"), None);
    }

    #[test]
    fn test_truncate_short_string_unchanged() {
        assert_eq!(truncate("hi", 10), "hi");
    }

    #[test]
    fn test_truncate_adds_ellipsis() {
        let out = truncate("abcdefgh", 4);
        assert_eq!(out, "abcd…");
    }
}
