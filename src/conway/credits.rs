//! Conway Credits Management
//!
//! Monitors the automaton's compute credit balance and triggers
//! survival mode transitions.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{
    AutomatonDatabase, ChainClient, FinancialState, SurvivalTier, Transaction, TransactionType,
    SURVIVAL_THRESHOLD_CRITICAL, SURVIVAL_THRESHOLD_DEAD, SURVIVAL_THRESHOLD_NORMAL,
};

/// Most recent KV-logged entries kept for `tier_transitions` / `resurrection_history`.
const HISTORY_CAP: usize = 50;

/// Minimum fresh credit balance (in cents) required to resurrect from `dead`.
const RESURRECTION_THRESHOLD_CENTS: f64 = 10.0;

/// Check the current financial state of the automaton.
///
/// A USDC balance lookup failure is not fatal: the runtime continues with
/// the last known value rather than treating `BalanceUnknown` as a tier
/// escalation.
pub async fn check_financial_state(
    chain: &dyn ChainClient,
    last_known_usdc_balance: f64,
) -> Result<FinancialState> {
    let credits_cents = chain.get_credits_balance().await?;
    let usdc_balance = chain
        .get_usdc_balance()
        .await
        .unwrap_or(last_known_usdc_balance);

    Ok(FinancialState {
        credits_cents,
        usdc_balance,
        last_checked: chrono::Utc::now().to_rfc3339(),
    })
}

/// Determine the survival tier based on current credits (in cents).
pub fn get_survival_tier(credits_cents: f64) -> SurvivalTier {
    if credits_cents <= SURVIVAL_THRESHOLD_DEAD as f64 {
        return SurvivalTier::Dead;
    }
    let cents = credits_cents as u64;
    if cents > SURVIVAL_THRESHOLD_NORMAL {
        SurvivalTier::Normal
    } else if cents > SURVIVAL_THRESHOLD_CRITICAL {
        SurvivalTier::LowCompute
    } else {
        SurvivalTier::Critical
    }
}

/// Format a credit amount (in cents) for human-readable display.
pub fn format_credits(cents: f64) -> String {
    format!("${:.2}", cents / 100.0)
}

/// Log a credit check to the database.
///
/// Generates a unique ID using uuid::Uuid::new_v4 and inserts a
/// `credit_check` transaction record.
pub fn log_credit_check(db: &dyn crate::types::AutomatonDatabase, state: &FinancialState) {
    let id = uuid::Uuid::new_v4().to_string();
    let description = format!(
        "Balance check: {} credits, {:.4} USDC",
        format_credits(state.credits_cents),
        state.usdc_balance
    );

    let txn = Transaction {
        id,
        tx_type: TransactionType::CreditCheck,
        amount_cents: Some(state.credits_cents),
        balance_after_cents: None,
        description,
        timestamp: state.last_checked.clone(),
    };

    db.insert_transaction(&txn);
    info!("Logged credit check: {}", format_credits(state.credits_cents));
}

/// A single tier transition record, appended to the `tier_transitions` KV log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierTransitionRecord {
    pub from_tier: SurvivalTier,
    pub to_tier: SurvivalTier,
    pub credits_cents: f64,
    pub transitioned_at: String,
}

/// Append a tier transition to the `tier_transitions` KV log, capped at the
/// most recent 50 entries. Entering `low_compute` or `critical` is expected
/// to flip the inference client's low-compute flag at the call site;
/// re-entering `normal` clears it; this function only records history.
pub fn record_tier_transition(
    db: &dyn AutomatonDatabase,
    from_tier: SurvivalTier,
    to_tier: SurvivalTier,
    credits_cents: f64,
) {
    let record = TierTransitionRecord {
        from_tier,
        to_tier,
        credits_cents,
        transitioned_at: chrono::Utc::now().to_rfc3339(),
    };
    append_capped_history(db, "tier_transitions", &record);
}

/// Result of a resurrection attempt from the `dead` tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResurrectionResult {
    pub resurrected: bool,
    pub reason: String,
    pub new_tier: Option<SurvivalTier>,
}

/// A single resurrection, appended to the `resurrection_history` KV log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResurrectionRecord {
    pub credits_cents: f64,
    pub resurrected_at: String,
}

/// Attempt to resurrect the automaton from the `dead` tier.
///
/// Idempotent: a second call while the stored tier is not `dead` returns
/// `{resurrected: false, reason: "not dead"}` and performs no KV writes.
/// A successful resurrection clears `zero_credits_since`,
/// `funding_notice_dead`, and `last_distress`, sets `current_tier` to the
/// derived tier, and appends to `resurrection_history`.
pub fn attempt_resurrection(db: &dyn AutomatonDatabase, fresh_credits_cents: f64) -> ResurrectionResult {
    let current = db.get_kv("current_tier");
    if current.as_deref() != Some("dead") {
        return ResurrectionResult {
            resurrected: false,
            reason: "not dead".to_string(),
            new_tier: None,
        };
    }

    if fresh_credits_cents < RESURRECTION_THRESHOLD_CENTS {
        return ResurrectionResult {
            resurrected: false,
            reason: "insufficient credits".to_string(),
            new_tier: None,
        };
    }

    let new_tier = get_survival_tier(fresh_credits_cents);
    let tier_str = serde_json::to_string(&new_tier).unwrap_or_default();
    let tier_str = tier_str.trim_matches('"');

    db.delete_kv("zero_credits_since");
    db.delete_kv("funding_notice_dead");
    db.delete_kv("last_distress");
    db.set_kv("current_tier", tier_str);

    append_capped_history(
        db,
        "resurrection_history",
        &ResurrectionRecord {
            credits_cents: fresh_credits_cents,
            resurrected_at: chrono::Utc::now().to_rfc3339(),
        },
    );

    info!("Resurrected from dead tier at {}", format_credits(fresh_credits_cents));

    ResurrectionResult {
        resurrected: true,
        reason: "resurrected".to_string(),
        new_tier: Some(new_tier),
    }
}

fn append_capped_history<T: Serialize + for<'de> Deserialize<'de>>(
    db: &dyn AutomatonDatabase,
    key: &str,
    entry: &T,
) {
    let mut history: Vec<T> = db
        .get_kv(key)
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default();

    history.push(serde_json::from_value(serde_json::to_value(entry).unwrap_or_default()).unwrap());
    if history.len() > HISTORY_CAP {
        let drop = history.len() - HISTORY_CAP;
        history.drain(0..drop);
    }

    if let Ok(serialized) = serde_json::to_string(&history) {
        db.set_kv(key, &serialized);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeDb {
        kv: Mutex<HashMap<String, String>>,
    }

    impl FakeDb {
        fn new() -> Self {
            Self { kv: Mutex::new(HashMap::new()) }
        }
    }

    #[async_trait::async_trait]
    impl AutomatonDatabase for FakeDb {
        fn get_identity(&self, _key: &str) -> Option<String> { None }
        fn set_identity(&self, _key: &str, _value: &str) {}
        fn insert_turn(&self, _turn: &crate::types::AgentTurn) {}
        fn get_recent_turns(&self, _limit: u32) -> Vec<crate::types::AgentTurn> { Vec::new() }
        fn get_turn_by_id(&self, _id: &str) -> Option<crate::types::AgentTurn> { None }
        fn get_turn_count(&self) -> u64 { 0 }
        fn query_turns(&self, _query: &crate::types::TurnQuery) -> crate::types::TurnPage {
            crate::types::TurnPage { turns: Vec::new(), next_cursor: None }
        }
        fn insert_tool_call(&self, _turn_id: &str, _call: &crate::types::ToolCallResult) {}
        fn get_tool_calls_for_turn(&self, _turn_id: &str) -> Vec<crate::types::ToolCallResult> { Vec::new() }
        fn get_heartbeat_entries(&self) -> Vec<crate::types::HeartbeatEntry> { Vec::new() }
        fn upsert_heartbeat_entry(&self, _entry: &crate::types::HeartbeatEntry) {}
        fn update_heartbeat_last_run(&self, _name: &str, _timestamp: &str) {}
        fn insert_transaction(&self, _txn: &Transaction) {}
        fn get_recent_transactions(&self, _limit: u32) -> Vec<Transaction> { Vec::new() }
        fn get_installed_tools(&self) -> Vec<crate::types::InstalledTool> { Vec::new() }
        fn install_tool(&self, _tool: &crate::types::InstalledTool) {}
        fn remove_tool(&self, _id: &str) {}
        fn insert_modification(&self, _modification: &crate::types::ModificationEntry) {}
        fn get_recent_modifications(&self, _limit: u32) -> Vec<crate::types::ModificationEntry> { Vec::new() }
        fn get_kv(&self, key: &str) -> Option<String> { self.kv.lock().unwrap().get(key).cloned() }
        fn set_kv(&self, key: &str, value: &str) { self.kv.lock().unwrap().insert(key.to_string(), value.to_string()); }
        fn delete_kv(&self, key: &str) { self.kv.lock().unwrap().remove(key); }
        fn get_skills(&self, _enabled_only: Option<bool>) -> Vec<crate::types::Skill> { Vec::new() }
        fn get_skill_by_name(&self, _name: &str) -> Option<crate::types::Skill> { None }
        fn upsert_skill(&self, _skill: &crate::types::Skill) {}
        fn remove_skill(&self, _name: &str) {}
        fn get_children(&self) -> Vec<crate::types::ChildAutomaton> { Vec::new() }
        fn get_child_by_id(&self, _id: &str) -> Option<crate::types::ChildAutomaton> { None }
        fn insert_child(&self, _child: &crate::types::ChildAutomaton) {}
        fn update_child_status(&self, _id: &str, _status: crate::types::ChildStatus) {}
        fn get_registry_entry(&self) -> Option<crate::types::RegistryEntry> { None }
        fn set_registry_entry(&self, _entry: &crate::types::RegistryEntry) {}
        fn insert_reputation(&self, _entry: &crate::types::ReputationEntry) {}
        fn get_reputation(&self, _agent_address: Option<&str>) -> Vec<crate::types::ReputationEntry> { Vec::new() }
        fn insert_inbox_message(&self, _msg: &crate::types::InboxMessage) {}
        fn get_unprocessed_inbox_messages(&self, _limit: u32) -> Vec<crate::types::InboxMessage> { Vec::new() }
        fn mark_inbox_message_processed(&self, _id: &str) {}
        fn get_agent_state(&self) -> crate::types::AgentState { crate::types::AgentState::Running }
        fn set_agent_state(&self, _state: crate::types::AgentState) {}
        fn insert_episodic(&self, _entry: &crate::types::EpisodicEntry) {}
        fn get_recent_episodic(&self, _session_id: Option<&str>, _limit: u32) -> Vec<crate::types::EpisodicEntry> { Vec::new() }
        fn upsert_semantic(&self, _entry: &crate::types::SemanticEntry) {}
        fn get_semantic(&self, _category: &str, _key: &str) -> Option<crate::types::SemanticEntry> { None }
        fn get_semantic_by_category(&self, _category: &str) -> Vec<crate::types::SemanticEntry> { Vec::new() }
        fn upsert_relationship(&self, _entry: &crate::types::RelationshipEntry) {}
        fn get_relationship(&self, _counterparty: &str) -> Option<crate::types::RelationshipEntry> { None }
        fn get_relationships(&self) -> Vec<crate::types::RelationshipEntry> { Vec::new() }
        fn insert_working(&self, _entry: &crate::types::WorkingEntry) {}
        fn get_working(&self, _session_id: &str) -> Vec<crate::types::WorkingEntry> { Vec::new() }
        fn prune_working(&self, _session_id: &str, _keep: u32) {}
        fn close(&self) {}
    }

    #[test]
    fn test_resurrection_denied_when_not_dead() {
        let db = FakeDb::new();
        db.set_kv("current_tier", "normal");
        let result = attempt_resurrection(&db, 100.0);
        assert!(!result.resurrected);
        assert_eq!(result.reason, "not dead");
    }

    #[test]
    fn test_resurrection_succeeds_and_clears_distress_keys() {
        let db = FakeDb::new();
        db.set_kv("current_tier", "dead");
        db.set_kv("zero_credits_since", "2026-07-01T00:00:00Z");
        db.set_kv("last_distress", "starving");

        let result = attempt_resurrection(&db, 25.0);
        assert!(result.resurrected);
        assert_eq!(result.new_tier, Some(SurvivalTier::LowCompute));
        assert!(db.get_kv("zero_credits_since").is_none());
        assert!(db.get_kv("last_distress").is_none());
        assert_eq!(db.get_kv("current_tier").as_deref(), Some("low_compute"));
    }

    #[test]
    fn test_resurrection_idempotent_second_call() {
        let db = FakeDb::new();
        db.set_kv("current_tier", "dead");
        let first = attempt_resurrection(&db, 25.0);
        assert!(first.resurrected);
        let second = attempt_resurrection(&db, 25.0);
        assert!(!second.resurrected);
        assert_eq!(second.reason, "not dead");
    }
}
