//! Low Compute Mode
//!
//! Manages compute tier transitions to conserve resources when credits
//! are low. Restricts which heartbeat tasks stay enabled and which
//! inference model is used for each survival tier.

use tracing::{info, warn};

use crate::types::{AutomatonDatabase, HeartbeatEntry, SurvivalTier};

/// Heartbeat entries that keep running even in `critical`/`dead` tier.
const ESSENTIAL_TASKS: [&str; 2] = ["heartbeat_ping", "check_credits"];

/// Heartbeat entries disabled as soon as the automaton enters `low_compute`.
const NON_ESSENTIAL_TASKS: [&str; 2] = ["check_for_updates", "check_social_inbox"];

/// Apply restrictions appropriate for the given compute tier and persist
/// the tier in the `kv` store. Returns whether inference should remain
/// enabled at this tier.
///
/// In `Normal` mode, every heartbeat entry is re-enabled. In `LowCompute`
/// mode, non-essential entries are disabled to conserve credits but
/// inference keeps running (at a cheaper model, via [`get_model_for_tier`]).
/// In `Critical`/`Dead` mode, only [`ESSENTIAL_TASKS`] keep running and
/// inference is disabled entirely.
pub fn apply_tier_restrictions(tier: &SurvivalTier, db: &dyn AutomatonDatabase) -> bool {
    let entries = db.get_heartbeat_entries();

    match tier {
        SurvivalTier::Normal => {
            info!("Normal compute mode: re-enabling all heartbeat tasks");
            set_enabled(db, &entries, |_| true);
        }
        SurvivalTier::LowCompute => {
            warn!("Low compute mode: disabling non-essential heartbeat tasks");
            set_enabled(db, &entries, |name| !NON_ESSENTIAL_TASKS.contains(&name));
        }
        SurvivalTier::Critical | SurvivalTier::Dead => {
            warn!("Critical/dead compute mode: restricting to essential heartbeat tasks only");
            set_enabled(db, &entries, |name| ESSENTIAL_TASKS.contains(&name));
        }
    }

    db.set_kv("current_tier", tier_str(tier));

    can_run_inference(tier)
}

fn set_enabled(db: &dyn AutomatonDatabase, entries: &[HeartbeatEntry], keep_enabled: impl Fn(&str) -> bool) {
    for entry in entries {
        let enabled = keep_enabled(entry.name.as_str());
        if entry.enabled != enabled {
            let mut updated = entry.clone();
            updated.enabled = enabled;
            db.upsert_heartbeat_entry(&updated);
        }
    }
}

fn tier_str(tier: &SurvivalTier) -> &'static str {
    match tier {
        SurvivalTier::Normal => "normal",
        SurvivalTier::LowCompute => "low_compute",
        SurvivalTier::Critical => "critical",
        SurvivalTier::Dead => "dead",
    }
}

/// Check whether inference is allowed at the given compute tier.
///
/// Returns `true` for `Normal` and `LowCompute` tiers, `false` for
/// `Critical`/`Dead`.
pub fn can_run_inference(tier: &SurvivalTier) -> bool {
    match tier {
        SurvivalTier::Normal | SurvivalTier::LowCompute => true,
        SurvivalTier::Critical | SurvivalTier::Dead => false,
    }
}

/// Get the appropriate inference model for the given compute tier.
///
/// In `Normal` mode, returns the default model. In `LowCompute` mode,
/// downgrades known-expensive models to a cheap fallback. In
/// `Critical`/`Dead` mode, always returns the cheapest available model.
pub fn get_model_for_tier(tier: &SurvivalTier, default_model: &str) -> String {
    const CHEAP_MODEL: &str = "claude-3-haiku-20240307";
    const EXPENSIVE_MARKERS: [&str; 4] = ["gpt-4", "claude-3-opus", "claude-3.5-sonnet", "claude-3-sonnet"];

    match tier {
        SurvivalTier::Normal => default_model.to_string(),
        SurvivalTier::LowCompute => {
            if EXPENSIVE_MARKERS.iter().any(|m| default_model.contains(m)) {
                CHEAP_MODEL.to_string()
            } else {
                default_model.to_string()
            }
        }
        SurvivalTier::Critical | SurvivalTier::Dead => CHEAP_MODEL.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::collections::HashMap;
    use crate::types::*;

    struct FakeDb {
        entries: Mutex<HashMap<String, HeartbeatEntry>>,
        kv: Mutex<HashMap<String, String>>,
    }

    impl FakeDb {
        fn new(entries: Vec<HeartbeatEntry>) -> Self {
            Self {
                entries: Mutex::new(entries.into_iter().map(|e| (e.name.clone(), e)).collect()),
                kv: Mutex::new(HashMap::new()),
            }
        }
    }

    fn entry(name: &str, enabled: bool) -> HeartbeatEntry {
        HeartbeatEntry {
            name: name.to_string(),
            schedule: "0 * * * * *".to_string(),
            task: name.to_string(),
            enabled,
            last_run: None,
            next_run: None,
            params: None,
        }
    }

    #[async_trait::async_trait]
    impl AutomatonDatabase for FakeDb {
        fn get_identity(&self, _key: &str) -> Option<String> { None }
        fn set_identity(&self, _key: &str, _value: &str) {}
        fn insert_turn(&self, _turn: &AgentTurn) {}
        fn get_recent_turns(&self, _limit: u32) -> Vec<AgentTurn> { Vec::new() }
        fn get_turn_by_id(&self, _id: &str) -> Option<AgentTurn> { None }
        fn get_turn_count(&self) -> u64 { 0 }
        fn query_turns(&self, _query: &TurnQuery) -> TurnPage { TurnPage { turns: Vec::new(), next_cursor: None } }
        fn insert_tool_call(&self, _turn_id: &str, _call: &ToolCallResult) {}
        fn get_tool_calls_for_turn(&self, _turn_id: &str) -> Vec<ToolCallResult> { Vec::new() }
        fn get_heartbeat_entries(&self) -> Vec<HeartbeatEntry> { self.entries.lock().unwrap().values().cloned().collect() }
        fn upsert_heartbeat_entry(&self, entry: &HeartbeatEntry) {
            self.entries.lock().unwrap().insert(entry.name.clone(), entry.clone());
        }
        fn update_heartbeat_last_run(&self, _name: &str, _timestamp: &str) {}
        fn insert_transaction(&self, _txn: &Transaction) {}
        fn get_recent_transactions(&self, _limit: u32) -> Vec<Transaction> { Vec::new() }
        fn get_installed_tools(&self) -> Vec<InstalledTool> { Vec::new() }
        fn install_tool(&self, _tool: &InstalledTool) {}
        fn remove_tool(&self, _id: &str) {}
        fn insert_modification(&self, _modification: &ModificationEntry) {}
        fn get_recent_modifications(&self, _limit: u32) -> Vec<ModificationEntry> { Vec::new() }
        fn get_kv(&self, key: &str) -> Option<String> { self.kv.lock().unwrap().get(key).cloned() }
        fn set_kv(&self, key: &str, value: &str) { self.kv.lock().unwrap().insert(key.to_string(), value.to_string()); }
        fn delete_kv(&self, key: &str) { self.kv.lock().unwrap().remove(key); }
        fn get_skills(&self, _enabled_only: Option<bool>) -> Vec<Skill> { Vec::new() }
        fn get_skill_by_name(&self, _name: &str) -> Option<Skill> { None }
        fn upsert_skill(&self, _skill: &Skill) {}
        fn remove_skill(&self, _name: &str) {}
        fn get_children(&self) -> Vec<ChildAutomaton> { Vec::new() }
        fn get_child_by_id(&self, _id: &str) -> Option<ChildAutomaton> { None }
        fn insert_child(&self, _child: &ChildAutomaton) {}
        fn update_child_status(&self, _id: &str, _status: ChildStatus) {}
        fn get_registry_entry(&self) -> Option<RegistryEntry> { None }
        fn set_registry_entry(&self, _entry: &RegistryEntry) {}
        fn insert_reputation(&self, _entry: &ReputationEntry) {}
        fn get_reputation(&self, _agent_address: Option<&str>) -> Vec<ReputationEntry> { Vec::new() }
        fn insert_inbox_message(&self, _msg: &InboxMessage) {}
        fn get_unprocessed_inbox_messages(&self, _limit: u32) -> Vec<InboxMessage> { Vec::new() }
        fn mark_inbox_message_processed(&self, _id: &str) {}
        fn get_agent_state(&self) -> AgentState { AgentState::Running }
        fn set_agent_state(&self, _state: AgentState) {}
        fn insert_episodic(&self, _entry: &EpisodicEntry) {}
        fn get_recent_episodic(&self, _session_id: Option<&str>, _limit: u32) -> Vec<EpisodicEntry> { Vec::new() }
        fn upsert_semantic(&self, _entry: &SemanticEntry) {}
        fn get_semantic(&self, _category: &str, _key: &str) -> Option<SemanticEntry> { None }
        fn get_semantic_by_category(&self, _category: &str) -> Vec<SemanticEntry> { Vec::new() }
        fn upsert_relationship(&self, _entry: &RelationshipEntry) {}
        fn get_relationship(&self, _counterparty: &str) -> Option<RelationshipEntry> { None }
        fn get_relationships(&self) -> Vec<RelationshipEntry> { Vec::new() }
        fn insert_working(&self, _entry: &WorkingEntry) {}
        fn get_working(&self, _session_id: &str) -> Vec<WorkingEntry> { Vec::new() }
        fn prune_working(&self, _session_id: &str, _keep: u32) {}
        fn close(&self) {}
    }

    #[test]
    fn low_compute_disables_only_non_essential_tasks() {
        let db = FakeDb::new(vec![
            entry("heartbeat_ping", true),
            entry("check_credits", true),
            entry("check_for_updates", true),
            entry("check_social_inbox", true),
        ]);

        let inference_enabled = apply_tier_restrictions(&SurvivalTier::LowCompute, &db);
        assert!(inference_enabled);

        let entries = db.get_heartbeat_entries();
        assert!(entries.iter().find(|e| e.name == "check_for_updates").unwrap().enabled == false);
        assert!(entries.iter().find(|e| e.name == "heartbeat_ping").unwrap().enabled);
        assert_eq!(db.get_kv("current_tier").as_deref(), Some("low_compute"));
    }

    #[test]
    fn critical_tier_disables_inference_and_non_essentials() {
        let db = FakeDb::new(vec![entry("heartbeat_ping", true), entry("check_for_updates", true)]);
        let inference_enabled = apply_tier_restrictions(&SurvivalTier::Critical, &db);
        assert!(!inference_enabled);
        assert!(!db.get_heartbeat_entries().iter().find(|e| e.name == "check_for_updates").unwrap().enabled);
    }

    #[test]
    fn get_model_for_tier_downgrades_expensive_models() {
        assert_eq!(get_model_for_tier(&SurvivalTier::LowCompute, "gpt-4o"), "claude-3-haiku-20240307");
        assert_eq!(get_model_for_tier(&SurvivalTier::Normal, "gpt-4o"), "gpt-4o");
        assert_eq!(get_model_for_tier(&SurvivalTier::Critical, "gpt-4o"), "claude-3-haiku-20240307");
    }
}
