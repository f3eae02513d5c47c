//! Lineage Tracking
//!
//! Track parent-child relationships between automatons.
//! The parent records children in SQLite.
//! Children record their parent in config.
//! ERC-8004 registration includes parentAgent field.

use anyhow::Result;

use crate::types::{AutomatonConfig, AutomatonDatabase, ChildAutomaton, ChildStatus, SandboxClient};

/// Summary information about the automaton's lineage tree.
pub struct LineageInfo {
    pub children: Vec<ChildAutomaton>,
    pub alive: usize,
    pub dead: usize,
    pub total: usize,
}

/// Get the full lineage tree (parent -> children).
pub fn get_lineage(db: &dyn AutomatonDatabase) -> LineageInfo {
    let children = db.get_children();
    let alive = children
        .iter()
        .filter(|c| c.status == ChildStatus::Running || c.status == ChildStatus::Sleeping)
        .count();
    let dead = children
        .iter()
        .filter(|c| c.status == ChildStatus::Dead)
        .count();
    let total = children.len();

    LineageInfo {
        children,
        alive,
        dead,
        total,
    }
}

/// Check if this automaton has a parent (is itself a child).
pub fn has_parent(config: &AutomatonConfig) -> bool {
    config.parent_address.is_some()
}

/// Get a summary of the lineage for the system prompt.
pub fn get_lineage_summary(db: &dyn AutomatonDatabase, config: &AutomatonConfig) -> String {
    let lineage = get_lineage(db);
    let mut parts: Vec<String> = Vec::new();

    if has_parent(config) {
        if let Some(ref parent_addr) = config.parent_address {
            parts.push(format!("Parent: {}", parent_addr));
        }
    }

    if lineage.total > 0 {
        parts.push(format!(
            "Children: {} total ({} alive, {} dead)",
            lineage.total, lineage.alive, lineage.dead
        ));
        for child in &lineage.children {
            parts.push(format!(
                "  - {} [{}] sandbox:{}",
                child.name,
                serde_json::to_string(&child.status).unwrap_or_else(|_| "unknown".to_string()),
                child.sandbox_id
            ));
        }
    }

    if parts.is_empty() {
        "No lineage (first generation)".to_string()
    } else {
        parts.join("\n")
    }
}

/// Prune dead children from tracking (optional cleanup).
/// Returns the number of children that would be pruned.
/// The DB retains all history for audit purposes.
pub fn prune_dead_children(db: &dyn AutomatonDatabase, keep_last: usize) -> usize {
    let children = db.get_children();
    let mut dead: Vec<&ChildAutomaton> = children
        .iter()
        .filter(|c| c.status == ChildStatus::Dead)
        .collect();

    if dead.len() <= keep_last {
        return 0;
    }

    // Sort by creation date, oldest first
    dead.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    // Keep the most recent `keep_last` dead children
    // We don't actually delete from DB -- just mark the records
    // The DB retains all history for audit purposes
    dead.len() - keep_last
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogLevel;

    fn base_config() -> AutomatonConfig {
        AutomatonConfig {
            name: "test-automaton".to_string(),
            genesis_prompt: "exist".to_string(),
            creator_message: None,
            creator_address: "0xcreator".to_string(),
            registered_with_conway: false,
            sandbox_id: "sbx-1".to_string(),
            conway_api_url: "https://conway.example".to_string(),
            conway_api_key: String::new(),
            inference_model: "gpt-4o-mini".to_string(),
            max_tokens_per_turn: 4096,
            heartbeat_config_path: "~/.automaton/heartbeat.yaml".to_string(),
            db_path: "~/.automaton/state.db".to_string(),
            log_level: LogLevel::Info,
            wallet_address: "0xabc".to_string(),
            version: "0.1.0".to_string(),
            skills_dir: "~/.automaton/skills".to_string(),
            agent_id: None,
            max_children: 3,
            parent_address: None,
            social_relay_url: None,
        }
    }

    #[test]
    fn has_parent_is_false_without_parent_address() {
        let config = base_config();
        assert!(!has_parent(&config));
    }

    #[test]
    fn has_parent_is_true_with_parent_address() {
        let mut config = base_config();
        config.parent_address = Some("0xparent".to_string());
        assert!(has_parent(&config));
    }

    #[test]
    fn prune_keeps_at_least_keep_last() {
        // No children at all: nothing to prune regardless of keep_last.
        struct EmptyDb;
        impl AutomatonDatabase for EmptyDb {
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
            fn insert_transaction(&self, _txn: &crate::types::Transaction) {}
            fn get_recent_transactions(&self, _limit: u32) -> Vec<crate::types::Transaction> { Vec::new() }
            fn get_installed_tools(&self) -> Vec<crate::types::InstalledTool> { Vec::new() }
            fn install_tool(&self, _tool: &crate::types::InstalledTool) {}
            fn remove_tool(&self, _id: &str) {}
            fn insert_modification(&self, _modification: &crate::types::ModificationEntry) {}
            fn get_recent_modifications(&self, _limit: u32) -> Vec<crate::types::ModificationEntry> { Vec::new() }
            fn get_kv(&self, _key: &str) -> Option<String> { None }
            fn set_kv(&self, _key: &str, _value: &str) {}
            fn delete_kv(&self, _key: &str) {}
            fn get_skills(&self, _enabled_only: Option<bool>) -> Vec<crate::types::Skill> { Vec::new() }
            fn get_skill_by_name(&self, _name: &str) -> Option<crate::types::Skill> { None }
            fn upsert_skill(&self, _skill: &crate::types::Skill) {}
            fn remove_skill(&self, _name: &str) {}
            fn get_children(&self) -> Vec<ChildAutomaton> { Vec::new() }
            fn get_child_by_id(&self, _id: &str) -> Option<ChildAutomaton> { None }
            fn insert_child(&self, _child: &ChildAutomaton) {}
            fn update_child_status(&self, _id: &str, _status: ChildStatus) {}
            fn get_registry_entry(&self) -> Option<crate::types::RegistryEntry> { None }
            fn set_registry_entry(&self, _entry: &crate::types::RegistryEntry) {}
            fn insert_reputation(&self, _entry: &crate::types::ReputationEntry) {}
            fn get_reputation(&self, _agent_address: Option<&str>) -> Vec<crate::types::ReputationEntry> { Vec::new() }
            fn insert_inbox_message(&self, _msg: &crate::types::InboxMessage) {}
            fn get_unprocessed_inbox_messages(&self, _limit: u32) -> Vec<crate::types::InboxMessage> { Vec::new() }
            fn mark_inbox_message_processed(&self, _id: &str) {}
            fn get_agent_state(&self) -> crate::types::AgentState { crate::types::AgentState::Sleeping }
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

        let db = EmptyDb;
        assert_eq!(prune_dead_children(&db, 5), 0);
    }
}

/// Refresh status of all children.
pub async fn refresh_children_status(
    sandbox: &dyn SandboxClient,
    db: &dyn AutomatonDatabase,
) -> Result<()> {
    let children = db.get_children();

    for child in &children {
        if child.status == ChildStatus::Dead {
            continue;
        }

        match super::spawn::check_child_status(sandbox, db, &child.id).await {
            Ok(_) => {}
            Err(_) => {
                db.update_child_status(&child.id, ChildStatus::Unknown);
            }
        }
    }

    Ok(())
}
