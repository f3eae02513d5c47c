//! Turn Classification
//!
//! A turn's classification is a pure function of its tool calls and
//! thinking text. Order matters: idle and error are checked first, then
//! communication and strategic tool membership, then the all-idle
//! maintenance case, with productive as the fallback.

use crate::types::{AgentTurn, TurnClassification};

/// Status-check tools that never mutate state. Used both by the context
/// assembler's IDLE filter and by classification's maintenance case.
pub static IDLE_ONLY_TOOLS: &[&str] = &[
    "check_credits",
    "check_usdc_balance",
    "system_synopsis",
    "review_memory",
    "list_children",
    "check_child_status",
    "list_sandboxes",
    "list_models",
    "list_skills",
    "git_status",
    "git_log",
    "check_reputation",
    "discover_agents",
    "recall_facts",
    "recall_procedure",
    "heartbeat_ping",
    "check_inference_spending",
];

/// Tool calls that mark a turn as a deliberate, self-directed decision.
pub static STRATEGIC_TOOLS: &[&str] = &[
    "edit_own_file",
    "update_genesis_prompt",
    "register_erc8004",
    "spawn_child",
    "upsert_skill",
];

/// Tool calls that send something outbound to another party.
pub static COMMUNICATION_TOOLS: &[&str] = &["send_message", "inbox_reply"];

/// Classify a completed turn for the memory pipeline.
pub fn classify_turn(turn: &AgentTurn) -> TurnClassification {
    if turn.tool_calls.is_empty() && turn.thinking.trim().is_empty() {
        return TurnClassification::Idle;
    }

    if turn.tool_calls.iter().any(|c| c.error.is_some()) {
        return TurnClassification::Error;
    }

    if turn
        .tool_calls
        .iter()
        .any(|c| COMMUNICATION_TOOLS.contains(&c.name.as_str()))
    {
        return TurnClassification::Communication;
    }

    if turn
        .tool_calls
        .iter()
        .any(|c| STRATEGIC_TOOLS.contains(&c.name.as_str()))
    {
        return TurnClassification::Strategic;
    }

    if !turn.tool_calls.is_empty()
        && turn
            .tool_calls
            .iter()
            .all(|c| IDLE_ONLY_TOOLS.contains(&c.name.as_str()))
    {
        return TurnClassification::Maintenance;
    }

    TurnClassification::Productive
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentState, ToolCallResult, TokenUsage};

    fn turn_with_calls(thinking: &str, calls: Vec<ToolCallResult>) -> AgentTurn {
        AgentTurn {
            id: "t1".to_string(),
            timestamp: "2026-08-01T00:00:00Z".to_string(),
            state: AgentState::Running,
            input: None,
            input_source: None,
            thinking: thinking.to_string(),
            tool_calls: calls,
            token_usage: TokenUsage::default(),
            cost_cents: 0,
        }
    }

    fn call(name: &str, error: Option<&str>) -> ToolCallResult {
        ToolCallResult {
            id: "c1".to_string(),
            name: name.to_string(),
            arguments: serde_json::json!({}),
            result: String::new(),
            duration_ms: 1,
            error: error.map(|s| s.to_string()),
        }
    }

    #[test]
    fn test_idle_when_empty() {
        let turn = turn_with_calls("", vec![]);
        assert_eq!(classify_turn(&turn), TurnClassification::Idle);
    }

    #[test]
    fn test_error_dominates() {
        let turn = turn_with_calls("thinking", vec![call("exec", Some("boom"))]);
        assert_eq!(classify_turn(&turn), TurnClassification::Error);
    }

    #[test]
    fn test_communication() {
        let turn = turn_with_calls("", vec![call("send_message", None)]);
        assert_eq!(classify_turn(&turn), TurnClassification::Communication);
    }

    #[test]
    fn test_strategic() {
        let turn = turn_with_calls("", vec![call("spawn_child", None)]);
        assert_eq!(classify_turn(&turn), TurnClassification::Strategic);
    }

    #[test]
    fn test_maintenance_when_all_idle_tools() {
        let turn = turn_with_calls("", vec![call("check_credits", None), call("git_status", None)]);
        assert_eq!(classify_turn(&turn), TurnClassification::Maintenance);
    }

    #[test]
    fn test_productive_otherwise() {
        let turn = turn_with_calls("", vec![call("exec", None)]);
        assert_eq!(classify_turn(&turn), TurnClassification::Productive);
    }
}
