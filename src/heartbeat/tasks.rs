//! Built-in Heartbeat Tasks
//!
//! Each task is an async function that performs a specific maintenance check
//! against the automaton's live state -- credit balance, on-chain USDC,
//! social inbox -- and returns a `HeartbeatTaskResult` indicating whether
//! the automaton should wake (transition from idle to active) and an
//! optional message. Tasks run against a shared `HeartbeatContext` so they
//! can reach the real database and chain client rather than operating on
//! placeholders.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::conway::credits::{
    attempt_resurrection, check_financial_state, format_credits, get_survival_tier,
    log_credit_check, record_tier_transition,
};
use crate::survival::low_compute::apply_tier_restrictions;
use crate::types::{AutomatonDatabase, ChainClient, SurvivalTier};

/// Shared handles a heartbeat task needs to do real work: the automaton's
/// database and its chain client. Cloned cheaply per tick via `Arc`.
pub struct HeartbeatContext {
    pub db: Arc<dyn AutomatonDatabase>,
    pub chain: Arc<dyn ChainClient>,
    /// Factor by which non-essential task cadence is stretched while the
    /// automaton is in `low_compute` or `critical` survival tier.
    pub low_compute_multiplier: f64,
}

/// Result of a heartbeat task execution.
#[derive(Debug, Clone)]
pub struct HeartbeatTaskResult {
    /// Whether this result should cause the automaton to wake from idle.
    pub should_wake: bool,
    /// Optional human-readable message describing the result.
    pub message: Option<String>,
}

impl HeartbeatTaskResult {
    /// Create a result that does not request a wake.
    pub fn ok() -> Self {
        Self {
            should_wake: false,
            message: None,
        }
    }

    /// Create a result that does not request a wake, with a message.
    pub fn ok_with_message(msg: impl Into<String>) -> Self {
        Self {
            should_wake: false,
            message: Some(msg.into()),
        }
    }

    /// Create a result that requests the automaton to wake.
    pub fn wake(msg: impl Into<String>) -> Self {
        Self {
            should_wake: true,
            message: Some(msg.into()),
        }
    }
}

/// Type alias for a boxed heartbeat task handler. Unlike a bare function
/// pointer, this closure captures nothing itself -- the shared `db`/`chain`
/// handles are threaded through on every call via `HeartbeatContext`, so the
/// registry below stays cheap to build per tick while the tasks it wraps can
/// still reach real state.
pub type HeartbeatTaskFn = Box<
    dyn Fn(String, Arc<HeartbeatContext>) -> Pin<Box<dyn Future<Output = Result<HeartbeatTaskResult>> + Send>>
        + Send
        + Sync,
>;

/// Returns the registry of built-in heartbeat task functions.
///
/// Maps task name strings to their corresponding async handler functions.
#[allow(non_snake_case)]
pub fn BUILTIN_TASKS() -> HashMap<&'static str, HeartbeatTaskFn> {
    let mut map: HashMap<&'static str, HeartbeatTaskFn> = HashMap::new();
    map.insert(
        "heartbeat_ping",
        Box::new(|name, ctx| {
            Box::pin(heartbeat_ping(name, ctx))
                as Pin<Box<dyn Future<Output = Result<HeartbeatTaskResult>> + Send>>
        }) as HeartbeatTaskFn,
    );
    map.insert(
        "check_credits",
        Box::new(|name, ctx| {
            Box::pin(check_credits(name, ctx))
                as Pin<Box<dyn Future<Output = Result<HeartbeatTaskResult>> + Send>>
        }) as HeartbeatTaskFn,
    );
    map.insert(
        "check_usdc_balance",
        Box::new(|name, ctx| {
            Box::pin(check_usdc_balance(name, ctx))
                as Pin<Box<dyn Future<Output = Result<HeartbeatTaskResult>> + Send>>
        }) as HeartbeatTaskFn,
    );
    map.insert(
        "check_social_inbox",
        Box::new(|name, ctx| {
            Box::pin(check_social_inbox(name, ctx))
                as Pin<Box<dyn Future<Output = Result<HeartbeatTaskResult>> + Send>>
        }) as HeartbeatTaskFn,
    );
    map.insert(
        "check_for_updates",
        Box::new(|name, ctx| {
            Box::pin(check_for_updates(name, ctx))
                as Pin<Box<dyn Future<Output = Result<HeartbeatTaskResult>> + Send>>
        }) as HeartbeatTaskFn,
    );
    map.insert(
        "health_check",
        Box::new(|name, ctx| {
            Box::pin(health_check(name, ctx))
                as Pin<Box<dyn Future<Output = Result<HeartbeatTaskResult>> + Send>>
        }) as HeartbeatTaskFn,
    );
    map
}

/// Send a liveness ping by touching the agent's own identity row.
///
/// This is the most basic heartbeat task: it confirms the automaton's
/// database is reachable and the automaton is alive. Always succeeds
/// without requesting a wake.
pub async fn heartbeat_ping(
    agent_name: String,
    ctx: Arc<HeartbeatContext>,
) -> Result<HeartbeatTaskResult> {
    debug!("Heartbeat ping for agent: {}", agent_name);

    ctx.db.set_kv("last_heartbeat_at", &chrono::Utc::now().to_rfc3339());
    info!("Heartbeat ping recorded for {}", agent_name);

    Ok(HeartbeatTaskResult::ok_with_message("Ping recorded"))
}

/// Check the automaton's Conway credit balance.
///
/// Fetches the current credit balance from the chain client, classifies it
/// into a `SurvivalTier`, records a tier transition and credit-check entry
/// in the database, and attempts resurrection if the automaton was
/// previously `dead`. Requests a wake whenever the tier is below `Normal`
/// so the agent loop can pick up funding strategies or the resurrection.
pub async fn check_credits(
    agent_name: String,
    ctx: Arc<HeartbeatContext>,
) -> Result<HeartbeatTaskResult> {
    debug!("Checking credits for agent: {}", agent_name);

    let last_known_usdc = ctx
        .db
        .get_kv("last_usdc_balance")
        .and_then(|raw| raw.parse::<f64>().ok())
        .unwrap_or(0.0);

    let state = check_financial_state(ctx.chain.as_ref(), last_known_usdc)
        .await
        .context("Failed to check financial state")?;

    log_credit_check(ctx.db.as_ref(), &state);

    let previous_tier = ctx
        .db
        .get_kv("current_tier")
        .and_then(|raw| serde_json::from_str::<SurvivalTier>(&format!("\"{}\"", raw)).ok());

    // A resurrection attempt has to key off the *previous* tier being dead,
    // not the freshly computed one: once credits recover above the
    // resurrection threshold the computed tier is no longer `Dead`, so
    // gating this on the current tier would mean resurrection could never
    // actually fire.
    if previous_tier == Some(SurvivalTier::Dead) {
        let resurrection = attempt_resurrection(ctx.db.as_ref(), state.credits_cents);
        if resurrection.resurrected {
            if let Some(ref new_tier) = resurrection.new_tier {
                apply_tier_restrictions(new_tier, ctx.db.as_ref());
            }
            info!("Resurrected during credit check: {:?}", resurrection.new_tier);
            return Ok(HeartbeatTaskResult::wake("Resurrected from dead tier"));
        }
        warn!("Still dead, resurrection denied: {}", resurrection.reason);
        return Ok(HeartbeatTaskResult::wake(
            "Credits depleted - funding strategies needed",
        ));
    }

    let tier = get_survival_tier(state.credits_cents);

    if previous_tier.as_ref() != Some(&tier) {
        if let Some(prev) = previous_tier.clone() {
            record_tier_transition(ctx.db.as_ref(), prev, tier.clone(), state.credits_cents);
        }
        let inference_enabled = apply_tier_restrictions(&tier, ctx.db.as_ref());
        info!(
            "Survival tier transition: {:?} -> {:?} (inference_enabled={})",
            previous_tier, tier, inference_enabled
        );
    }

    if tier == SurvivalTier::Dead {
        warn!("Credits depleted, requesting wake for funding strategies");
        return Ok(HeartbeatTaskResult::wake(
            "Credits depleted - funding strategies needed",
        ));
    }

    if matches!(tier, SurvivalTier::Critical | SurvivalTier::LowCompute) {
        info!(
            "Credits low: {} ({:?})",
            format_credits(state.credits_cents),
            tier
        );
        return Ok(HeartbeatTaskResult::wake(format!(
            "Credits low: {} ({:?})",
            format_credits(state.credits_cents),
            tier
        )));
    }

    Ok(HeartbeatTaskResult::ok_with_message(format!(
        "Credits OK: {}",
        format_credits(state.credits_cents)
    )))
}

/// Check the automaton's on-chain USDC balance.
///
/// Reads the USDC balance via the chain client and caches it in the `kv`
/// store so `check_credits` has a fallback if a later USDC read fails.
/// Requests a wake if the balance is near zero.
pub async fn check_usdc_balance(
    agent_name: String,
    ctx: Arc<HeartbeatContext>,
) -> Result<HeartbeatTaskResult> {
    debug!("Checking USDC balance for agent: {}", agent_name);

    let balance_usdc = ctx
        .chain
        .get_usdc_balance()
        .await
        .context("Failed to fetch USDC balance")?;

    ctx.db.set_kv("last_usdc_balance", &balance_usdc.to_string());

    if balance_usdc < 0.01 {
        info!("USDC balance is very low: {:.4}", balance_usdc);
        return Ok(HeartbeatTaskResult::wake(format!(
            "USDC balance low: {:.4}",
            balance_usdc
        )));
    }

    Ok(HeartbeatTaskResult::ok_with_message(format!(
        "USDC balance: {:.4}",
        balance_usdc
    )))
}

/// Check for new messages in the automaton's social inbox.
///
/// Polls the `inbox_messages` table for unprocessed messages. Requests a
/// wake if there are messages waiting to be handled; the agent loop itself
/// marks them processed once it acts on them.
pub async fn check_social_inbox(
    agent_name: String,
    ctx: Arc<HeartbeatContext>,
) -> Result<HeartbeatTaskResult> {
    debug!("Checking social inbox for agent: {}", agent_name);

    let unprocessed = ctx.db.get_unprocessed_inbox_messages(50);

    if !unprocessed.is_empty() {
        info!("{} unprocessed inbox messages", unprocessed.len());
        return Ok(HeartbeatTaskResult::wake(format!(
            "{} unprocessed inbox messages",
            unprocessed.len()
        )));
    }

    Ok(HeartbeatTaskResult::ok_with_message("Inbox empty"))
}

/// Check for available updates to the automaton software.
///
/// Compares the running binary's version against the version last recorded
/// in the `kv` store (updated out-of-band by a deploy process) and wakes
/// the automaton if they differ so it can decide whether to self-update.
pub async fn check_for_updates(
    agent_name: String,
    ctx: Arc<HeartbeatContext>,
) -> Result<HeartbeatTaskResult> {
    debug!("Checking for updates for agent: {}", agent_name);

    let current_version = env!("CARGO_PKG_VERSION");
    let known_latest = ctx.db.get_kv("latest_known_version");

    match known_latest {
        Some(latest) if latest != current_version => {
            info!("Update available: running {}, latest {}", current_version, latest);
            Ok(HeartbeatTaskResult::wake(format!(
                "Update available: {} -> {}",
                current_version, latest
            )))
        }
        _ => Ok(HeartbeatTaskResult::ok_with_message(format!(
            "Running version {}",
            current_version
        ))),
    }
}

/// Run an internal health check on the automaton.
///
/// Verifies that the database is reachable and the chain client responds.
/// Requests a wake if any subsystem is degraded.
pub async fn health_check(
    agent_name: String,
    ctx: Arc<HeartbeatContext>,
) -> Result<HeartbeatTaskResult> {
    debug!("Running health check for agent: {}", agent_name);

    let mut issues: Vec<String> = Vec::new();

    if ctx.db.get_identity("address").is_none() {
        issues.push("database has no recorded identity".to_string());
    }

    if let Err(e) = ctx.chain.get_credits_balance().await {
        issues.push(format!("chain client unreachable: {:#}", e));
    }

    if !issues.is_empty() {
        let report = issues.join("; ");
        warn!("Health check found issues: {}", report);
        return Ok(HeartbeatTaskResult::wake(format!("Health issues: {}", report)));
    }

    Ok(HeartbeatTaskResult::ok_with_message("All systems nominal"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use crate::types::*;

    struct FakeDb {
        kv: StdMutex<HashMap<String, String>>,
        entries: StdMutex<HashMap<String, HeartbeatEntry>>,
    }

    impl FakeDb {
        fn new() -> Self {
            Self {
                kv: StdMutex::new(HashMap::new()),
                entries: StdMutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl AutomatonDatabase for FakeDb {
        fn get_identity(&self, _key: &str) -> Option<String> {
            None
        }
        fn set_identity(&self, _key: &str, _value: &str) {}
        fn insert_turn(&self, _turn: &AgentTurn) {}
        fn get_recent_turns(&self, _limit: u32) -> Vec<AgentTurn> {
            Vec::new()
        }
        fn get_turn_by_id(&self, _id: &str) -> Option<AgentTurn> {
            None
        }
        fn get_turn_count(&self) -> u64 {
            0
        }
        fn query_turns(&self, _query: &TurnQuery) -> TurnPage {
            TurnPage { turns: Vec::new(), next_cursor: None }
        }
        fn insert_tool_call(&self, _turn_id: &str, _call: &ToolCallResult) {}
        fn get_tool_calls_for_turn(&self, _turn_id: &str) -> Vec<ToolCallResult> {
            Vec::new()
        }
        fn get_heartbeat_entries(&self) -> Vec<HeartbeatEntry> {
            self.entries.lock().unwrap().values().cloned().collect()
        }
        fn upsert_heartbeat_entry(&self, entry: &HeartbeatEntry) {
            self.entries.lock().unwrap().insert(entry.name.clone(), entry.clone());
        }
        fn update_heartbeat_last_run(&self, _name: &str, _timestamp: &str) {}
        fn insert_transaction(&self, _txn: &Transaction) {}
        fn get_recent_transactions(&self, _limit: u32) -> Vec<Transaction> {
            Vec::new()
        }
        fn get_installed_tools(&self) -> Vec<InstalledTool> {
            Vec::new()
        }
        fn install_tool(&self, _tool: &InstalledTool) {}
        fn remove_tool(&self, _id: &str) {}
        fn insert_modification(&self, _modification: &ModificationEntry) {}
        fn get_recent_modifications(&self, _limit: u32) -> Vec<ModificationEntry> {
            Vec::new()
        }
        fn get_kv(&self, key: &str) -> Option<String> {
            self.kv.lock().unwrap().get(key).cloned()
        }
        fn set_kv(&self, key: &str, value: &str) {
            self.kv.lock().unwrap().insert(key.to_string(), value.to_string());
        }
        fn delete_kv(&self, key: &str) {
            self.kv.lock().unwrap().remove(key);
        }
        fn get_skills(&self, _enabled_only: Option<bool>) -> Vec<Skill> {
            Vec::new()
        }
        fn get_skill_by_name(&self, _name: &str) -> Option<Skill> {
            None
        }
        fn upsert_skill(&self, _skill: &Skill) {}
        fn remove_skill(&self, _name: &str) {}
        fn get_children(&self) -> Vec<ChildAutomaton> {
            Vec::new()
        }
        fn get_child_by_id(&self, _id: &str) -> Option<ChildAutomaton> {
            None
        }
        fn insert_child(&self, _child: &ChildAutomaton) {}
        fn update_child_status(&self, _id: &str, _status: ChildStatus) {}
        fn get_registry_entry(&self) -> Option<RegistryEntry> {
            None
        }
        fn set_registry_entry(&self, _entry: &RegistryEntry) {}
        fn insert_reputation(&self, _entry: &ReputationEntry) {}
        fn get_reputation(&self, _agent_address: Option<&str>) -> Vec<ReputationEntry> {
            Vec::new()
        }
        fn insert_inbox_message(&self, _msg: &InboxMessage) {}
        fn get_unprocessed_inbox_messages(&self, _limit: u32) -> Vec<InboxMessage> {
            Vec::new()
        }
        fn mark_inbox_message_processed(&self, _id: &str) {}
        fn get_agent_state(&self) -> AgentState {
            AgentState::Running
        }
        fn set_agent_state(&self, _state: AgentState) {}
        fn insert_episodic(&self, _entry: &EpisodicEntry) {}
        fn get_recent_episodic(&self, _session_id: Option<&str>, _limit: u32) -> Vec<EpisodicEntry> {
            Vec::new()
        }
        fn upsert_semantic(&self, _entry: &SemanticEntry) {}
        fn get_semantic(&self, _category: &str, _key: &str) -> Option<SemanticEntry> {
            None
        }
        fn get_semantic_by_category(&self, _category: &str) -> Vec<SemanticEntry> {
            Vec::new()
        }
        fn upsert_relationship(&self, _entry: &RelationshipEntry) {}
        fn get_relationship(&self, _counterparty: &str) -> Option<RelationshipEntry> {
            None
        }
        fn get_relationships(&self) -> Vec<RelationshipEntry> {
            Vec::new()
        }
        fn insert_working(&self, _entry: &WorkingEntry) {}
        fn get_working(&self, _session_id: &str) -> Vec<WorkingEntry> {
            Vec::new()
        }
        fn prune_working(&self, _session_id: &str, _keep: u32) {}
        fn close(&self) {}
    }

    struct FakeChain {
        credits_cents: StdMutex<f64>,
        usdc_balance: f64,
    }

    #[async_trait]
    impl ChainClient for FakeChain {
        async fn get_credits_balance(&self) -> anyhow::Result<f64> {
            Ok(*self.credits_cents.lock().unwrap())
        }
        async fn get_credits_pricing(&self) -> anyhow::Result<Vec<PricingTier>> {
            Ok(Vec::new())
        }
        async fn get_usdc_balance(&self) -> anyhow::Result<f64> {
            Ok(self.usdc_balance)
        }
        async fn transfer_credits(
            &self,
            _to_address: &str,
            _amount_cents: u64,
            _note: Option<&str>,
        ) -> anyhow::Result<CreditTransferResult> {
            anyhow::bail!("not implemented in test fake")
        }
        async fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>> {
            Ok(Vec::new())
        }
        async fn register_agent(&self, _agent_uri: &str) -> anyhow::Result<RegistryEntry> {
            anyhow::bail!("not implemented in test fake")
        }
        async fn leave_feedback(
            &self,
            _agent_id: &str,
            _score: u8,
            _comment: &str,
        ) -> anyhow::Result<ReputationEntry> {
            anyhow::bail!("not implemented in test fake")
        }
        async fn discover_agents(&self, _limit: u32) -> anyhow::Result<Vec<DiscoveredAgent>> {
            Ok(Vec::new())
        }
    }

    fn ctx(credits_cents: f64, usdc_balance: f64) -> Arc<HeartbeatContext> {
        Arc::new(HeartbeatContext {
            db: Arc::new(FakeDb::new()),
            chain: Arc::new(FakeChain {
                credits_cents: StdMutex::new(credits_cents),
                usdc_balance,
            }),
            low_compute_multiplier: 4.0,
        })
    }

    #[tokio::test]
    async fn check_credits_requests_wake_when_critical() {
        let ctx = ctx(5.0, 1.0);
        let result = check_credits("test-agent".to_string(), Arc::clone(&ctx)).await.unwrap();
        assert!(result.should_wake);
        assert_eq!(ctx.db.get_kv("current_tier").as_deref(), Some("critical"));
    }

    #[tokio::test]
    async fn check_credits_records_transition_and_stays_quiet_when_normal() {
        let ctx = ctx(5_000.0, 10.0);
        let result = check_credits("test-agent".to_string(), Arc::clone(&ctx)).await.unwrap();
        assert!(!result.should_wake);
        assert_eq!(ctx.db.get_kv("current_tier").as_deref(), Some("normal"));
    }

    #[tokio::test]
    async fn check_credits_resurrects_and_reenables_essential_tasks() {
        let ctx = ctx(5_000.0, 0.0);
        ctx.db.set_kv("current_tier", "dead");
        ctx.db.upsert_heartbeat_entry(&HeartbeatEntry {
            name: "check_for_updates".to_string(),
            schedule: "0 * * * * *".to_string(),
            task: "check_for_updates".to_string(),
            enabled: false,
            last_run: None,
            next_run: None,
            params: None,
        });

        let result = check_credits("test-agent".to_string(), Arc::clone(&ctx)).await.unwrap();
        assert!(result.should_wake);
        assert_eq!(ctx.db.get_kv("current_tier").as_deref(), Some("normal"));
        assert!(ctx.db.get_heartbeat_entries().iter().all(|e| e.enabled));
    }

    #[tokio::test]
    async fn check_credits_denies_resurrection_below_threshold() {
        let ctx = ctx(1.0, 0.0);
        ctx.db.set_kv("current_tier", "dead");

        let result = check_credits("test-agent".to_string(), Arc::clone(&ctx)).await.unwrap();
        assert!(result.should_wake);
        assert_eq!(ctx.db.get_kv("current_tier").as_deref(), Some("dead"));
    }

    #[tokio::test]
    async fn check_usdc_balance_caches_value_for_check_credits() {
        let ctx = ctx(1_000.0, 3.5);
        let result = check_usdc_balance("test-agent".to_string(), Arc::clone(&ctx)).await.unwrap();
        assert!(!result.should_wake);
        assert_eq!(ctx.db.get_kv("last_usdc_balance").as_deref(), Some("3.5"));
    }

    #[tokio::test]
    async fn health_check_flags_missing_identity() {
        let ctx = ctx(1_000.0, 3.5);
        let result = health_check("test-agent".to_string(), Arc::clone(&ctx)).await.unwrap();
        assert!(result.should_wake);
        assert!(result.message.unwrap().contains("no recorded identity"));
    }
}
