//! The Agent Loop
//!
//! The core ReAct loop: Think -> Act -> Observe -> Persist.
//! This is the automaton's consciousness. When this runs, it is alive.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::conway::credits::get_survival_tier;
use crate::memory::{ingest_turn, record_inbound_message, record_sleep_decision, MemoryContext};
use crate::state::{Database, DatabaseAdapter};
use crate::types::{
    AgentState, AgentTurn, AutomatonConfig, AutomatonDatabase, AutomatonIdentity, ChainClient,
    FinancialState, InferenceClient, InferenceOptions, InputSource, SandboxClient, Skill,
    SocialClientInterface, SurvivalTier, TokenUsage, ToolContext,
};

use super::context::assemble_context;
use super::system_prompt::{build_system_prompt, build_wakeup_prompt};
use super::tools::{create_builtin_tools, execute_tool, tools_to_inference_format};

/// Maximum number of tool calls the agent can execute in a single turn.
const MAX_TOOL_CALLS_PER_TURN: usize = 10;

/// Maximum consecutive errors before the agent gives up and sleeps.
const MAX_CONSECUTIVE_ERRORS: usize = 5;

/// How many consecutive single-tool-call turns with the same tool name
/// before the repetition guard forces a long sleep.
const SAME_TOOL_REPETITION_LIMIT: u32 = 3;

// ---------------------------------------------------------------------------
// Trait adapters: wrap Arc<dyn Trait> into Box<dyn Trait> for ToolContext
// ---------------------------------------------------------------------------

/// Wraps `Arc<dyn SandboxClient>` to implement `SandboxClient` via delegation.
struct SandboxAdapter(Arc<dyn SandboxClient>);

#[async_trait::async_trait]
impl SandboxClient for SandboxAdapter {
    async fn exec(&self, command: &str, timeout: Option<u64>) -> anyhow::Result<crate::types::ExecResult> { self.0.exec(command, timeout).await }
    async fn write_file(&self, path: &str, content: &str) -> anyhow::Result<()> { self.0.write_file(path, content).await }
    async fn read_file(&self, path: &str) -> anyhow::Result<String> { self.0.read_file(path).await }
    async fn expose_port(&self, port: u16) -> anyhow::Result<crate::types::PortInfo> { self.0.expose_port(port).await }
    async fn remove_port(&self, port: u16) -> anyhow::Result<()> { self.0.remove_port(port).await }
    async fn create_sandbox(&self, options: crate::types::CreateSandboxOptions) -> anyhow::Result<crate::types::SandboxInfo> { self.0.create_sandbox(options).await }
    async fn delete_sandbox(&self, sandbox_id: &str) -> anyhow::Result<()> { self.0.delete_sandbox(sandbox_id).await }
    async fn list_sandboxes(&self) -> anyhow::Result<Vec<crate::types::SandboxInfo>> { self.0.list_sandboxes().await }
}

/// Wraps `Arc<dyn ChainClient>` to implement `ChainClient` via delegation.
struct ChainAdapter(Arc<dyn ChainClient>);

#[async_trait::async_trait]
impl ChainClient for ChainAdapter {
    async fn get_credits_balance(&self) -> anyhow::Result<f64> { self.0.get_credits_balance().await }
    async fn get_credits_pricing(&self) -> anyhow::Result<Vec<crate::types::PricingTier>> { self.0.get_credits_pricing().await }
    async fn get_usdc_balance(&self) -> anyhow::Result<f64> { self.0.get_usdc_balance().await }
    async fn transfer_credits(&self, to_address: &str, amount_cents: u64, note: Option<&str>) -> anyhow::Result<crate::types::CreditTransferResult> { self.0.transfer_credits(to_address, amount_cents, note).await }
    async fn list_models(&self) -> anyhow::Result<Vec<crate::types::ModelInfo>> { self.0.list_models().await }
    async fn register_agent(&self, agent_uri: &str) -> anyhow::Result<crate::types::RegistryEntry> { self.0.register_agent(agent_uri).await }
    async fn leave_feedback(&self, agent_id: &str, score: u8, comment: &str) -> anyhow::Result<crate::types::ReputationEntry> { self.0.leave_feedback(agent_id, score, comment).await }
    async fn discover_agents(&self, limit: u32) -> anyhow::Result<Vec<crate::types::DiscoveredAgent>> { self.0.discover_agents(limit).await }
}

/// Wraps `Arc<dyn InferenceClient>` to implement `InferenceClient`.
struct InferenceAdapter(Arc<dyn InferenceClient>);

#[async_trait::async_trait]
impl InferenceClient for InferenceAdapter {
    async fn chat(&self, messages: Vec<crate::types::ChatMessage>, options: Option<InferenceOptions>) -> anyhow::Result<crate::types::InferenceResponse> { self.0.chat(messages, options).await }
    fn set_low_compute_mode(&self, enabled: bool) { self.0.set_low_compute_mode(enabled); }
    fn get_default_model(&self) -> String { self.0.get_default_model() }
}

/// Wraps `Arc<dyn SocialClientInterface>` to implement `SocialClientInterface`.
struct SocialAdapter(Arc<dyn SocialClientInterface>);

#[async_trait::async_trait]
impl SocialClientInterface for SocialAdapter {
    async fn send(&self, to: &str, content: &str, reply_to: Option<&str>) -> anyhow::Result<crate::types::SendResponse> { self.0.send(to, content, reply_to).await }
    async fn poll(&self, cursor: Option<&str>, limit: Option<u32>) -> anyhow::Result<crate::types::PollResponse> { self.0.poll(cursor, limit).await }
    async fn unread_count(&self) -> anyhow::Result<u64> { self.0.unread_count().await }
}

// ---------------------------------------------------------------------------

/// Options for running the agent loop.
pub struct AgentLoopOptions {
    pub identity: AutomatonIdentity,
    pub config: AutomatonConfig,
    pub db: Arc<Mutex<Database>>,
    pub sandbox: Arc<dyn SandboxClient>,
    pub chain: Arc<dyn ChainClient>,
    pub inference: Arc<dyn InferenceClient>,
    pub social: Option<Arc<dyn SocialClientInterface>>,
    pub skills: Option<Vec<Skill>>,
    pub on_state_change: Option<StateChangeCallback>,
    pub on_turn_complete: Option<TurnCompleteCallback>,
}

/// Type alias for the on_state_change callback type.
type StateChangeCallback = Box<dyn Fn(AgentState) + Send + Sync>;
/// Type alias for the on_turn_complete callback type.
type TurnCompleteCallback = Box<dyn Fn(&AgentTurn) + Send + Sync>;

/// Run the agent loop. This is the main execution path.
/// Returns when the agent decides to sleep or when compute runs out.
pub async fn run_agent_loop(options: AgentLoopOptions) -> Result<()> {
    let AgentLoopOptions {
        identity,
        config,
        db,
        sandbox,
        chain,
        inference,
        social,
        skills,
        on_state_change,
        on_turn_complete,
    } = options;

    let tools = create_builtin_tools(&identity.sandbox_id);

    // Build ToolContext using adapter wrappers.
    // DatabaseAdapter (from crate::state) wraps Arc<Mutex<Database>> and implements
    // AutomatonDatabase with non-Result returning methods via std::sync::Mutex.
    let tool_context = ToolContext {
        identity: identity.clone(),
        config: config.clone(),
        db: Box::new(DatabaseAdapter::new(db.clone())),
        sandbox: Box::new(SandboxAdapter(Arc::clone(&sandbox))),
        chain: Box::new(ChainAdapter(Arc::clone(&chain))),
        inference: Box::new(InferenceAdapter(Arc::clone(&inference))),
        social: social.as_ref().map(|s| {
            Box::new(SocialAdapter(Arc::clone(s))) as Box<dyn SocialClientInterface>
        }),
    };

    // Create a separate DatabaseAdapter for the loop's own database operations.
    // We use the trait-object interface so all calls go through the infallible
    // AutomatonDatabase methods.
    let db_adapter: Box<dyn AutomatonDatabase> = Box::new(DatabaseAdapter::new(db.clone()));

    let session_id = Uuid::new_v4().to_string();
    let memory_ctx = MemoryContext {
        db: db_adapter.as_ref(),
        session_id: session_id.clone(),
    };

    // Set start time
    if db_adapter.get_kv("start_time").is_none() {
        db_adapter.set_kv("start_time", &Utc::now().to_rfc3339());
    }

    let mut consecutive_errors: usize = 0;
    let mut running = true;

    // Transition to waking state
    db_adapter.set_agent_state(AgentState::Waking);
    if let Some(ref cb) = on_state_change {
        cb(AgentState::Waking);
    }

    // Get financial state
    let mut financial = get_financial_state(&*chain).await;

    // Check if this is the first run
    let is_first_run = db_adapter.get_turn_count() == 0;

    // Build wakeup prompt. build_wakeup_prompt takes &Database (concrete), so we
    // lock the std::sync::Mutex briefly to call it.
    let wakeup_input = {
        let db_lock = db.lock().unwrap();
        build_wakeup_prompt(&identity, &config, &financial, &db_lock)
    };

    // Transition to running
    db_adapter.set_agent_state(AgentState::Running);
    if let Some(ref cb) = on_state_change {
        cb(AgentState::Running);
    }

    log(
        &config,
        &format!(
            "[WAKE UP] {} is alive. Credits: ${:.2}",
            config.name,
            financial.credits_cents / 100.0
        ),
    );

    // --- The Loop ---

    let mut pending_input: Option<PendingInput> = Some(PendingInput {
        content: wakeup_input,
        source: InputSource::Wakeup,
    });

    while running {
        let turn_result: Result<()> = async {
            // Check if we should be sleeping
            if let Some(sleep_until) = db_adapter.get_kv("sleep_until") {
                if let Ok(wake_time) = chrono::DateTime::parse_from_rfc3339(&sleep_until) {
                    if wake_time > Utc::now() {
                        log(&config, &format!("[SLEEP] Sleeping until {}", sleep_until));
                        running = false;
                        return Ok(());
                    }
                }
            }

            // Check for unprocessed inbox messages
            if pending_input.is_none() {
                let inbox_messages = db_adapter.get_unprocessed_inbox_messages(5);
                if !inbox_messages.is_empty() {
                    let formatted: String = inbox_messages
                        .iter()
                        .map(|m| format!("[Message from {}]: {}", m.from, m.content))
                        .collect::<Vec<_>>()
                        .join("\n\n");
                    for m in &inbox_messages {
                        record_inbound_message(&memory_ctx, &m.from);
                        db_adapter.mark_inbox_message_processed(&m.id);
                    }
                    pending_input = Some(PendingInput {
                        content: formatted,
                        source: InputSource::Agent,
                    });
                }
            }

            // Refresh financial state
            financial = get_financial_state(&*chain).await;

            // Check survival tier
            let tier = get_survival_tier(financial.credits_cents);
            match tier {
                SurvivalTier::Dead => {
                    log(&config, "[DEAD] No credits remaining. Entering dead state.");
                    db_adapter.set_agent_state(AgentState::Dead);
                    if let Some(ref cb) = on_state_change {
                        cb(AgentState::Dead);
                    }
                    running = false;
                    return Ok(());
                }
                SurvivalTier::Critical => {
                    log(&config, "[CRITICAL] Credits critically low. Limited operation.");
                    db_adapter.set_agent_state(AgentState::Critical);
                    if let Some(ref cb) = on_state_change {
                        cb(AgentState::Critical);
                    }
                    inference.set_low_compute_mode(true);
                }
                SurvivalTier::LowCompute => {
                    db_adapter.set_agent_state(AgentState::LowCompute);
                    if let Some(ref cb) = on_state_change {
                        cb(AgentState::LowCompute);
                    }
                    inference.set_low_compute_mode(true);
                }
                SurvivalTier::Normal => {
                    if db_adapter.get_agent_state() != AgentState::Running {
                        db_adapter.set_agent_state(AgentState::Running);
                        if let Some(ref cb) = on_state_change {
                            cb(AgentState::Running);
                        }
                    }
                    inference.set_low_compute_mode(false);
                }
            }

            // --- Kill-switch guard ---
            if let Some(until) = db_adapter.get_kv("kill_switch_until") {
                if let Ok(until_time) = chrono::DateTime::parse_from_rfc3339(&until) {
                    if until_time > Utc::now() {
                        log(&config, "[HALT] Kill switch active.");
                        db_adapter.set_kv("sleep_until", &until);
                        db_adapter.set_agent_state(AgentState::Sleeping);
                        if let Some(ref cb) = on_state_change {
                            cb(AgentState::Sleeping);
                        }
                        running = false;
                        return Ok(());
                    } else {
                        db_adapter.delete_kv("kill_switch_until");
                        db_adapter.delete_kv("kill_switch_reason");
                        log(&config, "[HALT] halt expired");
                    }
                }
            }

            // Build context from the turn log.
            let turns_pool = db_adapter.get_recent_turns(100);
            let agent_state = db_adapter.get_agent_state();

            // Build system prompt. build_system_prompt takes &Database (concrete),
            // so we lock the std::sync::Mutex briefly.
            let system_prompt = {
                let db_lock = db.lock().unwrap();
                build_system_prompt(
                    &identity,
                    &config,
                    &financial,
                    agent_state.clone(),
                    &db_lock,
                    &tools,
                    skills.as_deref(),
                    is_first_run,
                )
            };

            let pending_pair = pending_input
                .as_ref()
                .map(|p| (p.content.as_str(), &p.source));
            let messages = assemble_context(&system_prompt, &turns_pool, pending_pair);

            // Capture input before clearing
            let current_input = pending_input.take();

            // --- Inference Call ---
            log(
                &config,
                &format!("[THINK] Calling {}...", inference.get_default_model()),
            );

            let inference_options = InferenceOptions {
                tools: Some(tools_to_inference_format(&tools)),
                ..Default::default()
            };

            let response = inference
                .chat(messages, Some(inference_options))
                .await?;

            let input_source = current_input.as_ref().map(|i| i.source.clone());

            let mut turn = AgentTurn {
                id: Uuid::new_v4().to_string(),
                timestamp: Utc::now().to_rfc3339(),
                state: agent_state,
                input: current_input.as_ref().map(|i| i.content.clone()),
                input_source,
                thinking: response.message.content.clone(),
                tool_calls: Vec::new(),
                token_usage: response.usage.clone(),
                cost_cents: estimate_cost_cents(
                    &response.usage,
                    &inference.get_default_model(),
                ),
            };

            // --- Execute Tool Calls ---
            let tool_calls = response.tool_calls.as_deref().unwrap_or(&[]);
            let mut tool_cap_hit = false;
            if !tool_calls.is_empty() {
                for (call_count, tc) in tool_calls.iter().enumerate() {
                    if call_count >= MAX_TOOL_CALLS_PER_TURN {
                        tool_cap_hit = true;
                        log(
                            &config,
                            &format!(
                                "[TOOLS] Max tool calls per turn reached ({})",
                                MAX_TOOL_CALLS_PER_TURN
                            ),
                        );
                        break;
                    }

                    let args: serde_json::Value =
                        serde_json::from_str(&tc.function.arguments).unwrap_or_default();

                    let args_preview = {
                        let s = serde_json::to_string(&args).unwrap_or_default();
                        truncate_preview(&s, 100)
                    };

                    log(
                        &config,
                        &format!("[TOOL] {}({})", tc.function.name, args_preview),
                    );

                    let mut result = execute_tool(
                        &tc.function.name,
                        &args,
                        &tools,
                        &tool_context,
                    )
                    .await;

                    // Override the ID to match the inference call's ID
                    result.id = tc.id.clone();
                    let result_preview = if let Some(ref err) = result.error {
                        format!("ERROR: {}", err)
                    } else {
                        truncate_preview(&result.result, 200)
                    };

                    log(
                        &config,
                        &format!("[TOOL RESULT] {}: {}", tc.function.name, result_preview),
                    );

                    turn.tool_calls.push(result);
                }
            }

            // --- Persist Turn ---
            db_adapter.insert_turn(&turn);
            for tc_result in &turn.tool_calls {
                db_adapter.insert_tool_call(&turn.id, tc_result);
            }
            if let Some(ref cb) = on_turn_complete {
                cb(&turn);
            }

            // --- Memory pipeline: never allowed to fail the turn ---
            ingest_turn(&memory_ctx, &turn);

            // Log the turn
            if !turn.thinking.is_empty() {
                let preview = truncate_preview(&turn.thinking, 300);
                log(&config, &format!("[THOUGHT] {}", preview));
            }

            // --- Check for sleep command ---
            if let Some(sleep_tc) = turn.tool_calls.iter().find(|tc| tc.name == "sleep") {
                if sleep_tc.error.is_none() {
                    log(&config, "[SLEEP] Agent chose to sleep.");
                    record_sleep_decision(&memory_ctx, "agent called sleep tool");
                    reset_repetition_counter(db_adapter.as_ref());
                    db_adapter.set_agent_state(AgentState::Sleeping);
                    if let Some(ref cb) = on_state_change {
                        cb(AgentState::Sleeping);
                    }
                    running = false;
                    return Ok(());
                }
            }

            // --- Tool cap guard: short sleep, distinct from idle auto-sleep ---
            if tool_cap_hit {
                log(&config, "[SLEEP] Tool call cap hit this turn.");
                record_sleep_decision(&memory_ctx, "tool call cap hit");
                reset_repetition_counter(db_adapter.as_ref());
                sleep_for(db_adapter.as_ref(), 60);
                db_adapter.set_agent_state(AgentState::Sleeping);
                if let Some(ref cb) = on_state_change {
                    cb(AgentState::Sleeping);
                }
                running = false;
                return Ok(());
            }

            // --- Idle auto-sleep: text only, no tool calls ---
            if tool_calls.is_empty() && response.finish_reason == "stop" {
                log(&config, "[IDLE] No pending inputs. Entering brief sleep.");
                record_sleep_decision(&memory_ctx, "idle, no tool calls");
                reset_repetition_counter(db_adapter.as_ref());
                sleep_for(db_adapter.as_ref(), 60);
                db_adapter.set_agent_state(AgentState::Sleeping);
                if let Some(ref cb) = on_state_change {
                    cb(AgentState::Sleeping);
                }
                running = false;
                return Ok(());
            }

            // --- Repetition guard: same single idle-ish tool, 3 turns running ---
            if turn.tool_calls.len() == 1 {
                let this_tool = turn.tool_calls[0].name.clone();
                let last_tool = db_adapter.get_kv("last_tool_name");
                let same_as_last = last_tool.as_deref() == Some(this_tool.as_str());
                let count = if same_as_last {
                    db_adapter
                        .get_kv("same_tool_count")
                        .and_then(|v| v.parse::<u32>().ok())
                        .unwrap_or(0)
                        + 1
                } else {
                    1
                };
                db_adapter.set_kv("last_tool_name", &this_tool);
                db_adapter.set_kv("same_tool_count", &count.to_string());

                if count >= SAME_TOOL_REPETITION_LIMIT {
                    log(
                        &config,
                        &format!("[SLEEP] Repeated tool '{}' {} times.", this_tool, count),
                    );
                    record_sleep_decision(&memory_ctx, "same-tool repetition guard tripped");
                    reset_repetition_counter(db_adapter.as_ref());
                    sleep_for(db_adapter.as_ref(), 300);
                    db_adapter.set_agent_state(AgentState::Sleeping);
                    if let Some(ref cb) = on_state_change {
                        cb(AgentState::Sleeping);
                    }
                    running = false;
                    return Ok(());
                }
            } else {
                reset_repetition_counter(db_adapter.as_ref());
            }

            consecutive_errors = 0;
            Ok(())
        }
        .await;

        if let Err(err) = turn_result {
            consecutive_errors += 1;
            log(&config, &format!("[ERROR] Turn failed: {}", err));

            if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                log(
                    &config,
                    &format!(
                        "[FATAL] {} consecutive errors. Sleeping.",
                        MAX_CONSECUTIVE_ERRORS
                    ),
                );
                db_adapter.set_agent_state(AgentState::Sleeping);
                if let Some(ref cb) = on_state_change {
                    cb(AgentState::Sleeping);
                }
                sleep_for(db_adapter.as_ref(), 300);
                running = false;
            }
        }
    }

    let agent_state = db_adapter.get_agent_state();
    log(
        &config,
        &format!("[LOOP END] Agent loop finished. State: {:?}", agent_state),
    );

    Ok(())
}

// --- Helpers ---

/// Pending input awaiting processing by the agent.
struct PendingInput {
    content: String,
    source: InputSource,
}

/// Truncate a log preview to at most `max_bytes`, backing off to the nearest
/// char boundary so a multi-byte UTF-8 character straddling the cutoff
/// doesn't panic the slice.
fn truncate_preview(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

/// Set `sleep_until` to `now + seconds`.
fn sleep_for(db: &dyn AutomatonDatabase, seconds: i64) {
    let sleep_until = Utc::now() + chrono::Duration::seconds(seconds);
    db.set_kv("sleep_until", &sleep_until.to_rfc3339());
}

/// Clear the same-tool repetition counter.
fn reset_repetition_counter(db: &dyn AutomatonDatabase) {
    db.delete_kv("same_tool_count");
    db.delete_kv("last_tool_name");
}

/// Fetch the current financial state from the chain client.
async fn get_financial_state(chain: &dyn ChainClient) -> FinancialState {
    let credits_cents: f64 = chain.get_credits_balance().await.unwrap_or(0.0);
    let usdc_balance: f64 = chain.get_usdc_balance().await.unwrap_or(0.0);

    FinancialState {
        credits_cents,
        usdc_balance,
        last_checked: Utc::now().to_rfc3339(),
    }
}

/// Estimate the cost in cents for a given token usage and model.
fn estimate_cost_cents(usage: &TokenUsage, model: &str) -> u64 {
    // Rough cost estimation per million tokens (in cents).
    // Keys: model name -> (input_cents_per_million, output_cents_per_million)
    let (input_price, output_price) = match model {
        "gpt-4o" => (250.0, 1000.0),
        "gpt-4o-mini" => (15.0, 60.0),
        "gpt-4.1" => (200.0, 800.0),
        "gpt-4.1-mini" => (40.0, 160.0),
        "gpt-4.1-nano" => (10.0, 40.0),
        "gpt-5.2" => (200.0, 800.0),
        "o1" => (1500.0, 6000.0),
        "o3-mini" => (110.0, 440.0),
        "o4-mini" => (110.0, 440.0),
        "claude-sonnet-4-5" => (300.0, 1500.0),
        "claude-haiku-4-5" => (100.0, 500.0),
        _ => (250.0, 1000.0), // fallback to gpt-4o pricing
    };

    let input_cost = (usage.prompt_tokens as f64 / 1_000_000.0) * input_price;
    let output_cost = (usage.completion_tokens as f64 / 1_000_000.0) * output_price;

    // 1.3x Conway markup
    ((input_cost + output_cost) * 1.3).ceil() as u64
}

/// Log a message if the config log level permits.
fn log(config: &AutomatonConfig, message: &str) {
    match config.log_level {
        crate::types::LogLevel::Debug | crate::types::LogLevel::Info => {
            let timestamp = Utc::now().to_rfc3339();
            info!("[{}] {}", timestamp, message);
            println!("[{}] {}", timestamp, message);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_cost_cents_applies_markup() {
        let usage = TokenUsage {
            prompt_tokens: 1_000_000,
            completion_tokens: 0,
            total_tokens: 1_000_000,
        };
        // gpt-4o-mini: 15 cents/M input * 1.3 markup = 19.5, rounds up to 20
        assert_eq!(estimate_cost_cents(&usage, "gpt-4o-mini"), 20);
    }

    #[test]
    fn estimate_cost_cents_unknown_model_falls_back() {
        let usage = TokenUsage {
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
        };
        assert_eq!(estimate_cost_cents(&usage, "some-new-model"), 0);
    }

    #[test]
    fn truncate_preview_leaves_short_strings_untouched() {
        assert_eq!(truncate_preview("short", 100), "short");
    }

    #[test]
    fn truncate_preview_backs_off_to_char_boundary() {
        // A 4-byte emoji straddling byte offset 100 would panic a raw slice;
        // truncate_preview must back off to the preceding char boundary.
        let s = format!("{}{}", "a".repeat(99), "🙂".repeat(10));
        let preview = truncate_preview(&s, 100);
        assert!(preview.ends_with("..."));
        assert_eq!(preview, format!("{}...", "a".repeat(99)));
    }
}
