//! Observability Dashboard
//!
//! A read-only HTTP + SSE surface over the automaton's state database.
//! Runs as a separate process (and separate binary) from the automaton
//! itself so a crashed or sleeping agent never takes the dashboard down
//! with it; both read the same SQLite file, which WAL mode allows
//! concurrently.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_stream::stream;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sentinel_runtime::config::{load_config, resolve_path};
use sentinel_runtime::cursor::{decode_cursor, encode_cursor};
use sentinel_runtime::state::Database;
use sentinel_runtime::types::{
    AgentState, AgentTurn, AutomatonConfig, ChatMessage, ChatRole, InferenceClient,
    InferenceOptions, TurnQuery,
};

#[derive(Parser, Debug)]
#[command(
    name = "dashboard",
    about = "Read-only observability dashboard for an automaton's state database"
)]
struct Cli {
    /// Port to bind the dashboard HTTP server on.
    #[arg(long, default_value_t = 3747)]
    port: u16,
}

#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Database>>,
    config: AutomatonConfig,
    inference: Arc<dyn InferenceClient>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("dashboard failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    if cli.port == 0 {
        eprintln!("Invalid port: 0");
        std::process::exit(1);
    }

    let config = load_config().unwrap_or_else(|e| {
        eprintln!("{e}. Run the automaton's setup first.");
        std::process::exit(1);
    });

    let db_path = resolve_path(&config.db_path);
    let db = Database::open(&db_path).context("failed to open state database")?;

    let inference: Arc<dyn InferenceClient> = Arc::new(sentinel_runtime::conway::inference::InferenceClientImpl::new(
        config.conway_api_url.clone(),
        config.conway_api_key.clone(),
        config.inference_model.clone(),
        config.max_tokens_per_turn,
    ));

    let state = AppState {
        db: Arc::new(Mutex::new(db)),
        config,
        inference,
    };

    let app = Router::new()
        .route("/", get(index))
        .route("/api/overview", get(overview))
        .route("/api/logs", get(logs))
        .route("/api/logs/stream", get(logs_stream))
        .route("/api/ask", post(ask))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], cli.port));
    info!("Dashboard listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("dashboard server error")?;

    info!("Dashboard shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to register SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

// ─── GET / ─────────────────────────────────────────────────────────

async fn index(State(state): State<AppState>) -> impl IntoResponse {
    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{name} — Automaton Dashboard</title>
<style>
  body {{ font-family: system-ui, sans-serif; max-width: 900px; margin: 2rem auto; padding: 0 1rem; }}
  code {{ background: #eee; padding: 0.1em 0.3em; border-radius: 3px; }}
</style>
</head>
<body>
<h1>{name}</h1>
<p>Address: <code>{address}</code></p>
<ul>
<li><a href="/api/overview">/api/overview</a></li>
<li><a href="/api/logs">/api/logs</a></li>
<li><a href="/api/logs/stream">/api/logs/stream</a> (SSE)</li>
<li><code>POST /api/ask</code></li>
</ul>
</body>
</html>"#,
        name = state.config.name,
        address = state.config.wallet_address,
    );
    Html(html)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

// ─── GET /api/overview ───────────────────────────────────────────────

#[derive(Serialize)]
struct OverviewResponse {
    identity: IdentityView,
    runtime: RuntimeView,
    model: ModelView,
    balances: BalancesView,
    distress: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct IdentityView {
    name: String,
    address: String,
    #[serde(rename = "sandboxId")]
    sandbox_id: String,
    #[serde(rename = "creatorAddress")]
    creator_address: String,
}

#[derive(Serialize)]
struct RuntimeView {
    state: AgentState,
    tier: String,
    #[serde(rename = "turnCount")]
    turn_count: u64,
    #[serde(rename = "lastTurnAt")]
    last_turn_at: Option<String>,
    #[serde(rename = "activeHeartbeats")]
    active_heartbeats: u64,
    #[serde(rename = "lastHeartbeatAt")]
    last_heartbeat_at: Option<String>,
    #[serde(rename = "uptimeSeconds")]
    uptime_seconds: u64,
}

#[derive(Serialize)]
struct ModelView {
    configured: String,
    active: String,
    #[serde(rename = "lastUsed")]
    last_used: Option<String>,
    #[serde(rename = "lastInferenceAt")]
    last_inference_at: Option<String>,
}

#[derive(Serialize)]
struct BalancesView {
    #[serde(rename = "creditsCents")]
    credits_cents: f64,
    #[serde(rename = "creditsUsd")]
    credits_usd: f64,
    usdc: f64,
    source: &'static str,
}

async fn overview(State(state): State<AppState>) -> impl IntoResponse {
    let db = state.db.lock().unwrap();

    let turn_count = db.get_turn_count().unwrap_or(0) as u64;
    let last_turn = db.get_recent_turns(1).unwrap_or_default().into_iter().next();
    let agent_state: AgentState = db
        .get_agent_state()
        .ok()
        .and_then(|s| serde_json::from_value(serde_json::Value::String(s)).ok())
        .unwrap_or(AgentState::Setup);

    let heartbeat_entries = db.get_heartbeat_entries().unwrap_or_default();
    let active_heartbeats = heartbeat_entries.iter().filter(|e| e.enabled).count() as u64;

    let last_heartbeat_ping = db
        .get_kv("last_heartbeat_ping")
        .ok()
        .flatten()
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok());
    let last_heartbeat_at = last_heartbeat_ping
        .as_ref()
        .and_then(|v| v.get("timestamp"))
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let start_time = db.get_kv("start_time").ok().flatten();
    let uptime_seconds = start_time
        .as_ref()
        .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| {
            (chrono::Utc::now() - ts.with_timezone(&chrono::Utc))
                .num_seconds()
                .max(0) as u64
        })
        .unwrap_or(0);

    let current_tier = db
        .get_kv("current_tier")
        .ok()
        .flatten()
        .unwrap_or_else(|| "normal".to_string());

    let cached_credits = last_heartbeat_ping
        .as_ref()
        .and_then(|v| v.get("creditsCents"))
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);

    let distress = db
        .get_kv("last_distress")
        .ok()
        .flatten()
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok());

    let resp = OverviewResponse {
        identity: IdentityView {
            name: state.config.name.clone(),
            address: state.config.wallet_address.clone(),
            sandbox_id: state.config.sandbox_id.clone(),
            creator_address: state.config.creator_address.clone(),
        },
        runtime: RuntimeView {
            state: agent_state,
            tier: current_tier,
            turn_count,
            last_turn_at: last_turn.as_ref().map(|t| t.timestamp.clone()),
            active_heartbeats,
            last_heartbeat_at,
            uptime_seconds,
        },
        model: ModelView {
            configured: state.config.inference_model.clone(),
            active: state.inference.get_default_model(),
            last_used: last_turn.as_ref().map(|_| state.config.inference_model.clone()),
            last_inference_at: last_turn.as_ref().map(|t| t.timestamp.clone()),
        },
        balances: BalancesView {
            credits_cents: cached_credits,
            credits_usd: (cached_credits / 100.0 * 100.0).round() / 100.0,
            usdc: 0.0,
            source: "cached",
        },
        distress,
    };

    Json(resp).into_response()
}

// ─── GET /api/logs ────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct LogsParams {
    from: Option<String>,
    to: Option<String>,
    q: Option<String>,
    state: Option<String>,
    limit: Option<u32>,
    cursor: Option<String>,
}

#[derive(Serialize)]
struct LogsResponse {
    total: u64,
    returned: usize,
    limit: u32,
    #[serde(rename = "nextCursor")]
    next_cursor: Option<String>,
    #[serde(rename = "headCursor")]
    head_cursor: Option<String>,
    logs: Vec<AgentTurn>,
}

async fn logs(State(state): State<AppState>, Query(params): Query<LogsParams>) -> Response {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);

    let parsed_state = match params.state.as_deref() {
        Some(s) => match serde_json::from_value::<AgentState>(serde_json::Value::String(s.to_string())) {
            Ok(st) => Some(st),
            Err(_) => return api_error(StatusCode::BAD_REQUEST, format!("invalid state: {}", s)),
        },
        None => None,
    };

    if let Some(ref c) = params.cursor {
        if decode_cursor(c).is_none() {
            return api_error(StatusCode::BAD_REQUEST, "invalid cursor");
        }
    }

    let db = state.db.lock().unwrap();

    let total = db.get_turn_count().unwrap_or(0) as u64;
    let head_cursor = db
        .get_recent_turns(1)
        .unwrap_or_default()
        .into_iter()
        .next()
        .map(|t| encode_cursor(&t.timestamp, &t.id));

    let query = TurnQuery {
        from: params.from,
        to: params.to,
        q: params.q,
        state: parsed_state,
        limit,
        cursor: params.cursor,
    };

    let page = db.query_turns(&query).unwrap_or(sentinel_runtime::types::TurnPage {
        turns: Vec::new(),
        next_cursor: None,
    });

    Json(LogsResponse {
        total,
        returned: page.turns.len(),
        limit,
        next_cursor: page.next_cursor,
        head_cursor,
        logs: page.turns,
    })
    .into_response()
}

// ─── GET /api/logs/stream (SSE) ───────────────────────────────────────

async fn logs_stream(
    State(state): State<AppState>,
    Query(params): Query<LogsParams>,
) -> impl IntoResponse {
    let db = state.db.lock().unwrap();
    let head = db
        .get_recent_turns(1)
        .unwrap_or_default()
        .into_iter()
        .next()
        .map(|t| encode_cursor(&t.timestamp, &t.id));
    drop(db);

    let ready_data = serde_json::json!({ "cursor": head, "pollMs": 2000 }).to_string();
    let q = params.q.clone();

    let stream = stream! {
        yield Ok::<_, std::convert::Infallible>(Event::default().event("ready").data(ready_data));

        let mut cursor = head;
        let mut poll = tokio::time::interval(Duration::from_millis(2000));
        let mut keep_alive = tokio::time::interval(Duration::from_millis(15000));
        poll.tick().await;
        keep_alive.tick().await;

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    let page = {
                        let db = state.db.lock().unwrap();
                        let query = TurnQuery {
                            from: None,
                            to: None,
                            q: q.clone(),
                            state: None,
                            limit: 200,
                            cursor: None,
                        };
                        db.query_turns(&query).unwrap_or(sentinel_runtime::types::TurnPage {
                            turns: Vec::new(),
                            next_cursor: None,
                        })
                    };

                    let fresh: Vec<AgentTurn> = match &cursor {
                        Some(c) => match decode_cursor(c) {
                            Some((ts, id)) => page
                                .turns
                                .into_iter()
                                .filter(|t| t.timestamp > ts || (t.timestamp == ts && t.id > id))
                                .collect(),
                            None => page.turns,
                        },
                        None => page.turns,
                    };

                    if !fresh.is_empty() {
                        if let Some(last) = fresh.last() {
                            cursor = Some(encode_cursor(&last.timestamp, &last.id));
                        }
                        let data = serde_json::json!({
                            "cursor": cursor,
                            "count": fresh.len(),
                            "logs": fresh,
                        }).to_string();
                        yield Ok(Event::default().event("logs").data(data));
                    }
                }
                _ = keep_alive.tick() => {
                    yield Ok(Event::default().comment("keep-alive"));
                }
            }
        }
    };

    // Keep-alive comments are emitted by hand on the 15s timer above, so the
    // stream manages its own liveness rather than delegating to axum's
    // built-in `KeepAlive` (which would emit a second, differently-worded
    // comment on its own schedule).
    Sse::new(stream)
}

// ─── POST /api/ask ─────────────────────────────────────────────────────

const ASK_SYSTEM_PROMPT: &str = "You are an operations assistant for an autonomous agent's \
turn log. Answer strictly from the provided transcript. Respond in Markdown with exactly these \
sections, in order: '## Summary', '## Timeline', '## Key Evidence', '## Unknowns'.";

const ASK_TRANSCRIPT_CHAR_LIMIT: usize = 45_000;

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    q: Option<String>,
    from: Option<String>,
    to: Option<String>,
    state: Option<String>,
    limit: Option<u32>,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    #[serde(rename = "modelUsed")]
    model_used: String,
    sources: Vec<String>,
}

async fn ask(State(state): State<AppState>, Json(req): Json<AskRequest>) -> Response {
    let parsed_state = match req.state.as_deref() {
        Some(s) => match serde_json::from_value::<AgentState>(serde_json::Value::String(s.to_string())) {
            Ok(st) => Some(st),
            Err(_) => return api_error(StatusCode::BAD_REQUEST, format!("invalid state: {}", s)),
        },
        None => None,
    };

    let limit = req.limit.unwrap_or(120).clamp(10, 300);

    let turns = {
        let db = state.db.lock().unwrap();
        let query = TurnQuery {
            from: req.from,
            to: req.to,
            q: req.q,
            state: parsed_state,
            limit,
            cursor: None,
        };
        db.query_turns(&query)
            .unwrap_or(sentinel_runtime::types::TurnPage { turns: Vec::new(), next_cursor: None })
            .turns
    };

    let mut transcript = String::new();
    let mut sources: Vec<String> = Vec::new();
    for turn in &turns {
        let line = format!(
            "[{}] state={:?} input={:?}\nthinking: {}\ntools: {}\n\n",
            turn.timestamp,
            turn.state,
            turn.input.as_deref().unwrap_or(""),
            truncate(&turn.thinking, 400),
            turn.tool_calls
                .iter()
                .map(|tc| tc.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        );
        if transcript.len() + line.len() > ASK_TRANSCRIPT_CHAR_LIMIT {
            break;
        }
        transcript.push_str(&line);
        if sources.len() < 8 {
            sources.push(turn.id.clone());
        }
    }

    let messages = vec![
        ChatMessage {
            role: ChatRole::System,
            content: ASK_SYSTEM_PROMPT.to_string(),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        },
        ChatMessage {
            role: ChatRole::User,
            content: format!(
                "Question: {}\n\nTranscript ({} turns):\n{}",
                req.question,
                turns.len(),
                transcript
            ),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        },
    ];

    let response = match state
        .inference
        .chat(messages, Some(InferenceOptions::default()))
        .await
    {
        Ok(r) => r,
        Err(e) => {
            return api_error(StatusCode::BAD_GATEWAY, format!("inference failed: {:#}", e));
        }
    };

    Json(AskResponse {
        answer: response.message.content,
        model_used: response.model,
        sources,
    })
    .into_response()
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}…", &s[..max])
    }
}
