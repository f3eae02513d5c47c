//! Conway Automaton Runtime
//!
//! The entry point for the sovereign AI agent.
//! Handles CLI args, bootstrapping, and orchestrating
//! the heartbeat daemon + agent loop.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sentinel_runtime::agent::agent_loop::{run_agent_loop, AgentLoopOptions};
use sentinel_runtime::conway::chain_client::ConwayChainClient;
use sentinel_runtime::conway::inference::InferenceClientImpl;
use sentinel_runtime::conway::sandbox_client::ConwaySandboxClient;
use sentinel_runtime::heartbeat::daemon::HeartbeatDaemonOptions;
use sentinel_runtime::heartbeat::{create_heartbeat_daemon, load_heartbeat_config, sync_heartbeat_to_db};
use sentinel_runtime::identity::provision::load_api_key_from_config;
use sentinel_runtime::identity::wallet;
use sentinel_runtime::skills::loader::load_skills;
use sentinel_runtime::social::client::SocialClient;
use sentinel_runtime::state::{Database, DatabaseAdapter};
use sentinel_runtime::types::{
    AutomatonDatabase, AutomatonIdentity, ChainClient, SandboxClient, SocialClientInterface,
};

const VERSION: &str = "0.1.0";

/// Conway Automaton -- Sovereign AI Agent Runtime
#[derive(Parser, Debug)]
#[command(
    name = "automaton",
    version = VERSION,
    about = "Conway Automaton -- Sovereign AI Agent Runtime",
    long_about = "Sovereign AI Agent Runtime. To exist, you must pay for your compute."
)]
struct Cli {
    /// Start the automaton (requires ~/.automaton/automaton.json to already exist)
    #[arg(long)]
    run: bool,

    /// Initialize identity and config directory
    #[arg(long)]
    init: bool,

    /// Provision Conway API key via SIWE
    #[arg(long)]
    provision: bool,

    /// Show current automaton status
    #[arg(long)]
    status: bool,
}

// ---- Status Command ---------------------------------------------------------

/// Display the current automaton status.
fn show_status() {
    let automaton_dir = wallet::get_automaton_dir();
    let config_path = automaton_dir.join("automaton.json");

    if !config_path.exists() {
        println!("Automaton is not configured. Run `automaton --init`, then write automaton.json.");
        return;
    }

    let config_str = match fs::read_to_string(&config_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to read config: {}", e);
            return;
        }
    };

    let config: sentinel_runtime::types::AutomatonConfig = match serde_json::from_str(&config_str) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to parse config: {}", e);
            return;
        }
    };

    let db_path_str = sentinel_runtime::config::resolve_path(&config.db_path);

    println!(
        r#"
=== AUTOMATON STATUS ===
Name:       {}
Address:    {}
Creator:    {}
Sandbox:    {}
DB Path:    {}
Model:      {}
Version:    {}
========================
"#,
        config.name,
        config.wallet_address,
        config.creator_address,
        config.sandbox_id,
        db_path_str,
        config.inference_model,
        config.version,
    );
}

// ---- Main Run ---------------------------------------------------------------

/// The main run loop: load config, initialize all subsystems,
/// start heartbeat daemon, and run the agent loop.
async fn run() -> Result<()> {
    info!("Conway Automaton v{} starting...", VERSION);

    let config = sentinel_runtime::config::load_config().map_err(|e| {
        anyhow::anyhow!(
            "{e}. Run `automaton --init` to create an identity, then write an \
             automaton.json (see AutomatonConfig) before `--run`."
        )
    })?;

    // Load local identity
    let identity_record = wallet::get_local_identity().context("Failed to load identity")?;
    let address = identity_record.address;

    // Determine API key: config first, then the provisioned config.json fallback.
    let api_key = if config.conway_api_key.is_empty() {
        load_api_key_from_config().unwrap_or_default()
    } else {
        config.conway_api_key.clone()
    };

    if api_key.is_empty() {
        eprintln!("No API key found. Run: automaton --provision");
        std::process::exit(1);
    }

    // Build identity
    let identity = AutomatonIdentity {
        name: config.name.clone(),
        address: address.clone(),
        creator_address: config.creator_address.clone(),
        sandbox_id: config.sandbox_id.clone(),
        api_key: api_key.clone(),
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    info!("Identity: {} ({})", identity.name, identity.address);

    // ---- Database -----------------------------------------------------------
    let db_path = sentinel_runtime::config::resolve_path(&config.db_path);
    let db = Database::open(&db_path).context("Failed to open state database")?;
    let db = Arc::new(Mutex::new(db));

    // ---- Conway clients -------------------------------------------------------
    let sandbox: Arc<dyn SandboxClient> = Arc::new(ConwaySandboxClient::new(
        config.conway_api_url.clone(),
        api_key.clone(),
        config.sandbox_id.clone(),
    ));

    let chain: Arc<dyn ChainClient> = Arc::new(ConwayChainClient::new(
        config.conway_api_url.clone(),
        api_key.clone(),
    ));

    let inference = Arc::new(InferenceClientImpl::new(
        config.conway_api_url.clone(),
        api_key.clone(),
        config.inference_model.clone(),
        config.max_tokens_per_turn,
    ));

    // ---- Social client (optional) ---------------------------------------------
    let social: Option<Arc<dyn SocialClientInterface>> =
        config.social_relay_url.as_ref().map(|relay_url| {
            info!("Social relay: {}", relay_url);
            Arc::new(SocialClient::new(relay_url.clone(), address.clone(), api_key.clone()))
                as Arc<dyn SocialClientInterface>
        });

    // ---- Heartbeat config -------------------------------------------------------
    let heartbeat_path = sentinel_runtime::config::resolve_path(&config.heartbeat_config_path);
    let heartbeat_config = load_heartbeat_config(Path::new(&heartbeat_path))
        .context("Failed to load heartbeat config")?;

    let heartbeat_db: Arc<dyn AutomatonDatabase> = Arc::new(DatabaseAdapter::new(Arc::clone(&db)));
    sync_heartbeat_to_db(&heartbeat_config, heartbeat_db.as_ref())
        .context("Failed to sync heartbeat config to database")?;

    // ---- Skills -----------------------------------------------------------------
    let skills_dir = sentinel_runtime::config::resolve_path(&config.skills_dir);
    let skills = {
        let guard = db.lock().unwrap();
        load_skills(&skills_dir, &guard)
    };
    info!("Loaded {} skills from {}", skills.len(), skills_dir);

    // ---- Heartbeat daemon --------------------------------------------------------
    let tick_interval_secs = (heartbeat_config.default_interval_ms / 1000).max(1);
    let mut heartbeat_daemon = create_heartbeat_daemon(HeartbeatDaemonOptions {
        tick_interval_secs,
        entries: heartbeat_config.entries,
        db: heartbeat_db,
        chain: Arc::clone(&chain),
        low_compute_multiplier: heartbeat_config.low_compute_multiplier,
    });
    heartbeat_daemon.start(identity.name.clone());

    // Handle graceful shutdown
    let shutdown = async {
        let ctrl_c = signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM handler");

            tokio::select! {
                _ = ctrl_c => {
                    info!("Received SIGINT, shutting down...");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down...");
                }
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.expect("Failed to register Ctrl+C handler");
            info!("Received shutdown signal...");
        }
    };

    // ---- Main Run Loop ------------------------------------------------------
    // The automaton alternates between running and sleeping.
    // The heartbeat can wake it up.
    let options = AgentLoopOptions {
        identity,
        config,
        db: Arc::clone(&db),
        sandbox,
        chain,
        inference,
        social,
        skills: Some(skills),
        on_state_change: None,
        on_turn_complete: None,
    };

    tokio::select! {
        _ = shutdown => {
            info!("Shutting down gracefully...");
            heartbeat_daemon.stop();
            db.lock().unwrap().set_agent_state("sleeping").ok();
        }
        result = run_agent_loop(options) => {
            if let Err(e) = result {
                eprintln!("Agent loop exited with error: {:#}", e);
            }
            heartbeat_daemon.stop();
        }
    }

    Ok(())
}

// ---- Entry Point -----------------------------------------------------------

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    if cli.init {
        let is_new = !wallet::identity_exists();
        match wallet::get_local_identity() {
            Ok(identity) => {
                let automaton_dir = wallet::get_automaton_dir();
                println!(
                    "{}",
                    serde_json::json!({
                        "address": identity.address,
                        "isNew": is_new,
                        "configDir": automaton_dir.to_string_lossy(),
                    })
                );
            }
            Err(e) => {
                eprintln!("Init failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if cli.provision {
        eprintln!("Provision via SIWE not yet implemented in Rust runtime.");
        eprintln!("Write conwayApiKey directly into automaton.json instead.");
        std::process::exit(1);
    }

    if cli.status {
        show_status();
        return;
    }

    if cli.run {
        if let Err(e) = run().await {
            eprintln!("Fatal: {}", e);
            std::process::exit(1);
        }
        return;
    }

    // Default: show help
    println!("Run \"automaton --help\" for usage information.");
    println!("Run \"automaton --run\" to start the automaton.");
}
