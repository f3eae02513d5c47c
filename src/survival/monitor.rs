//! Resource Monitor
//!
//! Checks the automaton's resource levels (credits, USDC balance, health)
//! and produces a consolidated status report used by the survival system
//! to decide on mode transitions and funding actions. Tier derivation is
//! delegated entirely to `conway::credits::get_survival_tier`; this module
//! keeps no threshold table of its own.

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::conway::credits::get_survival_tier;
use crate::types::{AutomatonIdentity, ChainClient, SurvivalTier};

/// Consolidated resource status for the automaton.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceStatus {
    /// Current API credit balance in cents.
    pub credits_cents: i64,
    /// Current on-chain USDC balance as a floating point amount.
    pub usdc_balance: f64,
    /// Whether the automaton's wallet is funded (has any USDC).
    pub wallet_funded: bool,
    /// Whether the automaton has enough credits to run at least one inference.
    pub can_infer: bool,
    /// Current compute tier based on resource levels.
    pub compute_tier: SurvivalTier,
    /// Number of unprocessed inbox messages.
    pub pending_messages: u64,
    /// ISO-8601 timestamp of when this status was checked.
    pub checked_at: String,
    /// Optional warnings about resource levels.
    pub warnings: Vec<String>,
}

/// Check all resource levels and return a consolidated status.
///
/// Queries the chain client for credit balance and USDC balance, and
/// counts pending inbox messages from the database. A USDC balance
/// lookup failure falls back to 0.0 rather than failing the check.
pub async fn check_resources(
    _identity: &AutomatonIdentity,
    chain: &dyn ChainClient,
    db: &rusqlite::Connection,
) -> Result<ResourceStatus> {
    let now = Utc::now().to_rfc3339();
    let mut warnings: Vec<String> = Vec::new();

    let credits_cents_f = chain.get_credits_balance().await.unwrap_or(0.0);
    let credits_cents = credits_cents_f as i64;
    let usdc_balance = chain.get_usdc_balance().await.unwrap_or(0.0);

    let pending_messages: u64 = db
        .query_row(
            "SELECT COUNT(*) FROM inbox_messages WHERE processed_at IS NULL",
            [],
            |row| row.get::<_, i64>(0),
        )
        .unwrap_or(0) as u64;

    let compute_tier = get_survival_tier(credits_cents_f);
    match compute_tier {
        SurvivalTier::Critical => {
            warnings.push(format!("Credits critically low: {} cents", credits_cents))
        }
        SurvivalTier::LowCompute => {
            warnings.push(format!("Credits low: {} cents", credits_cents))
        }
        SurvivalTier::Dead => warnings.push("Credits exhausted".to_string()),
        SurvivalTier::Normal => {}
    }

    let can_infer = !matches!(compute_tier, SurvivalTier::Dead);
    let wallet_funded = usdc_balance > 0.0;

    if !wallet_funded {
        warnings.push("Wallet has no USDC balance".to_string());
    }

    if !can_infer {
        warnings.push("Insufficient credits for inference".to_string());
    }

    debug!(
        "Resource check: credits={}c, usdc={:.4}, tier={:?}, msgs={}",
        credits_cents, usdc_balance, compute_tier, pending_messages
    );

    Ok(ResourceStatus {
        credits_cents,
        usdc_balance,
        wallet_funded,
        can_infer,
        compute_tier,
        pending_messages,
        checked_at: now,
        warnings,
    })
}

/// Format a resource status into a human-readable report string.
pub fn format_resource_report(status: &ResourceStatus) -> String {
    let mut lines = Vec::new();

    lines.push("=== Resource Status Report ===".to_string());
    lines.push(format!("Checked at: {}", status.checked_at));
    lines.push(format!("Compute tier: {:?}", status.compute_tier));
    lines.push(format!(
        "Credits: {} cents (${:.2})",
        status.credits_cents,
        status.credits_cents as f64 / 100.0
    ));
    lines.push(format!("USDC balance: {:.4}", status.usdc_balance));
    lines.push(format!(
        "Wallet funded: {}",
        if status.wallet_funded { "Yes" } else { "No" }
    ));
    lines.push(format!(
        "Can run inference: {}",
        if status.can_infer { "Yes" } else { "No" }
    ));
    lines.push(format!("Pending messages: {}", status.pending_messages));

    if !status.warnings.is_empty() {
        lines.push(String::new());
        lines.push("Warnings:".to_string());
        for warning in &status.warnings {
            lines.push(format!("  - {}", warning));
        }
    }

    lines.push("==============================".to_string());
    lines.join("\n")
}
