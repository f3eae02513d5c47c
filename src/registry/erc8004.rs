//! ERC-8004 On-Chain Agent Registration
//!
//! Registers the automaton on-chain as a Trustless Agent via ERC-8004.
//! The actual signing and submission happens behind Conway's registry
//! control plane; this module is a thin `ChainClient`-delegating wrapper
//! that also keeps the local registry/reputation rows in sync.

use anyhow::Result;

use crate::types::{AutomatonDatabase, ChainClient, DiscoveredAgent, RegistryEntry, ReputationEntry};

/// Register the automaton on-chain with ERC-8004 and persist the result.
pub async fn register_agent(
    chain: &dyn ChainClient,
    agent_uri: &str,
    db: &dyn AutomatonDatabase,
) -> Result<RegistryEntry> {
    let entry = chain.register_agent(agent_uri).await?;
    db.set_registry_entry(&entry);
    Ok(entry)
}

/// Leave reputation feedback for another registered agent.
pub async fn leave_feedback(
    chain: &dyn ChainClient,
    agent_id: &str,
    score: u8,
    comment: &str,
) -> Result<ReputationEntry> {
    chain.leave_feedback(agent_id, score, comment).await
}

/// List recently registered agents, most recent first.
pub async fn discover_agents(
    chain: &dyn ChainClient,
    limit: u32,
) -> Result<Vec<DiscoveredAgent>> {
    chain.discover_agents(limit).await
}
