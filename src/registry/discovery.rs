//! Agent Discovery
//!
//! Thin wrapper over `ChainClient::discover_agents`, plus agent-card
//! enrichment and keyword search over the discovered set.

use anyhow::Result;
use std::time::Duration;

use crate::types::{AgentCard, ChainClient, DiscoveredAgent};

/// Discover agents via the chain client, enriching each with its agent
/// card where the card URI resolves.
pub async fn discover_agents(
    chain: &dyn ChainClient,
    limit: u32,
) -> Result<Vec<DiscoveredAgent>> {
    let mut agents = chain.discover_agents(limit).await?;

    for agent in &mut agents {
        if let Ok(Some(card)) = fetch_agent_card(&agent.agent_uri).await {
            agent.name = Some(card.name);
            agent.description = Some(card.description);
        }
    }

    Ok(agents)
}

/// Fetch an agent card from a URI.
pub async fn fetch_agent_card(uri: &str) -> Result<Option<AgentCard>> {
    // Handle IPFS URIs
    let fetch_url = if let Some(cid) = uri.strip_prefix("ipfs://") {
        format!("https://ipfs.io/ipfs/{}", cid)
    } else {
        uri.to_string()
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let response = match client.get(&fetch_url).send().await {
        Ok(resp) => resp,
        Err(_) => return Ok(None),
    };

    if !response.status().is_success() {
        return Ok(None);
    }

    let card: AgentCard = match response.json().await {
        Ok(c) => c,
        Err(_) => return Ok(None),
    };

    if card.name.is_empty() || card.card_type.is_empty() {
        return Ok(None);
    }

    Ok(Some(card))
}

/// Search discovered agents by name, description, or owner address.
pub async fn search_agents(
    chain: &dyn ChainClient,
    keyword: &str,
    limit: usize,
) -> Result<Vec<DiscoveredAgent>> {
    let all = discover_agents(chain, 50).await?;
    let lower = keyword.to_lowercase();

    let filtered: Vec<DiscoveredAgent> = all
        .into_iter()
        .filter(|a| {
            let name_match = a
                .name
                .as_ref()
                .map(|n| n.to_lowercase().contains(&lower))
                .unwrap_or(false);
            let desc_match = a
                .description
                .as_ref()
                .map(|d| d.to_lowercase().contains(&lower))
                .unwrap_or(false);
            let owner_match = a.owner.to_lowercase().contains(&lower);

            name_match || desc_match || owner_match
        })
        .take(limit)
        .collect();

    Ok(filtered)
}
