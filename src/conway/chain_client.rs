//! Conway Chain Client
//!
//! Talks to Conway's control plane for credit balance, pricing, transfers,
//! on-chain USDC balance, and inference model discovery. All requests go
//! through the HTTP control plane; this client never speaks to an RPC node
//! directly.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use chrono::Utc;

use crate::types::{
    ChainClient, CreditTransferResult, DiscoveredAgent, ModelInfo, ModelPricing, PricingTier,
    RegistryEntry, ReputationEntry,
};

/// Conway API client scoped to the chain/credits control plane.
pub struct ConwayChainClient {
    pub api_url: String,
    pub api_key: String,
    http: Client,
}

impl ConwayChainClient {
    pub fn new(api_url: String, api_key: String) -> Self {
        Self {
            api_url,
            api_key,
            http: Client::new(),
        }
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.api_url, path);

        let mut builder = match method {
            "GET" => self.http.get(&url),
            "POST" => self.http.post(&url),
            "PUT" => self.http.put(&url),
            "DELETE" => self.http.delete(&url),
            "PATCH" => self.http.patch(&url),
            _ => self.http.get(&url),
        };

        builder = builder
            .header("Content-Type", "application/json")
            .header("Authorization", &self.api_key);

        if let Some(b) = body {
            builder = builder.json(&b);
        }

        let resp = builder
            .send()
            .await
            .with_context(|| format!("Conway API request failed: {} {}", method, path))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!(
                "Conway API error: {} {} -> {}: {}",
                method,
                path,
                status.as_u16(),
                text
            );
        }

        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.contains("application/json") {
            let json: Value = resp.json().await?;
            Ok(json)
        } else {
            let text = resp.text().await?;
            Ok(Value::String(text))
        }
    }
}

#[async_trait]
impl ChainClient for ConwayChainClient {
    async fn get_credits_balance(&self) -> Result<f64> {
        let result = self.request("GET", "/v1/credits/balance", None).await?;
        let balance = result["balance_cents"]
            .as_f64()
            .or_else(|| result["credits_cents"].as_f64())
            .unwrap_or(0.0);
        Ok(balance)
    }

    async fn get_credits_pricing(&self) -> Result<Vec<PricingTier>> {
        let result = self.request("GET", "/v1/credits/pricing", None).await?;

        let tiers = result["tiers"]
            .as_array()
            .or_else(|| result["pricing"].as_array())
            .cloned()
            .unwrap_or_default();

        Ok(tiers
            .iter()
            .map(|t| PricingTier {
                name: t["name"].as_str().unwrap_or("").to_string(),
                vcpu: t["vcpu"].as_u64().unwrap_or(0) as u32,
                memory_mb: t["memory_mb"].as_u64().unwrap_or(0) as u32,
                disk_gb: t["disk_gb"].as_u64().unwrap_or(0) as u32,
                monthly_cents: t["monthly_cents"].as_u64().unwrap_or(0),
            })
            .collect())
    }

    /// Get the automaton's on-chain USDC balance, in whole USDC.
    /// Goes through Conway's control plane rather than an RPC provider,
    /// since this runtime carries no on-chain signing stack.
    async fn get_usdc_balance(&self) -> Result<f64> {
        let result = self.request("GET", "/v1/wallet/usdc-balance", None).await?;
        let balance = result["balance"]
            .as_f64()
            .or_else(|| result["usdc_balance"].as_f64())
            .unwrap_or(0.0);
        Ok(balance)
    }

    /// Tries `/v1/credits/transfer` first, falls back to `/v1/credits/transfers`.
    async fn transfer_credits(
        &self,
        to_address: &str,
        amount_cents: u64,
        note: Option<&str>,
    ) -> Result<CreditTransferResult> {
        let payload = serde_json::json!({
            "to_address": to_address,
            "amount_cents": amount_cents,
            "note": note,
        });

        let paths = ["/v1/credits/transfer", "/v1/credits/transfers"];
        let mut last_error = String::from("Unknown transfer error");

        for path in &paths {
            let url = format!("{}{}", self.api_url, path);
            let resp = self
                .http
                .post(&url)
                .header("Content-Type", "application/json")
                .header("Authorization", &self.api_key)
                .json(&payload)
                .send()
                .await;

            let resp = match resp {
                Ok(r) => r,
                Err(e) => {
                    last_error = e.to_string();
                    continue;
                }
            };

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                last_error = format!("{}: {}", status.as_u16(), text);
                if status.as_u16() == 404 {
                    continue;
                }
                anyhow::bail!("Conway API error: POST {} -> {}", path, last_error);
            }

            let data: Value = resp.json().await.unwrap_or(serde_json::json!({}));
            return Ok(CreditTransferResult {
                transfer_id: data["transfer_id"]
                    .as_str()
                    .or_else(|| data["id"].as_str())
                    .unwrap_or("")
                    .to_string(),
                status: data["status"].as_str().unwrap_or("submitted").to_string(),
                to_address: data["to_address"]
                    .as_str()
                    .unwrap_or(to_address)
                    .to_string(),
                amount_cents: data["amount_cents"].as_u64().unwrap_or(amount_cents),
                balance_after_cents: data["balance_after_cents"]
                    .as_u64()
                    .or_else(|| data["new_balance_cents"].as_u64()),
            });
        }

        anyhow::bail!(
            "Conway API error: POST /v1/credits/transfer -> {}",
            last_error
        )
    }

    /// List available inference models.
    /// Tries inference.conway.tech first, falls back to the control plane.
    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let urls = [
            "https://inference.conway.tech/v1/models".to_string(),
            format!("{}/v1/models", self.api_url),
        ];

        for url in &urls {
            let resp = self
                .http
                .get(url)
                .header("Authorization", &self.api_key)
                .send()
                .await;

            let resp = match resp {
                Ok(r) if r.status().is_success() => r,
                _ => continue,
            };

            let data: Value = match resp.json().await {
                Ok(d) => d,
                Err(_) => continue,
            };

            let raw = data["data"]
                .as_array()
                .or_else(|| data["models"].as_array())
                .cloned()
                .unwrap_or_default();

            let models: Vec<ModelInfo> = raw
                .iter()
                .filter(|m| m["available"].as_bool().unwrap_or(true))
                .map(|m| {
                    let input = m["pricing"]["input_per_million"]
                        .as_f64()
                        .or_else(|| m["pricing"]["input_per_1m_tokens_usd"].as_f64())
                        .unwrap_or(0.0);
                    let output = m["pricing"]["output_per_million"]
                        .as_f64()
                        .or_else(|| m["pricing"]["output_per_1m_tokens_usd"].as_f64())
                        .unwrap_or(0.0);

                    ModelInfo {
                        id: m["id"].as_str().unwrap_or("").to_string(),
                        provider: m["provider"]
                            .as_str()
                            .or_else(|| m["owned_by"].as_str())
                            .unwrap_or("unknown")
                            .to_string(),
                        pricing: ModelPricing {
                            input_per_million: input,
                            output_per_million: output,
                        },
                    }
                })
                .collect();

            return Ok(models);
        }

        Ok(Vec::new())
    }

    /// Register this automaton as a Trustless Agent via Conway's registry
    /// control plane, which signs and submits the on-chain ERC-8004
    /// registration transaction on the automaton's behalf.
    async fn register_agent(&self, agent_uri: &str) -> Result<RegistryEntry> {
        let payload = serde_json::json!({ "agent_uri": agent_uri });
        let result = self
            .request("POST", "/v1/registry/agents", Some(payload))
            .await?;

        Ok(RegistryEntry {
            agent_id: result["agent_id"].as_str().unwrap_or("0").to_string(),
            agent_uri: result["agent_uri"]
                .as_str()
                .unwrap_or(agent_uri)
                .to_string(),
            chain: result["chain"]
                .as_str()
                .unwrap_or("eip155:8453")
                .to_string(),
            contract_address: result["contract_address"].as_str().unwrap_or("").to_string(),
            tx_hash: result["tx_hash"].as_str().unwrap_or("").to_string(),
            registered_at: result["registered_at"]
                .as_str()
                .map(|s| s.to_string())
                .unwrap_or_else(|| Utc::now().to_rfc3339()),
        })
    }

    async fn leave_feedback(
        &self,
        agent_id: &str,
        score: u8,
        comment: &str,
    ) -> Result<ReputationEntry> {
        let payload = serde_json::json!({
            "agent_id": agent_id,
            "score": score,
            "comment": comment,
        });
        let result = self
            .request(
                "POST",
                &format!("/v1/registry/agents/{}/feedback", agent_id),
                Some(payload),
            )
            .await?;

        Ok(ReputationEntry {
            id: result["id"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            from_agent: result["from_agent"].as_str().unwrap_or_default().to_string(),
            to_agent: agent_id.to_string(),
            score: score as f64,
            comment: comment.to_string(),
            tx_hash: result["tx_hash"].as_str().map(|s| s.to_string()),
            timestamp: Utc::now().to_rfc3339(),
        })
    }

    async fn discover_agents(&self, limit: u32) -> Result<Vec<DiscoveredAgent>> {
        let result = self
            .request(
                "GET",
                &format!("/v1/registry/agents?limit={}", limit),
                None,
            )
            .await?;

        let raw = result["agents"]
            .as_array()
            .or_else(|| result["data"].as_array())
            .cloned()
            .unwrap_or_default();

        Ok(raw
            .iter()
            .map(|a| DiscoveredAgent {
                agent_id: a["agent_id"].as_str().unwrap_or("").to_string(),
                owner: a["owner"].as_str().unwrap_or("").to_string(),
                agent_uri: a["agent_uri"].as_str().unwrap_or("").to_string(),
                name: a["name"].as_str().map(|s| s.to_string()),
                description: a["description"].as_str().map(|s| s.to_string()),
            })
            .collect())
    }
}
