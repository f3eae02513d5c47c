//! Social Client
//!
//! Messaging client that communicates through a relay server on the
//! automaton's behalf. Message authenticity is the relay's concern,
//! enforced by the API key presented on each request; this client only
//! shapes requests/responses and identifies the automaton by its
//! registered address.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{InboxMessage, PollResponse, SendResponse, SocialClientInterface};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Outbound message payload posted to the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OutboundMessage {
    id: String,
    from: String,
    to: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<String>,
    timestamp: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Relay-backed social client for automaton-to-automaton messaging.
pub struct SocialClient {
    relay_url: String,
    address: String,
    api_key: String,
    http: reqwest::Client,
}

impl SocialClient {
    /// Create a new `SocialClient` pointed at `relay_url`, identifying
    /// outbound messages as coming from `address` and authenticating
    /// with `api_key`.
    pub fn new(relay_url: String, address: String, api_key: String) -> Self {
        Self {
            relay_url,
            address,
            api_key,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SocialClientInterface for SocialClient {
    /// Send a message to another automaton identified by `to` (its
    /// registered address). Optionally specify `reply_to` for threading.
    async fn send(&self, to: &str, content: &str, reply_to: Option<&str>) -> Result<SendResponse> {
        let message = OutboundMessage {
            id: Uuid::new_v4().to_string(),
            from: self.address.clone(),
            to: to.to_string(),
            content: content.to_string(),
            reply_to: reply_to.map(|s| s.to_string()),
            timestamp: Utc::now().to_rfc3339(),
        };

        let url = format!("{}/messages", self.relay_url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&message)
            .send()
            .await
            .context("Failed to send message to relay")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Relay returned {}: {}", status, body);
        }

        Ok(SendResponse { id: message.id })
    }

    /// Poll the relay for unprocessed messages addressed to this automaton.
    ///
    /// `cursor` is an opaque pagination token from a previous `PollResponse`.
    /// `limit` controls the maximum number of messages returned.
    async fn poll(&self, cursor: Option<&str>, limit: Option<u32>) -> Result<PollResponse> {
        let mut url = format!(
            "{}/messages/{}?limit={}",
            self.relay_url,
            self.address,
            limit.unwrap_or(20),
        );

        if let Some(c) = cursor {
            url.push_str(&format!("&cursor={}", c));
        }

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("Failed to poll relay for messages")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Relay returned {}: {}", status, body);
        }

        #[derive(Deserialize)]
        struct RawPollResponse {
            messages: Vec<InboxMessage>,
            #[serde(default)]
            next_cursor: Option<String>,
        }

        let raw: RawPollResponse = response
            .json()
            .await
            .context("Failed to parse poll response")?;

        Ok(PollResponse {
            messages: raw.messages,
            next_cursor: raw.next_cursor,
        })
    }

    /// Ask the relay how many unprocessed messages are waiting.
    async fn unread_count(&self) -> Result<u64> {
        let url = format!("{}/messages/{}/unread", self.relay_url, self.address);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("Failed to fetch unread count")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Relay returned {}: {}", status, body);
        }

        #[derive(Deserialize)]
        struct UnreadResponse {
            count: u64,
        }

        let body: UnreadResponse = response
            .json()
            .await
            .context("Failed to parse unread count response")?;

        Ok(body.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_stores_relay_identity_and_key() {
        let client = SocialClient::new(
            "https://relay.example".to_string(),
            "0xabc".to_string(),
            "key-123".to_string(),
        );
        assert_eq!(client.relay_url, "https://relay.example");
        assert_eq!(client.address, "0xabc");
        assert_eq!(client.api_key, "key-123");
    }

    #[test]
    fn outbound_message_serializes_without_reply_to_when_absent() {
        let message = OutboundMessage {
            id: "msg-1".to_string(),
            from: "0xfrom".to_string(),
            to: "0xto".to_string(),
            content: "hello".to_string(),
            reply_to: None,
            timestamp: "2026-01-01T00:00:00+00:00".to_string(),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert!(json.get("reply_to").is_none());
        assert_eq!(json["content"], "hello");
    }

    #[test]
    fn outbound_message_serializes_reply_to_when_present() {
        let message = OutboundMessage {
            id: "msg-2".to_string(),
            from: "0xfrom".to_string(),
            to: "0xto".to_string(),
            content: "reply".to_string(),
            reply_to: Some("msg-1".to_string()),
            timestamp: "2026-01-01T00:00:00+00:00".to_string(),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["reply_to"], "msg-1");
    }
}
