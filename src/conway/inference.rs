//! Conway Inference Client
//!
//! Wraps Conway's `/v1/chat/completions` endpoint (OpenAI-compatible). The
//! automaton pays for its own thinking through Conway credits, so the model
//! in use here is not fixed: `set_low_compute_mode` swaps in whatever model
//! [`crate::survival::low_compute::get_model_for_tier`] picks for a degraded
//! survival tier, keeping the inference layer's downgrade behavior in sync
//! with the rest of the crate's tier logic instead of hardcoding a second
//! cheap-model choice here.

use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::survival::low_compute::get_model_for_tier;
use crate::types::{
    ChatMessage, ChatRole, InferenceClient, InferenceOptions, InferenceResponse,
    InferenceToolCall, InferenceToolCallFunction, SurvivalTier, TokenUsage,
};

const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Models that expect `max_completion_tokens` instead of the legacy
/// `max_tokens` field: o-series, gpt-5.x, and gpt-4.1.
fn uses_completion_tokens_param(model: &str) -> bool {
    regex::Regex::new(r"^(o[1-9]|gpt-5|gpt-4\.1)")
        .map(|re| re.is_match(model))
        .unwrap_or(false)
}

/// Inference client for OpenAI-compatible chat completions via Conway.
pub struct InferenceClientImpl {
    api_url: String,
    api_key: String,
    current_model: Mutex<String>,
    max_tokens: Mutex<u32>,
    default_model: String,
    http: Client,
}

impl InferenceClientImpl {
    /// Create a new inference client.
    ///
    /// * `api_url` - Base URL for the inference API (e.g. `https://inference.conway.tech`).
    /// * `api_key` - API key / Authorization header value.
    /// * `default_model` - Default model identifier (e.g. `gpt-4o`).
    /// * `max_tokens` - Default max tokens per completion.
    pub fn new(api_url: String, api_key: String, default_model: String, max_tokens: u32) -> Self {
        Self {
            api_url,
            api_key,
            current_model: Mutex::new(default_model.clone()),
            max_tokens: Mutex::new(max_tokens),
            default_model,
            http: Client::new(),
        }
    }

    fn build_request_body(&self, model: &str, messages: &[ChatMessage], options: &Option<InferenceOptions>) -> Value {
        let token_limit = options
            .as_ref()
            .and_then(|o| o.max_tokens)
            .unwrap_or(*self.max_tokens.lock().unwrap());

        let formatted_messages: Vec<Value> = messages.iter().map(format_message).collect();

        let mut body = serde_json::json!({
            "model": model,
            "messages": formatted_messages,
            "stream": false,
        });

        if uses_completion_tokens_param(model) {
            body["max_completion_tokens"] = serde_json::json!(token_limit);
        } else {
            body["max_tokens"] = serde_json::json!(token_limit);
        }

        if let Some(ref opts) = options {
            if let Some(temp) = opts.temperature {
                body["temperature"] = serde_json::json!(temp);
            }
        }

        if let Some(tool_defs) = options.as_ref().and_then(|o| o.tools.as_ref()) {
            if !tool_defs.is_empty() {
                body["tools"] = serde_json::json!(tool_defs);
                body["tool_choice"] = serde_json::json!("auto");
            }
        }

        body
    }
}

#[async_trait]
impl InferenceClient for InferenceClientImpl {
    /// Send a chat completion request and return the inference response.
    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        options: Option<InferenceOptions>,
    ) -> Result<InferenceResponse> {
        let model = {
            let current = self.current_model.lock().unwrap();
            options
                .as_ref()
                .and_then(|o| o.model.clone())
                .unwrap_or_else(|| current.clone())
        };

        let body = self.build_request_body(&model, &messages, &options);

        let url = format!("{}{}", self.api_url, CHAT_COMPLETIONS_PATH);
        debug!("Inference request to {} (model={})", url, model);

        let resp = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("Inference request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Inference error: {}: {}", status.as_u16(), text);
        }

        let data: Value = resp.json().await.context("Failed to parse inference response")?;
        parse_chat_response(data, &model)
    }

    /// Toggle low-compute mode. When enabled, switches to the model
    /// [`get_model_for_tier`] picks for the `low_compute` survival tier and
    /// reduces the max-tokens budget to conserve credits; when disabled,
    /// restores the default model.
    fn set_low_compute_mode(&self, enabled: bool) {
        if enabled {
            let downgraded = get_model_for_tier(&SurvivalTier::LowCompute, &self.default_model);
            debug!("Low-compute mode enabled: {} -> {}", self.default_model, downgraded);
            *self.current_model.lock().unwrap() = downgraded;
            *self.max_tokens.lock().unwrap() = 4096;
        } else {
            *self.current_model.lock().unwrap() = self.default_model.clone();
        }
    }

    /// Get the currently active model identifier.
    fn get_default_model(&self) -> String {
        self.current_model.lock().unwrap().clone()
    }
}

/// Parse a raw chat-completions JSON response into an [`InferenceResponse`].
fn parse_chat_response(data: Value, requested_model: &str) -> Result<InferenceResponse> {
    let choice = data["choices"]
        .get(0)
        .ok_or_else(|| anyhow::anyhow!("No completion choice returned from inference"))?;

    let message = &choice["message"];

    let usage = TokenUsage {
        prompt_tokens: data["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
        completion_tokens: data["usage"]["completion_tokens"].as_u64().unwrap_or(0),
        total_tokens: data["usage"]["total_tokens"].as_u64().unwrap_or(0),
    };

    let tool_calls: Option<Vec<InferenceToolCall>> = message["tool_calls"].as_array().map(|tcs| {
        tcs.iter()
            .map(|tc| InferenceToolCall {
                id: tc["id"].as_str().unwrap_or("").to_string(),
                call_type: "function".to_string(),
                function: InferenceToolCallFunction {
                    name: tc["function"]["name"].as_str().unwrap_or("").to_string(),
                    arguments: tc["function"]["arguments"].as_str().unwrap_or("{}").to_string(),
                },
            })
            .collect()
    });

    let role = match message["role"].as_str().unwrap_or("assistant") {
        "system" => ChatRole::System,
        "user" => ChatRole::User,
        "assistant" => ChatRole::Assistant,
        "tool" => ChatRole::Tool,
        _ => ChatRole::Assistant,
    };

    let response_message = ChatMessage {
        role,
        content: message["content"].as_str().unwrap_or("").to_string(),
        name: message["name"].as_str().map(|s| s.to_string()),
        tool_calls: tool_calls.clone(),
        tool_call_id: message["tool_call_id"].as_str().map(|s| s.to_string()),
    };

    Ok(InferenceResponse {
        id: data["id"].as_str().unwrap_or("").to_string(),
        model: data["model"].as_str().unwrap_or(requested_model).to_string(),
        message: response_message,
        tool_calls,
        usage,
        finish_reason: choice["finish_reason"].as_str().unwrap_or("stop").to_string(),
    })
}

/// Format a ChatMessage into the JSON structure expected by the OpenAI-compatible API.
fn format_message(msg: &ChatMessage) -> Value {
    let mut formatted = serde_json::json!({
        "role": msg.role,
        "content": msg.content,
    });

    if let Some(ref name) = msg.name {
        formatted["name"] = serde_json::json!(name);
    }

    if let Some(ref tool_calls) = msg.tool_calls {
        let tc_json: Vec<Value> = tool_calls
            .iter()
            .map(|tc| {
                serde_json::json!({
                    "id": tc.id,
                    "type": tc.call_type,
                    "function": {
                        "name": tc.function.name,
                        "arguments": tc.function.arguments,
                    }
                })
            })
            .collect();
        formatted["tool_calls"] = serde_json::json!(tc_json);
    }

    if let Some(ref tool_call_id) = msg.tool_call_id {
        formatted["tool_call_id"] = serde_json::json!(tool_call_id);
    }

    formatted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_completion_tokens_param_matches_newer_models() {
        assert!(uses_completion_tokens_param("gpt-5-mini"));
        assert!(uses_completion_tokens_param("o1-preview"));
        assert!(uses_completion_tokens_param("gpt-4.1"));
        assert!(!uses_completion_tokens_param("gpt-4o"));
    }

    #[test]
    fn parse_chat_response_extracts_usage_and_message() {
        let data = serde_json::json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o",
            "choices": [{
                "finish_reason": "stop",
                "message": {"role": "assistant", "content": "hello"}
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });

        let resp = parse_chat_response(data, "gpt-4o").unwrap();
        assert_eq!(resp.message.content, "hello");
        assert_eq!(resp.usage.total_tokens, 15);
        assert_eq!(resp.finish_reason, "stop");
    }
}
