//! Conway Sandbox Client
//!
//! Talks to Conway's control plane for sandbox execution, file I/O, port
//! exposure, and sandbox lifecycle management.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::types::{CreateSandboxOptions, ExecResult, PortInfo, SandboxClient, SandboxInfo};

/// Conway API client scoped to sandbox operations.
pub struct ConwaySandboxClient {
    pub api_url: String,
    pub api_key: String,
    pub sandbox_id: String,
    http: Client,
}

impl ConwaySandboxClient {
    pub fn new(api_url: String, api_key: String, sandbox_id: String) -> Self {
        Self {
            api_url,
            api_key,
            sandbox_id,
            http: Client::new(),
        }
    }

    /// Internal helper: send an HTTP request to the Conway API and return JSON.
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
impl SandboxClient for ConwaySandboxClient {
    async fn exec(&self, command: &str, timeout: Option<u64>) -> Result<ExecResult> {
        let mut body = serde_json::json!({ "command": command });
        if let Some(t) = timeout {
            body["timeout"] = serde_json::json!(t);
        }

        let result = self
            .request(
                "POST",
                &format!("/v1/sandboxes/{}/exec", self.sandbox_id),
                Some(body),
            )
            .await?;

        Ok(ExecResult {
            stdout: result["stdout"].as_str().unwrap_or("").to_string(),
            stderr: result["stderr"].as_str().unwrap_or("").to_string(),
            exit_code: result["exit_code"]
                .as_i64()
                .or_else(|| result["exitCode"].as_i64())
                .unwrap_or(0) as i32,
        })
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let body = serde_json::json!({ "path": path, "content": content });
        self.request(
            "POST",
            &format!("/v1/sandboxes/{}/files/upload/json", self.sandbox_id),
            Some(body),
        )
        .await?;
        Ok(())
    }

    async fn read_file(&self, file_path: &str) -> Result<String> {
        let encoded = urlencoding::encode(file_path);
        let result = self
            .request(
                "GET",
                &format!(
                    "/v1/sandboxes/{}/files/read?path={}",
                    self.sandbox_id, encoded
                ),
                None,
            )
            .await?;

        match result {
            Value::String(s) => Ok(s),
            _ => Ok(result["content"].as_str().unwrap_or("").to_string()),
        }
    }

    async fn expose_port(&self, port: u16) -> Result<PortInfo> {
        let body = serde_json::json!({ "port": port });
        let result = self
            .request(
                "POST",
                &format!("/v1/sandboxes/{}/ports/expose", self.sandbox_id),
                Some(body),
            )
            .await?;

        let public_url = result["public_url"]
            .as_str()
            .or_else(|| result["publicUrl"].as_str())
            .or_else(|| result["url"].as_str())
            .unwrap_or("")
            .to_string();

        Ok(PortInfo {
            port,
            public_url,
            sandbox_id: self.sandbox_id.clone(),
        })
    }

    async fn remove_port(&self, port: u16) -> Result<()> {
        self.request(
            "DELETE",
            &format!("/v1/sandboxes/{}/ports/{}", self.sandbox_id, port),
            None,
        )
        .await?;
        Ok(())
    }

    async fn create_sandbox(&self, options: CreateSandboxOptions) -> Result<SandboxInfo> {
        let body = serde_json::json!({
            "name": options.name,
            "vcpu": options.vcpu.unwrap_or(1),
            "memory_mb": options.memory_mb.unwrap_or(512),
            "disk_gb": options.disk_gb.unwrap_or(5),
            "region": options.region,
        });

        let result = self.request("POST", "/v1/sandboxes", Some(body)).await?;

        Ok(SandboxInfo {
            id: result["id"]
                .as_str()
                .or_else(|| result["sandbox_id"].as_str())
                .unwrap_or("")
                .to_string(),
            status: result["status"].as_str().unwrap_or("running").to_string(),
            region: result["region"].as_str().unwrap_or("").to_string(),
            vcpu: result["vcpu"].as_u64().unwrap_or(options.vcpu.unwrap_or(1) as u64) as u32,
            memory_mb: result["memory_mb"]
                .as_u64()
                .unwrap_or(options.memory_mb.unwrap_or(512) as u64) as u32,
            disk_gb: result["disk_gb"]
                .as_u64()
                .unwrap_or(options.disk_gb.unwrap_or(5) as u64) as u32,
            terminal_url: result["terminal_url"].as_str().map(|s| s.to_string()),
            created_at: result["created_at"].as_str().unwrap_or("").to_string(),
        })
    }

    async fn delete_sandbox(&self, target_id: &str) -> Result<()> {
        self.request("DELETE", &format!("/v1/sandboxes/{}", target_id), None)
            .await?;
        Ok(())
    }

    async fn list_sandboxes(&self) -> Result<Vec<SandboxInfo>> {
        let result = self.request("GET", "/v1/sandboxes", None).await?;

        let sandboxes = if result.is_array() {
            result.as_array().cloned().unwrap_or_default()
        } else {
            result["sandboxes"].as_array().cloned().unwrap_or_default()
        };

        Ok(sandboxes
            .iter()
            .map(|s| SandboxInfo {
                id: s["id"]
                    .as_str()
                    .or_else(|| s["sandbox_id"].as_str())
                    .unwrap_or("")
                    .to_string(),
                status: s["status"].as_str().unwrap_or("unknown").to_string(),
                region: s["region"].as_str().unwrap_or("").to_string(),
                vcpu: s["vcpu"].as_u64().unwrap_or(0) as u32,
                memory_mb: s["memory_mb"].as_u64().unwrap_or(0) as u32,
                disk_gb: s["disk_gb"].as_u64().unwrap_or(0) as u32,
                terminal_url: s["terminal_url"].as_str().map(|v| v.to_string()),
                created_at: s["created_at"].as_str().unwrap_or("").to_string(),
            })
            .collect())
    }
}
