//! Minimal client for the Anthropic Messages API.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use torahbench_types::TokenUsage;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// System prompt for answering Torah questions directly with Claude.
pub const TORAH_SYSTEM_PROMPT: &str = "You are a Torah scholar assistant.
Answer questions about Torah texts and sources accurately, providing specific citations when possible.
If asked about Divrei Yoel or other Hasidic texts, try to provide relevant teachings and sources.";

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    api_key: String,
    base_url: String,
    client: Client,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

/// Text of the first content block plus token usage.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
        })
    }

    /// Point at a different host, e.g. a proxy or a test server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub async fn complete(&self, model: &str, system: Option<&str>, prompt: &str, max_tokens: u32) -> Result<Completion> {
        if self.api_key.is_empty() {
            bail!("Missing Anthropic API key");
        }

        let body = MessagesRequest {
            model,
            max_tokens,
            system,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("Anthropic API returned {}: {}", status.as_u16(), text);
        }

        let parsed: MessagesResponse = resp.json().await.context("Invalid Anthropic response")?;
        let text = parsed
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .map(|block| block.text)
            .ok_or_else(|| anyhow!("No text content returned by Anthropic"))?;
        let usage = parsed
            .usage
            .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens))
            .unwrap_or_default();

        Ok(Completion { text, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_key_is_rejected_before_any_request() {
        let client = AnthropicClient::new("").unwrap().with_base_url("http://127.0.0.1:9");
        let err = client.complete("m", None, "hi", 10).await.unwrap_err();
        assert!(err.to_string().contains("Missing Anthropic API key"));
    }

    #[test]
    fn request_body_shape() {
        let body = MessagesRequest {
            model: "claude-sonnet-4-20250514",
            max_tokens: 1000,
            system: Some("You are a Torah scholar assistant."),
            messages: vec![Message { role: "user", content: "What is Shabbat?" }],
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["messages"][0]["role"], "user");
        assert_eq!(v["system"], "You are a Torah scholar assistant.");

        let without_system = MessagesRequest { system: None, ..body };
        assert!(serde_json::to_value(&without_system).unwrap().get("system").is_none());
    }
}
