//! Forward questions to a running answer server over HTTP.
//!
//! The server contract is `POST {"question": "..."}` answered by
//! `{"answer": "...", "usage_metadata"?: {...}}`. Transport failures do not
//! abort a run: they come back as answer-shaped payloads with confidence 0
//! and an `error` entry in the metadata.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use torahbench_types::{TokenUsage, TorahEvalInput, TorahEvalOutput, Trace};

use crate::config::HttpTargetConfig;
use crate::module::Implementation;
use crate::trace::report_trace;

pub struct HttpTarget {
    name: String,
    label: String,
    url: String,
    timeout: Duration,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    answer: String,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl HttpTarget {
    pub fn new(name: impl Into<String>, label: impl Into<String>, config: &HttpTargetConfig) -> Result<Self> {
        Self::with_timeout(name, label, config.url.clone(), config.timeout())
    }

    pub fn with_timeout(
        name: impl Into<String>,
        label: impl Into<String>,
        url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            name: name.into(),
            label: label.into(),
            url: url.into(),
            timeout,
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn ask(&self, question: &str) -> std::result::Result<ChatReply, String> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "question": question }))
            .send()
            .await
            .map_err(|e| self.describe_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("API Error {}: {}", status.as_u16(), body));
        }

        response
            .json::<ChatReply>()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    self.describe_transport_error(&e)
                } else {
                    format!("Error: invalid response from {}: {}", self.url, e)
                }
            })
    }

    fn describe_transport_error(&self, err: &reqwest::Error) -> String {
        if err.is_timeout() {
            format!(
                "Error: API request timed out (exceeded {} seconds)",
                self.timeout.as_secs_f64()
            )
        } else if err.is_connect() {
            format!(
                "Error: Could not connect to {}. Make sure it's running on {}",
                self.label, self.url
            )
        } else {
            format!("Error: {err}")
        }
    }
}

#[async_trait]
impl Implementation for HttpTarget {
    fn implementation_name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, input: &TorahEvalInput) -> Result<TorahEvalOutput> {
        let started = Trace::start_now().model(self.url.clone());
        let request = json!({ "question": input.question });

        match self.ask(&input.question).await {
            Ok(reply) => {
                let usage = reply
                    .usage_metadata
                    .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens));
                report_trace(started.finish(request, json!({ "answer": reply.answer }), usage));

                let mut out = TorahEvalOutput::answer_for(input, reply.answer.trim(), 1.0)
                    .meta("endpoint", self.url.clone());
                if let Some(usage) = usage {
                    out = out.meta("usage_metadata", serde_json::to_value(usage)?);
                }
                Ok(out)
            }
            Err(message) => {
                warn!("{} failed: {}", self.name, message);
                report_trace(started.finish_with_error(request, message.clone()));
                Ok(TorahEvalOutput::degraded(input, message).meta("endpoint", self.url.clone()))
            }
        }
    }

    fn supports_dataset_runs(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::scope_traces;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve a single canned HTTP response on an ephemeral port.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}/chat")
    }

    fn target(url: String, timeout: Duration) -> HttpTarget {
        HttpTarget::with_timeout("anthropic-api", "Anthropic API server", url, timeout).unwrap()
    }

    #[tokio::test]
    async fn answer_and_usage_are_returned() {
        let url = serve_once(
            "200 OK",
            r#"{"answer":"  Bereshit  ","usage_metadata":{"input_tokens":12,"output_tokens":3,"total_tokens":15}}"#,
        )
        .await;
        let t = target(url, Duration::from_secs(5));

        let (out, traces) = scope_traces(t.evaluate(&TorahEvalInput::new("First word?"))).await;
        let out = out.unwrap();
        assert_eq!(out.answer, "Bereshit");
        assert!(!out.is_degraded());
        assert_eq!(out.metadata["usage_metadata"]["total_tokens"], 15);
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].usage.unwrap().input_tokens, 12);
    }

    #[tokio::test]
    async fn non_success_status_becomes_api_error_answer() {
        let url = serve_once("500 Internal Server Error", r#"{"detail":"boom"}"#).await;
        let out = target(url, Duration::from_secs(5))
            .evaluate(&TorahEvalInput::new("q"))
            .await
            .unwrap();
        assert!(out.answer.starts_with("API Error 500:"));
        assert!(out.answer.contains("boom"));
        assert!(out.is_degraded());
    }

    #[tokio::test]
    async fn connection_refused_is_reported_as_answer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let out = target(format!("http://{addr}/chat"), Duration::from_secs(5))
            .evaluate(&TorahEvalInput::new("q"))
            .await
            .unwrap();
        assert!(out.answer.contains("Could not connect to Anthropic API server"), "{}", out.answer);
        assert_eq!(out.confidence, 0.0);
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let out = target(format!("http://{addr}/chat"), Duration::from_millis(200))
            .evaluate(&TorahEvalInput::new("q"))
            .await
            .unwrap();
        assert!(out.answer.contains("timed out"), "{}", out.answer);
        assert!(out.is_degraded());
    }

    #[tokio::test]
    async fn stalled_body_reports_a_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 64\r\n\r\n{\"answer\":")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let out = target(format!("http://{addr}/chat"), Duration::from_millis(300))
            .evaluate(&TorahEvalInput::new("q"))
            .await
            .unwrap();
        assert!(out.answer.contains("timed out"), "{}", out.answer);
        assert!(!out.answer.contains("invalid response"));
    }
}
