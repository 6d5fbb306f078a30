//! Answer questions with Claude directly through the Messages API.
//!
//! A missing API key or a failed call does not abort a run: the case gets a
//! degraded answer carrying the error, like the HTTP targets.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use torahbench_types::{TorahEvalInput, TorahEvalOutput, Trace};

use crate::anthropic::{AnthropicClient, TORAH_SYSTEM_PROMPT};
use crate::config::AnthropicConfig;
use crate::module::Implementation;
use crate::trace::report_trace;

pub const NAME: &str = "anthropic";

pub struct AnthropicDirect {
    client: Option<Arc<AnthropicClient>>,
    model: String,
    max_tokens: u32,
    api_key_env: String,
}

impl AnthropicDirect {
    pub fn from_config(config: &AnthropicConfig) -> Result<Self> {
        let client = match config.api_key() {
            Some(key) => {
                let client = AnthropicClient::new(key)?;
                Some(match &config.base_url {
                    Some(base) => client.with_base_url(base.clone()),
                    None => client,
                })
            }
            None => None,
        };
        Ok(Self {
            client: client.map(Arc::new),
            model: config.model_id().to_string(),
            max_tokens: config.max_tokens,
            api_key_env: config.api_key_env.clone(),
        })
    }

    pub fn with_client(mut self, client: AnthropicClient) -> Self {
        self.client = Some(Arc::new(client));
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Implementation for AnthropicDirect {
    fn implementation_name(&self) -> &str {
        NAME
    }

    async fn evaluate(&self, input: &TorahEvalInput) -> Result<TorahEvalOutput> {
        let started = Trace::start_now().model(self.model.clone());
        let request = json!({
            "model": self.model,
            "system": TORAH_SYSTEM_PROMPT,
            "question": input.question,
        });

        let Some(client) = &self.client else {
            let message = format!("Error: {} is not set", self.api_key_env);
            report_trace(started.finish_with_error(request, message.clone()));
            return Ok(TorahEvalOutput::degraded(input, message).meta("model", self.model.clone()));
        };

        match client
            .complete(&self.model, Some(TORAH_SYSTEM_PROMPT), &input.question, self.max_tokens)
            .await
        {
            Ok(completion) => {
                let answer = completion.text.trim().to_string();
                report_trace(started.finish(request, json!({ "answer": answer }), Some(completion.usage)));
                Ok(TorahEvalOutput::answer_for(input, answer, 1.0)
                    .meta("model", self.model.clone())
                    .meta("usage_metadata", serde_json::to_value(completion.usage)?))
            }
            Err(err) => {
                let message = format!("Error: {err:#}");
                warn!("{} failed: {}", NAME, message);
                report_trace(started.finish_with_error(request, message.clone()));
                Ok(TorahEvalOutput::degraded(input, message).meta("model", self.model.clone()))
            }
        }
    }

    fn supports_dataset_runs(&self) -> bool {
        true
    }
}
