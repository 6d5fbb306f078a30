//! Torah Q&A answer server.
//!
//! Speaks the chat contract the `anthropic-api` and `ituria-api`
//! implementations call: `POST /chat {"question", "model"?}` answered with
//! `{"answer", "usage_metadata", "timestamp", "model_info"}`.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use torahbench_core::anthropic::{AnthropicClient, TORAH_SYSTEM_PROMPT};
use torahbench_core::TokenUsage;

pub const DEFAULT_PORT: u16 = 8334;
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const MAX_TOKENS: u32 = 1000;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub question: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub usage_metadata: TokenUsage,
    pub timestamp: String,
    pub model_info: ModelInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model: String,
    pub provider: String,
}

/// Shared by every handler. `client` is `None` when no API key is configured;
/// the server still starts and `/chat` answers 500.
#[derive(Clone)]
pub struct AppState {
    client: Option<Arc<AnthropicClient>>,
    default_model: String,
}

impl AppState {
    pub fn new(client: Option<AnthropicClient>) -> Self {
        Self {
            client: client.map(Arc::new),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Build from `ANTHROPIC_API_KEY` and, when set, `ANTHROPIC_BASE_URL`.
    pub fn from_env() -> anyhow::Result<Self> {
        let client = match std::env::var("ANTHROPIC_API_KEY").ok().filter(|k| !k.trim().is_empty()) {
            Some(key) => {
                let client = AnthropicClient::new(key)?;
                Some(match std::env::var("ANTHROPIC_BASE_URL") {
                    Ok(base) if !base.is_empty() => client.with_base_url(base),
                    _ => client,
                })
            }
            None => None,
        };
        Ok(Self::new(client))
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn anthropic_configured(&self) -> bool {
        self.client.is_some()
    }
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (status, Json(json!({ "detail": detail.into() })))
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/chat", post(chat))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Torah Q&A API server is running",
        "timestamp": Utc::now().to_rfc3339(),
        "endpoints": {
            "chat": "POST /chat",
            "health": "GET /health",
        },
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "anthropic_configured": state.anthropic_configured(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Result<Json<ChatResponse>, ApiError> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Question cannot be empty"));
    }
    let client = state
        .client
        .as_ref()
        .ok_or_else(|| api_error(StatusCode::INTERNAL_SERVER_ERROR, "Anthropic API key not configured"))?;
    let model = req.model.unwrap_or_else(|| state.default_model.clone());

    info!(model = %model, "processing question: {}", torahbench_core::truncate(question, 100));
    let completion = client
        .complete(&model, Some(TORAH_SYSTEM_PROMPT), question, MAX_TOKENS)
        .await
        .map_err(|e| {
            error!("Anthropic call failed: {:#}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("Internal server error: {e:#}"))
        })?;
    info!(
        input_tokens = completion.usage.input_tokens,
        output_tokens = completion.usage.output_tokens,
        "answer generated"
    );

    Ok(Json(ChatResponse {
        answer: completion.text.trim().to_string(),
        usage_metadata: completion.usage,
        timestamp: Utc::now().to_rfc3339(),
        model_info: ModelInfo {
            model,
            provider: "anthropic".to_string(),
        },
    }))
}
