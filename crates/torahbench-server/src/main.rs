use std::net::SocketAddr;

use anyhow::{Context, Result};
use tracing::{info, Level};

use torahbench_core::telemetry::init_tracing;
use torahbench_server::{app, AppState, DEFAULT_PORT};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(std::env::var("LOG_JSON").is_ok(), Level::INFO);

    let port = match std::env::var("PORT") {
        Ok(p) => p.parse::<u16>().with_context(|| format!("invalid PORT '{p}'"))?,
        Err(_) => DEFAULT_PORT,
    };
    let state = AppState::from_env()?;
    info!(anthropic_configured = state.anthropic_configured(), "starting Torah Q&A server");

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("listening on http://localhost:{port}");
    axum::serve(listener, app(state)).await?;
    Ok(())
}
