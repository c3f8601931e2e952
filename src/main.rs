//! HeartBuddy - supportive chat companion service
//!
//! A Rust backend running one intake-then-chat state machine per session
//! against a hosted language model, with every user message screened by a
//! moderation gate first.

mod api;
mod config;
mod llm;
mod moderation;
mod persona;
mod reply;
mod runtime;
mod state_machine;
mod transcript;

use api::{create_router, AppState};
use config::{Config, ConfigError};
use llm::OpenAIClient;
use moderation::ModerationGate;
use reply::{DirectChat, LoggingProtocol, ProtocolKind, ReplyProtocol, ThreadedJob};
use runtime::SessionManager;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Secrets may come from a local .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "heartbuddy=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration; a missing credential stops startup
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    let client = Arc::new(OpenAIClient::new(
        &config.api_key,
        Some(&config.base_url),
        config.request_timeout,
    )?);

    let gate = ModerationGate::new(
        client.clone(),
        config.moderation_model.clone(),
        config.moderation_timeout,
    );

    let protocol: Arc<dyn ReplyProtocol> = match config.protocol {
        ProtocolKind::DirectChat => Arc::new(DirectChat::new(client, config.direct.clone())),
        ProtocolKind::ThreadedJob => {
            let assistant_id = config
                .assistant_id
                .clone()
                .ok_or(ConfigError::Missing("ASSISTANT_ID"))?;
            Arc::new(ThreadedJob::new(client, assistant_id, config.poll))
        }
    };
    let protocol = Arc::new(LoggingProtocol::new(protocol));

    // Create application state
    let state = AppState::new(SessionManager::new(gate, protocol));
    state.sessions.start_reaper(config.session_idle);
    tracing::info!(
        protocol = state.sessions.protocol_kind().as_str(),
        base_url = %config.base_url,
        session_idle_secs = config.session_idle.as_secs(),
        "Reply protocol configured"
    );

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("HeartBuddy server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
