//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    ChatRequest, ChatResponse, ErrorResponse, EventTypeChoice, EventTypesResponse, IntakeRequest,
    IntakeResponse, SessionResponse, SuccessResponse,
};
use super::AppState;
use crate::reply::ReplyError;
use crate::runtime::{IntakeOutcome, SessionError, SessionSnapshot, TurnOutcome};
use crate::state_machine::{EventType, TransitionError};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::task::JoinError;

const INTAKE_INCOMPLETE: &str = "Please choose what happened and tell us what hurts most.";

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Intake form options
        .route("/api/event-types", get(list_event_types))
        // Session lifecycle
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(end_session))
        // User actions
        .route("/api/sessions/:id/intake", post(submit_intake))
        .route("/api/sessions/:id/chat", post(send_chat))
        // SSE streaming
        .route("/api/sessions/:id/stream", get(stream_session))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Intake form
// ============================================================

async fn list_event_types() -> Json<EventTypesResponse> {
    Json(EventTypesResponse {
        event_types: EventType::CHOICES
            .iter()
            .map(|&value| EventTypeChoice {
                value,
                label: value.label(),
            })
            .collect(),
    })
}

// ============================================================
// Session lifecycle
// ============================================================

async fn create_session(State(state): State<AppState>) -> Json<SessionResponse> {
    let handle = state.sessions.create().await;
    Json(SessionResponse {
        session: handle.snapshot(),
    })
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let handle = state.sessions.get(&id).await?;
    Ok(Json(SessionResponse {
        session: handle.snapshot(),
    }))
}

async fn end_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.sessions.end(&id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================
// User actions
// ============================================================

async fn submit_intake(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<IntakeRequest>,
) -> Result<Json<IntakeResponse>, AppError> {
    let handle = state.sessions.get(&id).await?;
    let mut runtime = handle.try_acquire()?;

    // The turn owns the session lock and finishes even if the client leaves
    let (outcome, session) = tokio::spawn(async move {
        let outcome = runtime.submit_intake(req.event_type, req.key_fact).await;
        (outcome, SessionSnapshot::of(runtime.session()))
    })
    .await?;
    let outcome = outcome?;

    Ok(Json(match outcome {
        IntakeOutcome::Started { greeting } => IntakeResponse::Started { greeting, session },
        IntakeOutcome::Incomplete => IntakeResponse::Incomplete {
            message: INTAKE_INCOMPLETE,
            session,
        },
    }))
}

async fn send_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let handle = state.sessions.get(&id).await?;
    let mut runtime = handle.try_acquire()?;

    let (outcome, session) = tokio::spawn(async move {
        let outcome = runtime.send_message(req.text).await;
        (outcome, SessionSnapshot::of(runtime.session()))
    })
    .await?;
    let outcome = outcome?;

    Ok(Json(match outcome {
        TurnOutcome::Replied { reply } => ChatResponse::Replied { reply, session },
        TurnOutcome::Blocked { warning } => ChatResponse::Blocked { warning, session },
    }))
}

// ============================================================
// SSE Streaming
// ============================================================

async fn stream_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.sessions.get(&id).await?;
    // Subscribe before reading the snapshot so no update falls in between
    let broadcast_rx = handle.subscribe();
    Ok(sse_stream(handle.snapshot(), broadcast_rx))
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("heartbuddy ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    BadGateway(String),
    Internal(String),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        let message = e.to_string();
        match e {
            SessionError::NotFound(_) => AppError::NotFound(message),
            SessionError::Transition(TransitionError::EmptyMessage) => {
                AppError::BadRequest(message)
            }
            SessionError::Transition(_) => AppError::Conflict(message),
            SessionError::Reply(ReplyError::Transport(_)) => AppError::BadGateway(message),
            SessionError::Reply(_) => AppError::Internal(message),
        }
    }
}

impl From<JoinError> for AppError {
    fn from(e: JoinError) -> Self {
        tracing::error!(error = %e, "Session turn task failed");
        AppError::Internal(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
