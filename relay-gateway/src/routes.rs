//! Route definitions for the relay.
//!
//! - `GET  /health`           → `{"ok":true}`
//! - `POST /api/chat`         → `{"text": ...}` once the model has finished
//! - `POST /api/chat/stream`  → plain-text body streamed as the model generates

use crate::relay::{RelayError, RelayService};
use axum::{
    body::{Body, Bytes},
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use futures_util::StreamExt;
use relay_common::logging::generate_request_id;
use relay_common::protocol::{ChatReply, ChatRequest, HealthStatus};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::Instrument;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<RelayService>,
}

impl AppState {
    pub fn new(relay: RelayService) -> Self {
        Self {
            relay: Arc::new(relay),
        }
    }
}

/// Build all relay routes.
pub fn build_routes(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(chat_routes(state, body_limit_bytes))
}

/// Build health check routes.
///
/// Health does not depend on upstream credentials.
pub fn health_routes() -> Router {
    Router::new().route("/health", get(health_handler))
}

/// Build chat routes.
pub fn chat_routes(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/stream", post(chat_stream_handler))
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn health_handler() -> Json<HealthStatus> {
    Json(HealthStatus { ok: true })
}

/// Unreadable JSON is a bad request and an oversized body keeps its 413.
/// A body that parses but does not describe a conversation fails like any
/// other relay error.
fn parse_body(payload: Result<Json<ChatRequest>, JsonRejection>) -> Result<ChatRequest, RelayError> {
    payload.map(|Json(request)| request).map_err(|rejection| {
        tracing::warn!(error = %rejection.body_text(), "Rejected chat request body");
        match rejection {
            JsonRejection::JsonSyntaxError(_) => RelayError::InvalidRequest {
                status: StatusCode::BAD_REQUEST,
            },
            JsonRejection::BytesRejection(_) => RelayError::InvalidRequest {
                status: rejection.status(),
            },
            _ => RelayError::MalformedConversation,
        }
    })
}

/// Buffered chat: waits for the full reply.
async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, RelayError> {
    let span = tracing::info_span!("chat", request_id = %generate_request_id());

    async move {
        let request = parse_body(payload)?;
        let text = state
            .relay
            .relay(request.system.as_deref(), &request.messages)
            .await?;

        tracing::info!(reply_chars = text.chars().count(), "Chat reply sent");
        Ok::<_, RelayError>(Json(ChatReply { text }))
    }
    .instrument(span)
    .await
}

/// Streaming chat: forwards reply deltas as they arrive.
async fn chat_stream_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, RelayError> {
    let span = tracing::info_span!("chat_stream", request_id = %generate_request_id());

    async move {
        let request = parse_body(payload)?;
        let deltas = state
            .relay
            .relay_stream(request.system.as_deref(), &request.messages)
            .await?;

        let body = Body::from_stream(deltas.map(|delta| delta.map(Bytes::from)));
        let mut response = body.into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
        Ok::<_, RelayError>(response)
    }
    .instrument(span)
    .await
}
