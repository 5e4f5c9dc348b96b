//! Relay service: conversation in, model reply out.
//!
//! ```text
//! ChatRequest ──▶ instructions = system.trim()
//!             └─▶ input = "ROLE: content" lines ──▶ ModelProvider ──▶ text / deltas
//! ```
//!
//! The service holds no mutable state; every call works on its own turn
//! history, so one instance is shared by all connections.

use crate::provider::{ModelProvider, ModelRequest, ProviderError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use relay_common::config::Config;
use relay_common::protocol::{ErrorBody, Turn};
use relay_common::util::sanitize_for_log;
use std::sync::Arc;
use thiserror::Error;

/// Client-visible message for any upstream failure.
pub const GENERIC_FAILURE: &str = "Failed to generate response.";

/// Client-visible message for a body that is not a chat request.
pub const INVALID_BODY: &str = "Invalid request body.";

/// Ordered stream of reply deltas.
pub type ReplyStream = BoxStream<'static, Result<String, RelayError>>;

/// Relay failure as seen by clients.
///
/// Rendering never includes the wrapped upstream detail.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid request body")]
    InvalidRequest { status: StatusCode },

    /// Well-formed body that is not a usable conversation.
    #[error("malformed conversation")]
    MalformedConversation,

    #[error("upstream model call failed")]
    Upstream(#[source] ProviderError),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::InvalidRequest { status } => (status, INVALID_BODY),
            Self::MalformedConversation | Self::Upstream(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE)
            }
        };
        (
            status,
            Json(ErrorBody {
                error: message.to_string(),
            }),
        )
            .into_response()
    }
}

/// Flatten a conversation into one text block, one `ROLE: content` line per turn.
pub fn flatten_turns(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|turn| format!("{}: {}", turn.role.label(), turn.content.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Forwards conversations to the configured model.
pub struct RelayService {
    provider: Arc<dyn ModelProvider>,
    model: String,
    default_system: String,
}

impl RelayService {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        model: impl Into<String>,
        default_system: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            default_system: default_system.into(),
        }
    }

    /// Build from the relay configuration.
    pub fn from_config(config: &Config, provider: Arc<dyn ModelProvider>) -> Self {
        Self::new(
            provider,
            config.upstream.model.clone(),
            config.chat.default_system_prompt.clone(),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Shape a chat request into the provider's single-string-input call.
    pub fn build_request(&self, system: Option<&str>, turns: &[Turn]) -> ModelRequest {
        ModelRequest {
            model: self.model.clone(),
            instructions: system.unwrap_or(&self.default_system).trim().to_string(),
            input: flatten_turns(turns),
        }
    }

    /// Run the model and return its complete reply, unmodified.
    pub async fn relay(&self, system: Option<&str>, turns: &[Turn]) -> Result<String, RelayError> {
        let request = self.build_request(system, turns);
        tracing::info!(
            provider = self.provider.name(),
            model = %self.model,
            turns = turns.len(),
            "Relaying conversation"
        );

        self.provider
            .respond(request)
            .await
            .map_err(|e| self.upstream_failure(e))
    }

    /// Run the model and forward its reply deltas in generation order.
    ///
    /// Fails up front when the upstream stream cannot be opened. A failure
    /// after that arrives as an error item and ends the stream.
    pub async fn relay_stream(
        &self,
        system: Option<&str>,
        turns: &[Turn],
    ) -> Result<ReplyStream, RelayError> {
        let request = self.build_request(system, turns);
        tracing::info!(
            provider = self.provider.name(),
            model = %self.model,
            turns = turns.len(),
            "Relaying conversation (streaming)"
        );

        let upstream = self
            .provider
            .respond_stream(request)
            .await
            .map_err(|e| self.upstream_failure(e))?;

        // The body is polled after the handler returns; keep its log lines
        // attached to the request span.
        let span = tracing::Span::current();
        let stream = upstream.map(move |item| {
            item.map_err(|e| {
                span.in_scope(|| log_upstream_failure(&e, "Upstream stream failed"));
                RelayError::Upstream(e)
            })
        });

        Ok(Box::pin(stream))
    }

    fn upstream_failure(&self, error: ProviderError) -> RelayError {
        log_upstream_failure(&error, "Upstream model call failed");
        RelayError::Upstream(error)
    }
}

fn log_upstream_failure(error: &ProviderError, what: &str) {
    tracing::error!(
        provider = %error.provider,
        model = %error.model,
        kind = %error.kind,
        status = ?error.status_code,
        detail = %sanitize_for_log(&error.message),
        "{what}"
    );
}
