//! Upstream model provider abstraction.
//!
//! The relay talks to one provider, chosen at startup. A provider turns a
//! [`ModelRequest`] into either the complete reply text or a stream of text
//! deltas in generation order.

mod openai;

pub use openai::OpenAIProvider;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use relay_common::config::UpstreamConfig;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Provider Trait
// ============================================================================

/// Ordered stream of reply text deltas.
pub type TextStream = BoxStream<'static, Result<String, ProviderError>>;

/// Unified interface for LLM providers.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Run the model and return its complete output text.
    async fn respond(&self, request: ModelRequest) -> Result<String, ProviderError>;

    /// Run the model and stream its output text as it is generated.
    async fn respond_stream(&self, request: ModelRequest) -> Result<TextStream, ProviderError>;
}

/// Create the provider described by the upstream configuration.
pub fn create_provider(upstream: &UpstreamConfig) -> Arc<dyn ModelProvider> {
    Arc::new(OpenAIProvider::from_config(upstream))
}

// ============================================================================
// Request / Error Types
// ============================================================================

/// A single-string-input model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequest {
    /// Model identifier
    pub model: String,
    /// System instruction, kept apart from the conversation text
    pub instructions: String,
    /// Flattened conversation
    pub input: String,
}

/// What went wrong talking to a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// No API key configured
    MissingCredentials,
    /// Connection or transport failure
    Request,
    /// Non-success HTTP status
    Status,
    /// Response body could not be decoded
    Decode,
    /// The provider reported a failure mid-stream
    Stream,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MissingCredentials => "missing credentials",
            Self::Request => "request failed",
            Self::Status => "API error",
            Self::Decode => "undecodable response",
            Self::Stream => "stream failed",
        })
    }
}

/// Error from a provider. Carries upstream detail; never shown to clients.
#[derive(Debug, Clone, Error)]
#[error("[{provider}:{model}] {kind}: {message}")]
pub struct ProviderError {
    pub provider: String,
    pub model: String,
    pub kind: ProviderErrorKind,
    pub message: String,
    pub status_code: Option<u16>,
}

impl ProviderError {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            kind,
            message: message.into(),
            status_code: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }
}
