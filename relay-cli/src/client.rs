//! HTTP client for the relay.
//!
//! [`RelayClient::send`] opens one chat request and hands back the reply as an
//! ordered stream of [`TextDelta`]s, read from the response body chunk by
//! chunk:
//! - `Stream` mode posts to `/api/chat/stream` and emits every decoded
//!   increment as soon as it arrives
//! - `Buffered` mode posts to `/api/chat`, reads the JSON reply through the
//!   same decoder and emits its text as a single delta
//!
//! Dropping the returned stream aborts the underlying transfer.

use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use relay_common::decoder::Utf8StreamDecoder;
use relay_common::protocol::{ChatReply, ChatRequest, HealthStatus};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default relay endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:3001";

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Which relay route carries the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Forwarded incremental stream (`POST /api/chat/stream`)
    #[default]
    Stream,
    /// One completed JSON payload (`POST /api/chat`)
    Buffered,
}

impl DeliveryMode {
    fn path(self) -> &'static str {
        match self {
            Self::Stream => "/api/chat/stream",
            Self::Buffered => "/api/chat",
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay base URL (default: localhost:3001)
    pub endpoint: String,
    /// Reply delivery route
    pub mode: DeliveryMode,
    /// Connection establishment timeout in seconds
    pub connect_timeout_secs: u64,
    /// Give up on a reply after this long without new text
    pub idle_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            mode: DeliveryMode::Stream,
            connect_timeout_secs: 10,
            idle_timeout: None,
        }
    }
}

/// One decoded increment of assistant text. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDelta(String);

impl TextDelta {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for TextDelta {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TextDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transport failure while talking to the relay.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),

    #[error("relay responded with status {status}")]
    Status { status: u16 },

    #[error("relay response has no body")]
    MissingBody,

    #[error("could not decode relay reply: {0}")]
    Decode(String),

    #[error("message is empty")]
    EmptyMessage,
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Ordered stream of reply deltas.
pub type DeltaStream = BoxStream<'static, Result<TextDelta, ClientError>>;

/// Relay HTTP client.
pub struct RelayClient {
    config: ClientConfig,
    http: reqwest::Client,
}

impl RelayClient {
    /// Create a new client with custom configuration.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        // No overall timeout: a streamed reply may legitimately run for minutes.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    /// Open one chat request and stream the reply.
    pub async fn send(&self, request: &ChatRequest) -> Result<DeltaStream, ClientError> {
        let url = self.url(self.config.mode.path());

        tracing::debug!(
            url = %url,
            mode = ?self.config.mode,
            turns = request.messages.len(),
            "Sending chat request"
        );

        let response = self.http.post(&url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
            });
        }
        if status == reqwest::StatusCode::NO_CONTENT {
            return Err(ClientError::MissingBody);
        }

        let body = response.bytes_stream();
        Ok(match self.config.mode {
            DeliveryMode::Stream => decode_text_stream(body),
            DeliveryMode::Buffered => decode_buffered_reply(body),
        })
    }

    /// Whether the relay answers its health check.
    pub async fn health(&self) -> bool {
        let url = self.url("/health");
        match self.http.get(&url).timeout(HEALTH_TIMEOUT).send().await {
            Ok(response) if response.status().is_success() => response
                .json::<HealthStatus>()
                .await
                .map(|health| health.ok)
                .unwrap_or(false),
            Ok(response) => {
                tracing::debug!(status = %response.status(), "Relay health check failed");
                false
            }
            Err(e) => {
                tracing::debug!(error = %e, "Relay unreachable");
                false
            }
        }
    }
}

/// Decode a plain-text body into deltas, one per chunk that completes text.
pub fn decode_text_stream<S, B, E>(body: S) -> DeltaStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let stream = async_stream::try_stream! {
        futures_util::pin_mut!(body);
        let mut decoder = Utf8StreamDecoder::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| ClientError::Network(e.to_string()))?;
            let text = decoder.feed(chunk.as_ref());
            if !text.is_empty() {
                yield TextDelta(text);
            }
        }

        let tail = decoder.finish();
        if !tail.is_empty() {
            yield TextDelta(tail);
        }
    };

    Box::pin(stream)
}

/// Decode a `{"text": ...}` body into a single delta at end of stream.
pub fn decode_buffered_reply<S, B, E>(body: S) -> DeltaStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let stream = async_stream::try_stream! {
        futures_util::pin_mut!(body);
        let mut decoder = Utf8StreamDecoder::new();
        let mut raw = String::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| ClientError::Network(e.to_string()))?;
            raw.push_str(&decoder.feed(chunk.as_ref()));
        }
        raw.push_str(&decoder.finish());

        let reply: ChatReply = serde_json::from_str(&raw)
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        if !reply.text.is_empty() {
            yield TextDelta(reply.text);
        }
    };

    Box::pin(stream)
}
