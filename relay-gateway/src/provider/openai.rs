//! OpenAI provider implementation (Responses API).

use super::{ModelProvider, ModelRequest, ProviderError, ProviderErrorKind, TextStream};
use async_trait::async_trait;
use eventsource_client::{self as es, Client as _, ReconnectOptions, SSE};
use futures_util::StreamExt;
use relay_common::config::UpstreamConfig;
use relay_common::util::summarize_for_log;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const PROVIDER: &str = "openai";

/// Upper bound on how much of an upstream error body is kept in the error.
const ERROR_BODY_CHARS: usize = 500;

/// OpenAI API provider.
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    timeout: Duration,
}

impl OpenAIProvider {
    /// Create a provider against the public OpenAI API.
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(api_key, "https://api.openai.com", Duration::from_secs(300))
    }

    /// Create a provider from the upstream configuration section.
    pub fn from_config(upstream: &UpstreamConfig) -> Self {
        Self::with_base_url(
            upstream.api_key.clone(),
            upstream.base_url.clone(),
            Duration::from_secs(upstream.timeout_secs),
        )
    }

    /// Create with custom base URL (for Azure OpenAI, compatible APIs or tests).
    ///
    /// `timeout` bounds a whole buffered call. Streamed calls use it as the
    /// longest allowed gap between reads, so long replies are never cut off.
    pub fn with_base_url(
        api_key: Option<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    timeout_secs = timeout.as_secs(),
                    "Failed to build HTTP client, buffered calls run without a timeout"
                );
                reqwest::Client::new()
            }
        };

        Self {
            client,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn error(model: &str, kind: ProviderErrorKind, message: impl Into<String>) -> ProviderError {
        ProviderError::new(PROVIDER, model, kind, message)
    }

    fn api_key(&self, model: &str) -> Result<&str, ProviderError> {
        self.api_key.as_deref().ok_or_else(|| {
            Self::error(
                model,
                ProviderErrorKind::MissingCredentials,
                "OPENAI_API_KEY is not set",
            )
        })
    }

    fn responses_url(&self) -> String {
        format!("{}/v1/responses", self.base_url)
    }

    /// Send a buffered Responses API call and check its status.
    async fn post(&self, request: &ModelRequest) -> Result<reqwest::Response, ProviderError> {
        let api_key = self.api_key(&request.model)?;

        tracing::debug!(
            model = %request.model,
            input_chars = request.input.chars().count(),
            "Calling OpenAI Responses API"
        );

        let response = self
            .client
            .post(self.responses_url())
            .bearer_auth(api_key)
            .json(&ResponsesRequest::new(request, false))
            .send()
            .await
            .map_err(|e| {
                Self::error(&request.model, ProviderErrorKind::Request, e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::error(
                &request.model,
                ProviderErrorKind::Status,
                summarize_for_log(&body, ERROR_BODY_CHARS),
            )
            .with_status(status.as_u16()));
        }

        Ok(response)
    }

    /// Build a one-shot SSE client for a streamed Responses API call.
    fn event_source(&self, request: &ModelRequest) -> Result<impl es::Client, ProviderError> {
        let api_key = self.api_key(&request.model)?;
        let body = serde_json::to_string(&ResponsesRequest::new(request, true)).map_err(|e| {
            Self::error(&request.model, ProviderErrorKind::Request, e.to_string())
        })?;

        let builder = es::ClientBuilder::for_url(&self.responses_url())
            .and_then(|b| b.header("Authorization", &format!("Bearer {api_key}")))
            .and_then(|b| b.header("Content-Type", "application/json"))
            .and_then(|b| b.header("Accept", "text/event-stream"))
            .map_err(|e| {
                Self::error(&request.model, ProviderErrorKind::Request, e.to_string())
            })?;

        Ok(builder
            .method("POST".into())
            .body(body)
            .read_timeout(self.timeout)
            .reconnect(ReconnectOptions::reconnect(false).build())
            .build())
    }
}

#[async_trait]
impl ModelProvider for OpenAIProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn respond(&self, request: ModelRequest) -> Result<String, ProviderError> {
        let start = Instant::now();
        let response = self.post(&request).await?;

        let parsed: ResponsesResponse = response.json().await.map_err(|e| {
            Self::error(&request.model, ProviderErrorKind::Decode, e.to_string())
        })?;

        if let Some(error) = parsed.error.as_ref() {
            return Err(Self::error(
                &request.model,
                ProviderErrorKind::Status,
                error.describe(),
            ));
        }

        tracing::debug!(
            model = %request.model,
            status = parsed.status.as_deref().unwrap_or("unknown"),
            latency_ms = start.elapsed().as_millis() as u64,
            "OpenAI response received"
        );

        Ok(parsed.output_text())
    }

    async fn respond_stream(&self, request: ModelRequest) -> Result<TextStream, ProviderError> {
        let model = request.model.clone();
        let client = self.event_source(&request)?;
        let mut events = Box::pin(async_stream::stream! {
            let mut inner = client.stream();
            while let Some(item) = inner.next().await {
                yield item;
            }
        });

        tracing::debug!(
            model = %model,
            input_chars = request.input.chars().count(),
            "Opening OpenAI Responses stream"
        );

        // Fail up front when the upstream refuses the call.
        let first = match events.next().await {
            Some(Ok(SSE::Connected(_))) => None,
            Some(Ok(sse)) => Some(Ok(sse)),
            Some(Err(e)) => return Err(stream_error(&model, e)),
            None => {
                return Err(Self::error(
                    &model,
                    ProviderErrorKind::Request,
                    "stream closed before connecting",
                ))
            }
        };

        let stream = async_stream::try_stream! {
            let mut events = futures_util::stream::iter(first).chain(events);

            while let Some(item) = events.next().await {
                let Some(sse) = next_event(&model, item)? else {
                    break;
                };
                let SSE::Event(event) = sse else {
                    continue;
                };
                match interpret_event(&model, &event.event_type, &event.data)? {
                    StreamSignal::Delta(delta) => {
                        yield delta;
                    }
                    StreamSignal::Done => break,
                    StreamSignal::Ignore => {}
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

// ============================================================================
// Streaming events
// ============================================================================

#[derive(Debug, PartialEq, Eq)]
enum StreamSignal {
    Delta(String),
    Done,
    Ignore,
}

/// Unwrap one item of the SSE stream; `None` once the body has ended.
fn next_event(model: &str, item: Result<SSE, es::Error>) -> Result<Option<SSE>, ProviderError> {
    match item {
        Ok(sse) => Ok(Some(sse)),
        Err(es::Error::Eof | es::Error::StreamClosed) => Ok(None),
        Err(e) => Err(stream_error(model, e)),
    }
}

fn stream_error(model: &str, err: es::Error) -> ProviderError {
    match err {
        es::Error::UnexpectedResponse(response, _) => {
            let status = response.status();
            OpenAIProvider::error(
                model,
                ProviderErrorKind::Status,
                format!("upstream answered HTTP {status}"),
            )
            .with_status(status)
        }
        es::Error::TimedOut => {
            OpenAIProvider::error(model, ProviderErrorKind::Request, "stream read timed out")
        }
        other => OpenAIProvider::error(model, ProviderErrorKind::Stream, other.to_string()),
    }
}

/// Map one SSE event of the Responses API onto the relay's view of it.
///
/// The JSON `type` field wins; the SSE event name is the fallback.
fn interpret_event(
    model: &str,
    event_type: &str,
    data: &str,
) -> Result<StreamSignal, ProviderError> {
    if data.trim() == "[DONE]" {
        return Ok(StreamSignal::Done);
    }

    let parsed: StreamEvent = serde_json::from_str(data).map_err(|e| {
        OpenAIProvider::error(model, ProviderErrorKind::Decode, format!("bad stream event: {e}"))
    })?;

    let kind = parsed.kind.as_deref().unwrap_or(event_type);

    match kind {
        "response.output_text.delta" => match parsed.delta {
            Some(delta) if !delta.is_empty() => Ok(StreamSignal::Delta(delta)),
            _ => Ok(StreamSignal::Ignore),
        },
        "response.completed" => Ok(StreamSignal::Done),
        "response.incomplete" => {
            tracing::warn!(model = %model, "OpenAI stream ended incomplete");
            Ok(StreamSignal::Done)
        }
        "response.failed" => {
            let message = parsed
                .response
                .and_then(|r| r.error)
                .map(|e| e.describe())
                .unwrap_or_else(|| "response failed".into());
            Err(OpenAIProvider::error(model, ProviderErrorKind::Stream, message))
        }
        "error" => {
            let message = parsed
                .message
                .or_else(|| parsed.error.map(|e| e.describe()))
                .unwrap_or_else(|| "unknown stream error".into());
            Err(OpenAIProvider::error(model, ProviderErrorKind::Stream, message))
        }
        _ => Ok(StreamSignal::Ignore),
    }
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    instructions: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

impl<'a> ResponsesRequest<'a> {
    fn new(request: &'a ModelRequest, stream: bool) -> Self {
        Self {
            model: &request.model,
            instructions: &request.instructions,
            input: &request.input,
            stream,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    error: Option<ApiError>,
}

impl ResponsesResponse {
    /// Concatenate every `output_text` part of every message item.
    fn output_text(&self) -> String {
        let parts: String = self
            .output
            .iter()
            .filter(|item| item.kind == "message")
            .flat_map(|item| item.content.iter().flatten())
            .filter(|part| part.kind == "output_text")
            .filter_map(|part| part.text.as_deref())
            .collect();

        if parts.is_empty() {
            self.output_text.clone().unwrap_or_default()
        } else {
            parts
        }
    }
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<Vec<ContentPart>>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ApiError {
    fn describe(&self) -> String {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (None, Some(message)) => message.clone(),
            (Some(code), None) => code.clone(),
            (None, None) => "unspecified error".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    delta: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<ApiError>,
    #[serde(default)]
    response: Option<StreamResponse>,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    error: Option<ApiError>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn interpret(data: serde_json::Value) -> Result<StreamSignal, ProviderError> {
        interpret_event("gpt-5", "message", &data.to_string())
    }

    #[test]
    fn test_request_serialization() {
        let request = ResponsesRequest {
            model: "gpt-5",
            instructions: "Be helpful",
            input: "USER: Hi",
            stream: false,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({ "model": "gpt-5", "instructions": "Be helpful", "input": "USER: Hi" })
        );

        let streaming = ResponsesRequest {
            instructions: "",
            stream: true,
            ..request
        };
        let value = serde_json::to_value(&streaming).unwrap();
        assert_eq!(value["stream"], true);
        assert!(value.get("instructions").is_none());
    }

    #[test]
    fn test_output_text_concatenates_message_parts() {
        let response: ResponsesResponse = serde_json::from_value(json!({
            "status": "completed",
            "output": [
                { "type": "reasoning", "summary": [] },
                { "type": "message", "content": [
                    { "type": "output_text", "text": "Hello, " },
                    { "type": "output_text", "text": "world" }
                ]}
            ]
        }))
        .unwrap();
        assert_eq!(response.output_text(), "Hello, world");
    }

    #[test]
    fn test_output_text_falls_back_to_convenience_field() {
        let response: ResponsesResponse =
            serde_json::from_value(json!({ "output_text": "short" })).unwrap();
        assert_eq!(response.output_text(), "short");
    }

    #[test]
    fn test_interpret_delta_and_completion() {
        assert_eq!(
            interpret(json!({ "type": "response.output_text.delta", "delta": "Hel" })).unwrap(),
            StreamSignal::Delta("Hel".into())
        );
        assert_eq!(
            interpret(json!({ "type": "response.completed", "response": {} })).unwrap(),
            StreamSignal::Done
        );
        assert_eq!(
            interpret(json!({ "type": "response.created" })).unwrap(),
            StreamSignal::Ignore
        );
        assert_eq!(
            interpret_event("gpt-5", "message", " [DONE]").unwrap(),
            StreamSignal::Done
        );
    }

    #[test]
    fn test_interpret_failure_events() {
        let err = interpret(json!({
            "type": "response.failed",
            "response": { "error": { "code": "server_error", "message": "boom" } }
        }))
        .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Stream);
        assert!(err.message.contains("boom"));

        let err = interpret(json!({ "type": "error", "message": "rate limited" })).unwrap_err();
        assert_eq!(err.message, "rate limited");
    }

    #[test]
    fn test_event_name_used_when_type_missing() {
        assert_eq!(
            interpret_event("gpt-5", "response.output_text.delta", r#"{"delta":"x"}"#).unwrap(),
            StreamSignal::Delta("x".into())
        );
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_network() {
        let provider = OpenAIProvider::with_base_url(None, "http://127.0.0.1:9", Duration::from_secs(1));
        let err = provider
            .respond(ModelRequest {
                model: "gpt-5".into(),
                instructions: String::new(),
                input: "USER: Hi".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::MissingCredentials);
    }
}
