//! Chat session: one conversation, at most one reply in flight.
//!
//! ```text
//! send(text) ─▶ push USER turn ─▶ snapshot ─▶ push empty ASSISTANT turn
//!                                    │
//!                                    ▼
//!              RelayClient::send ─▶ delta ─▶ replace_trailing_content(cumulative)
//!                                    │
//!              stop() / idle timeout ┴─▶ Cancelled, partial text kept
//! ```

use crate::client::{ClientError, DeltaStream, RelayClient, TextDelta};
use crate::conversation::Conversation;
use futures_util::StreamExt;
use relay_common::protocol::{ChatRequest, Turn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Trailing turn content after a failed reply.
pub const APOLOGY: &str = "Sorry, something went wrong.";

/// Why a reply ended early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `stop()` was called
    User,
    /// No new text arrived within the idle timeout
    Timeout,
}

/// How a send finished. Cancellation is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Completed,
    Cancelled(StopReason),
}

/// Cancels the reply currently in flight, from any task.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    active: Arc<Mutex<Option<CancellationToken>>>,
    loading: Arc<AtomicBool>,
}

impl StopHandle {
    /// Cancel the active reply. Does nothing when no reply is in flight.
    pub fn stop(&self) {
        if let Some(token) = self.slot().as_ref() {
            token.cancel();
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.slot() = Some(token.clone());
        self.loading.store(true, Ordering::SeqCst);
        token
    }

    fn finish(&self) {
        self.slot().take();
        self.loading.store(false, Ordering::SeqCst);
    }

    fn slot(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns a conversation and drives replies into it.
pub struct ChatSession {
    client: RelayClient,
    system: Option<String>,
    conversation: Conversation,
    handle: StopHandle,
}

impl ChatSession {
    /// `system` overrides the relay's default instruction when set.
    pub fn new(client: RelayClient, system: Option<String>) -> Self {
        Self {
            client,
            system,
            conversation: Conversation::new(),
            handle: StopHandle::default(),
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn client(&self) -> &RelayClient {
        &self.client
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.handle.clone()
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    pub fn is_loading(&self) -> bool {
        self.handle.is_loading()
    }

    /// Start over with a freshly seeded conversation.
    pub fn reset(&mut self) {
        self.conversation = Conversation::new();
    }

    /// Send one user message and stream the reply into the conversation.
    ///
    /// `on_delta` sees every delta in arrival order, after the trailing turn
    /// has been updated. On failure the trailing turn holds [`APOLOGY`] and
    /// the error is returned; the session stays usable either way.
    pub async fn send<F>(&mut self, text: &str, mut on_delta: F) -> Result<SendOutcome, ClientError>
    where
        F: FnMut(&TextDelta),
    {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        self.conversation.push(Turn::user(text));
        let request = ChatRequest {
            system: self.system.clone(),
            messages: self.conversation.snapshot(),
        };
        self.conversation.push(Turn::assistant(""));

        let token = self.handle.begin();
        let started = Instant::now();
        let result = self.stream_reply(&request, &token, &mut on_delta).await;
        self.handle.finish();

        match result {
            Ok(outcome) => {
                tracing::debug!(
                    ?outcome,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Reply finished"
                );
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Reply failed");
                self.conversation.replace_trailing_content(APOLOGY);
                Err(e)
            }
        }
    }

    async fn stream_reply<F>(
        &mut self,
        request: &ChatRequest,
        token: &CancellationToken,
        on_delta: &mut F,
    ) -> Result<SendOutcome, ClientError>
    where
        F: FnMut(&TextDelta),
    {
        let idle = self.client.config().idle_timeout;

        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(SendOutcome::Cancelled(StopReason::User)),
            opened = within(idle, self.client.send(request)) => opened,
        };
        let Some(stream) = opened else {
            return Ok(SendOutcome::Cancelled(StopReason::Timeout));
        };
        let mut stream: DeltaStream = stream?;

        let mut cumulative = String::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(SendOutcome::Cancelled(StopReason::User)),
                next = within(idle, stream.next()) => next,
            };

            match next {
                None => return Ok(SendOutcome::Cancelled(StopReason::Timeout)),
                Some(None) => return Ok(SendOutcome::Completed),
                Some(Some(delta)) => {
                    let delta = delta?;
                    cumulative.push_str(delta.as_str());
                    self.conversation.replace_trailing_content(cumulative.as_str());
                    on_delta(&delta);
                }
            }
        }
    }
}

/// Await `fut`, giving up after `limit` when one is set.
async fn within<T>(limit: Option<Duration>, fut: impl std::future::Future<Output = T>) -> Option<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}
