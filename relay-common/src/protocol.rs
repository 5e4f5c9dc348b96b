//! Wire types exchanged between the chat client and the relay.
//!
//! ```text
//! POST /api/chat         { "system"?: string, "messages": [Turn] } → { "text": string }
//! POST /api/chat/stream  same body                                  → text/plain chunks
//! GET  /health                                                      → { "ok": true }
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Who authored a turn.
///
/// Deserialization is lenient: a missing, `null` or unrecognized role is
/// read as [`Role::User`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Assistant,
}

impl Role {
    /// Parse a wire role, falling back to `User`.
    pub fn from_wire(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("assistant") => Self::Assistant,
            _ => Self::User,
        }
    }

    /// Upper-case label used when flattening a conversation.
    pub const fn label(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Assistant => "ASSISTANT",
        }
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
        Ok(Self::from_wire(raw.as_ref().and_then(|v| v.as_str())))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        })
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    #[serde(default)]
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Chat request body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    /// System instruction; the relay's default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Full ordered history, newest turn last
    #[serde(default)]
    pub messages: Vec<Turn>,
}

/// Successful buffered reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub text: String,
}

/// Error body. The message is always a generic constant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Health check body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub ok: bool,
}
