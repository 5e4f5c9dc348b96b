//! Relay Common - Shared types, configuration and utilities for the chat relay.
//!
//! This crate provides:
//! - Wire types exchanged between the chat client and the relay
//! - Configuration types and loading
//! - Configuration validation
//! - Error types
//! - Logging setup
//! - An incremental UTF-8 decoder for streamed response bodies
//! - Log sanitising helpers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod decoder;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod util;
pub mod validation;

pub use config::{ChatConfig, Config, ObservabilityConfig, ServerConfig, UpstreamConfig};
pub use decoder::Utf8StreamDecoder;
pub use error::{Error, Result};
pub use protocol::{ChatReply, ChatRequest, ErrorBody, HealthStatus, Role, Turn};
pub use validation::{Validate, ValidationError, ValidationResult};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::decoder::Utf8StreamDecoder;
    pub use crate::error::{Error, Result};
    pub use crate::logging::init_logging;
    pub use crate::protocol::{ChatReply, ChatRequest, Role, Turn};
}
