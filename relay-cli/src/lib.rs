//! Relay CLI - streaming chat client for the relay.
//!
//! - [`client`]: HTTP transport, incremental body decoding into text deltas
//! - [`conversation`]: client-side turn history
//! - [`session`]: drives one reply at a time into a conversation, with stop
//!   and idle timeout

#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use,
    clippy::cast_possible_truncation
)]

pub use relay_common;

pub mod client;
pub mod conversation;
pub mod session;

pub use client::{
    ClientConfig, ClientError, DeliveryMode, DeltaStream, RelayClient, TextDelta, DEFAULT_ENDPOINT,
};
pub use conversation::{Conversation, GREETING};
pub use session::{ChatSession, SendOutcome, StopHandle, StopReason, APOLOGY};
