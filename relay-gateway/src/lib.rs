//! Relay Gateway - forwards chat conversations to an upstream model API.
//!
//! This crate provides:
//! - The HTTP surface (`/health`, `/api/chat`, `/api/chat/stream`)
//! - Request transformation (system prompt + flattened turn history)
//! - The upstream provider (OpenAI Responses API, buffered or streamed)
//!
//! ## Architecture
//!
//! ```text
//! Client → Relay (parse → flatten → provider) → OpenAI
//!                         ↓
//!           { "text" } or streamed text deltas
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod provider;
pub mod relay;
pub mod routes;

pub use provider::{
    create_provider, ModelProvider, ModelRequest, OpenAIProvider, ProviderError,
    ProviderErrorKind, TextStream,
};
pub use relay::{flatten_turns, RelayError, RelayService, GENERIC_FAILURE, INVALID_BODY};
pub use routes::AppState;

use axum::Router;
use relay_common::config::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the relay router, creating the provider from configuration.
pub fn build_router(config: &Config) -> Router {
    build_router_with_provider(config, create_provider(&config.upstream))
}

/// Build the relay router around an explicit provider.
pub fn build_router_with_provider(config: &Config, provider: Arc<dyn ModelProvider>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let state = AppState::new(RelayService::from_config(config, provider));

    routes::build_routes(state, config.server.body_limit_bytes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    )
}

/// Start the relay server and run until Ctrl-C or SIGTERM.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr: SocketAddr = config.bind_address().parse()?;

    if config.missing_credentials() {
        tracing::warn!("OPENAI_API_KEY is not set; chat requests will fail until it is configured");
    }

    let router = build_router(config);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Relay listening on http://{}", listener.local_addr()?);
    tracing::info!(model = %config.upstream.model, "Using upstream model");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Relay shutting down");
}
