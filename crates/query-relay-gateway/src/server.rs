// crates/query-relay-gateway/src/server.rs
// ============================================================================
// Module: Gateway HTTP Server
// Description: axum routes for execution and health checks.
// Purpose: Expose the gateway to remote clients over HTTP.
// Dependencies: axum, tokio, query-relay-config
// ============================================================================

//! ## Overview
//! Routes:
//! - `POST /v1/execute` takes an `ExecuteRequest` JSON body and answers with
//!   an `ExecutionResult`.
//! - `GET /v1/health` answers `{"status":"ok"}`.
//!
//! Security posture: bodies are untrusted, size-capped before parsing, and
//! rejected on unknown fields.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use query_relay_config::ServerConfig;
use query_relay_core::ExecuteRequest;
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::gateway::Gateway;

// ============================================================================
// SECTION: Server
// ============================================================================

/// HTTP server wrapping a shared gateway.
pub struct GatewayServer {
    /// Shared gateway.
    gateway: Arc<Gateway>,
    /// Server configuration.
    config: ServerConfig,
}

impl GatewayServer {
    /// Creates a server.
    #[must_use]
    pub const fn new(gateway: Arc<Gateway>, config: ServerConfig) -> Self {
        Self {
            gateway,
            config,
        }
    }

    /// Builds the axum router.
    #[must_use]
    pub fn router(&self) -> Router {
        router(Arc::clone(&self.gateway), self.config.max_body_bytes)
    }

    /// Binds the configured address and serves until the process stops.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let addr: SocketAddr =
            self.config.bind_addr().map_err(|err| ServerError::Config(err.to_string()))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|err| ServerError::Transport(format!("http bind failed: {err}")))?;
        self.serve_on(listener).await
    }

    /// Serves on an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Transport`] when the server fails.
    pub async fn serve_on(self, listener: TcpListener) -> Result<(), ServerError> {
        axum::serve(listener, self.router())
            .await
            .map_err(|err| ServerError::Transport(format!("http server failed: {err}")))
    }
}

/// Builds the gateway router with a request body cap.
pub fn router(gateway: Arc<Gateway>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/v1/execute", post(handle_execute))
        .route("/v1/health", get(handle_health))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(gateway)
}

/// Handles execution requests.
async fn handle_execute(State(gateway): State<Arc<Gateway>>, body: Bytes) -> Response {
    let request: ExecuteRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": format!("invalid request: {err}")})),
            )
                .into_response();
        }
    };
    Json(gateway.execute(request).await).into_response()
}

/// Handles health checks.
async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}
