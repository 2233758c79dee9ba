//! HTTP server for receiving readings.
//!
//! This module provides an HTTP server that:
//! - Accepts readings via POST /ingest and feeds them to the dispatcher
//! - Reports relay counters and per-stream state via GET /stats
//!
//! # Architecture
//!
//! ```text
//! bus bridge ──→ POST /ingest ──→ Dispatcher ──→ outbox ──→ sink
//! ```

use crate::dispatch::{Dispatcher, Outcome, StreamSummary};
use crate::error::RelayError;
use crate::stats::StatsSnapshot;
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

/// Shared server state
pub struct ServerState {
    dispatcher: Arc<Dispatcher>,
}

/// A reading posted to the relay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub topic: String,
    pub payload: String,
    /// Seconds since the epoch; arrival time when omitted
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Response from ingest endpoint
#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub status: String,
    pub outcome: Outcome,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Stats response
#[derive(Serialize)]
pub struct StatsResponse {
    pub counters: StatsSnapshot,
    pub streams: Vec<StreamSummary>,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /ingest
async fn ingest(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, (StatusCode, Json<ErrorResponse>)> {
    let timestamp = request.timestamp.unwrap_or_else(|| Utc::now().timestamp());

    let outcome = state
        .dispatcher
        .on_reading(&request.topic, timestamp, &request.payload)
        .map_err(|e| {
            let (status, code) = error_status(&e);
            (
                status,
                Json(ErrorResponse {
                    error: e.to_string(),
                    code: code.to_string(),
                }),
            )
        })?;

    Ok(Json(IngestResponse {
        status: "ok".to_string(),
        outcome,
    }))
}

/// Status and code for a reading the relay could not take.
///
/// Sink failures happen later, when the outbox is drained, so anything that
/// is not a bad payload means nothing is draining.
fn error_status(error: &RelayError) -> (StatusCode, &'static str) {
    match error {
        RelayError::MalformedReading { .. } => (StatusCode::BAD_REQUEST, "MALFORMED_READING"),
        RelayError::OutboxClosed | RelayError::Publish(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "OUTBOX_CLOSED")
        }
    }
}

/// GET /stats
async fn stats(State(state): State<Arc<ServerState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        counters: state.dispatcher.stats().stats(),
        streams: state.dispatcher.stream_summaries(),
    })
}

/// Build the router without binding it.
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    let state = Arc::new(ServerState { dispatcher });

    Router::new()
        .route("/health", get(health))
        .route("/ingest", post(ingest))
        .route("/stats", get(stats))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = router(dispatcher);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Sensor relay server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status() {
        let malformed = RelayError::MalformedReading {
            topic: "in".to_string(),
            payload: "x".to_string(),
            expected: "integer",
        };
        assert_eq!(
            error_status(&malformed),
            (StatusCode::BAD_REQUEST, "MALFORMED_READING")
        );
        assert_eq!(
            error_status(&RelayError::OutboxClosed),
            (StatusCode::SERVICE_UNAVAILABLE, "OUTBOX_CLOSED")
        );
    }
}
