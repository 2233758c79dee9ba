//! Gateway relay for forwarding publications over HTTP.
//!
//! Instead of writing lines to stdout, the relay can post every derived
//! value to an HTTP gateway that owns the bus connection (a small bridge in
//! front of the broker, or a home-automation webhook).

use crate::error::RelayError;
use crate::publish::{Publication, Sink};
use serde::{Deserialize, Serialize};

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL, e.g. `http://127.0.0.1:8123`
    pub url: String,
    /// Bearer authentication token
    pub token: String,
}

impl GatewayConfig {
    /// Create a new gateway configuration.
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        let url: String = url.into();
        Self {
            url: url.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Get the publish endpoint URL.
    pub fn publish_url(&self) -> String {
        format!("{}/v1/publish", self.url)
    }

    /// Get the health check endpoint URL.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.url)
    }
}

/// Gateway client error types.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway config error: {0}")]
    Config(String),
    #[error("Gateway network error: {0}")]
    Network(String),
    #[error("Gateway server error ({status}): {message}")]
    Server { status: u16, message: String },
}

/// Body posted for each publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub topic: String,
    pub payload: String,
    pub stream: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_secs: Option<u64>,
    /// Relay instance identifier
    pub source: String,
    /// RFC3339 time the value was derived
    pub published_at: String,
}

impl PublishRequest {
    pub fn new(publication: &Publication, source: &str) -> Self {
        Self {
            topic: publication.topic.clone(),
            payload: publication.payload.clone(),
            stream: publication.stream.clone(),
            window_secs: publication.window_secs,
            source: source.to_string(),
            published_at: publication.created_at.to_rfc3339(),
        }
    }
}

/// Async client for the gateway.
pub struct GatewayClient {
    config: GatewayConfig,
    client: reqwest::Client,
    source: String,
}

impl GatewayClient {
    /// Create a new gateway client.
    pub fn new(config: GatewayConfig, source: impl Into<String>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            source: source.into(),
        })
    }

    /// Test connection to the gateway.
    pub async fn test_connection(&self) -> Result<bool, GatewayError> {
        let response = self
            .client
            .get(self.config.health_url())
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }

    /// Post one publication.
    pub async fn publish(&self, publication: &Publication) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(self.config.publish_url())
            .header("Authorization", format!("Bearer {}", self.config.token))
            .json(&PublishRequest::new(publication, &self.source))
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GatewayError::Server {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

/// Blocking gateway client for the synchronous relay loop.
pub struct BlockingGatewayClient {
    inner: GatewayClient,
    runtime: tokio::runtime::Runtime,
}

impl BlockingGatewayClient {
    /// Create a new blocking gateway client.
    pub fn new(config: GatewayConfig, source: impl Into<String>) -> Result<Self, GatewayError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            inner: GatewayClient::new(config, source)?,
            runtime,
        })
    }

    /// Test connection to the gateway.
    pub fn test_connection(&self) -> Result<bool, GatewayError> {
        self.runtime.block_on(self.inner.test_connection())
    }

    /// Post one publication.
    pub fn publish(&self, publication: &Publication) -> Result<(), GatewayError> {
        self.runtime.block_on(self.inner.publish(publication))
    }
}

/// [`Sink`] posting to the gateway, one attempt per publication.
pub struct GatewaySink {
    client: BlockingGatewayClient,
}

impl GatewaySink {
    pub fn new(client: BlockingGatewayClient) -> Self {
        Self { client }
    }
}

impl Sink for GatewaySink {
    fn deliver(&mut self, publication: &Publication) -> Result<(), RelayError> {
        self.client
            .publish(publication)
            .map_err(|e| RelayError::Publish(e.to_string()))
    }
}
