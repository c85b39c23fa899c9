//! Network controller client
//!
//! [`NetworkClient`] is the seam between the orchestrator and the external
//! controller. [`HttpNetworkClient`] speaks the controller's REST port API.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{AuthStrategy, NetworkConfig};
use crate::error::{NetworkClientError, Result};
use crate::types::{MaybePortEnvelope, NetworkPort, PortBody, PortEnvelope, PortFilter, PortsEnvelope};

/// Operations the orchestrator needs from a network controller
#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Create a port. `Ok(None)` means the controller answered without a port.
    async fn create_port(&self, body: &PortBody) -> Result<Option<NetworkPort>>;

    async fn delete_port(&self, port_id: &str) -> Result<()>;

    async fn list_ports(&self, filter: &PortFilter) -> Result<Vec<NetworkPort>>;

    async fn update_port(&self, port_id: &str, body: &PortBody) -> Result<NetworkPort>;

    async fn show_port(&self, port_id: &str) -> Result<NetworkPort>;
}

/// Base delay between retries of a request that failed to connect
const RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Longest wait between two retries
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(10);

/// Delay before retry number `attempt` (1-based)
fn retry_backoff(attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    RETRY_BACKOFF.saturating_mul(factor).min(MAX_RETRY_BACKOFF)
}

/// REST client for the controller's `/v2.0/ports` API
#[derive(Debug, Clone)]
pub struct HttpNetworkClient {
    client: Client,
    base_url: String,
    retries: u32,
    token: Option<String>,
}

impl HttpNetworkClient {
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| NetworkClientError::ConnectionFailed(format!("failed to build HTTP client: {}", e)))?;

        let token = match config.auth_strategy {
            AuthStrategy::Noauth => None,
            AuthStrategy::Token => config.auth_token.clone(),
        };

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            retries: config.retries,
            token,
        })
    }

    fn ports_url(&self) -> String {
        format!("{}/v2.0/ports", self.base_url)
    }

    fn port_url(&self, port_id: &str) -> String {
        format!("{}/v2.0/ports/{}", self.base_url, port_id)
    }

    /// Send a request, retrying only when the controller could not be reached.
    ///
    /// A timed out request may still have been applied, so timeouts are
    /// only retried when `idempotent` is set.
    async fn send(&self, idempotent: bool, build: impl Fn() -> RequestBuilder) -> Result<Response> {
        let mut attempt = 0;
        loop {
            let mut request = build();
            if let Some(token) = &self.token {
                request = request.header("X-Auth-Token", token);
            }
            match request.send().await {
                Ok(response) => return Ok(response),
                Err(e) if (e.is_connect() || (idempotent && e.is_timeout())) && attempt < self.retries => {
                    attempt += 1;
                    let backoff = retry_backoff(attempt);
                    warn!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Network controller unreachable, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn check(response: Response, what: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(NetworkClientError::NotFound(what.to_string()));
        }
        Err(NetworkClientError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl NetworkClient for HttpNetworkClient {
    async fn create_port(&self, body: &PortBody) -> Result<Option<NetworkPort>> {
        let envelope = PortEnvelope { port: body };
        let url = self.ports_url();
        let response = self.send(false, || self.client.post(&url).json(&envelope)).await?;
        let response = Self::check(response, "ports").await?;
        let created: MaybePortEnvelope = response.json().await?;
        debug!(port = ?created.port.as_ref().map(|p| &p.id), "Created network port");
        Ok(created.port)
    }

    async fn delete_port(&self, port_id: &str) -> Result<()> {
        let url = self.port_url(port_id);
        let response = self.send(true, || self.client.delete(&url)).await?;
        Self::check(response, port_id).await?;
        Ok(())
    }

    async fn list_ports(&self, filter: &PortFilter) -> Result<Vec<NetworkPort>> {
        let url = self.ports_url();
        let response = self.send(true, || self.client.get(&url).query(filter)).await?;
        let response = Self::check(response, "ports").await?;
        let listed: PortsEnvelope = response.json().await?;
        Ok(listed.ports)
    }

    async fn update_port(&self, port_id: &str, body: &PortBody) -> Result<NetworkPort> {
        let envelope = PortEnvelope { port: body };
        let url = self.port_url(port_id);
        let response = self.send(true, || self.client.put(&url).json(&envelope)).await?;
        let response = Self::check(response, port_id).await?;
        let updated: PortEnvelope<NetworkPort> = response.json().await?;
        Ok(updated.port)
    }

    async fn show_port(&self, port_id: &str) -> Result<NetworkPort> {
        let url = self.port_url(port_id);
        let response = self.send(true, || self.client.get(&url)).await?;
        let response = Self::check(response, port_id).await?;
        let shown: PortEnvelope<NetworkPort> = response.json().await?;
        Ok(shown.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_backoff_doubles_then_caps() {
        assert_eq!(retry_backoff(1), Duration::from_millis(200));
        assert_eq!(retry_backoff(3), Duration::from_millis(800));
        assert_eq!(retry_backoff(7), MAX_RETRY_BACKOFF);
        assert_eq!(retry_backoff(40), MAX_RETRY_BACKOFF);
        assert_eq!(retry_backoff(u32::MAX), MAX_RETRY_BACKOFF);
    }
}
