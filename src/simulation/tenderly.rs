use std::time::Duration;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::simulation::{JsonRpcReply, JsonRpcRequest, SimulationGateway};

/// Tenderly fork RPC: `POST {base}/{fork_id}` with a JSON-RPC body.
///
/// No retries. A failed submission surfaces to the dApp as an error reply.
pub struct TenderlyGateway {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl TenderlyGateway {
    pub fn new(base_url: &str, fork_id: &str, timeout: Duration) -> Self {
        let endpoint = format!("{}/{}", base_url.trim_end_matches('/'), fork_id.trim());
        Self::with_endpoint(endpoint, timeout)
    }

    /// Point at an arbitrary JSON-RPC endpoint instead of a Tenderly fork.
    pub fn with_endpoint(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            endpoint: endpoint.into(),
            timeout,
        }
    }

    fn map_send_error(&self, error: reqwest::Error) -> GatewayError {
        if error.is_timeout() {
            GatewayError::Timeout {
                endpoint: self.endpoint.clone(),
                timeout: self.timeout,
            }
        } else {
            GatewayError::RequestFailed {
                endpoint: self.endpoint.clone(),
                reason: error.to_string(),
            }
        }
    }
}

#[async_trait]
impl SimulationGateway for TenderlyGateway {
    async fn submit(
        &self,
        id: u64,
        method: &str,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, GatewayError> {
        tracing::debug!("Submitting {} (id {}) to {}", method, id, self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&JsonRpcRequest::new(id, method, params))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_send_error(e))?;

        // Nodes commonly answer JSON-RPC errors with non-2xx statuses; honour
        // the body when it parses.
        match serde_json::from_str::<JsonRpcReply>(&body) {
            Ok(reply) if reply.result.is_some() || reply.error.is_some() => reply.into_result(),
            _ if !status.is_success() => Err(GatewayError::HttpStatus {
                status: status.as_u16(),
                body,
            }),
            Ok(reply) => reply.into_result(),
            Err(e) => Err(GatewayError::InvalidResponse(format!("{e}: {body}"))),
        }
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
