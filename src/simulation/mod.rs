//! Bridge to the fork-simulation backend.
//!
//! Approved transactions are replayed against a JSON-RPC node. The default
//! backend is a Tenderly fork addressed by its fork id.

mod tenderly;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, RpcError};

pub use self::tenderly::TenderlyGateway;

/// Outbound JSON-RPC call; the dApp's id and params are forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: &'a serde_json::Value,
}

impl<'a> JsonRpcRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: &'a serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// Backend reply. Exactly one of `result`/`error` is expected.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcReply {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl JsonRpcReply {
    pub fn into_result(self) -> Result<serde_json::Value, GatewayError> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(GatewayError::Rpc(error)),
            (Some(result), None) => Ok(result),
            (None, None) => Err(GatewayError::InvalidResponse(
                "reply carried neither result nor error".to_string(),
            )),
        }
    }
}

#[async_trait]
pub trait SimulationGateway: Send + Sync {
    /// Submit one call and return the backend's `result` payload.
    async fn submit(
        &self,
        id: u64,
        method: &str,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, GatewayError>;

    /// Endpoint the gateway posts to, for logs and diagnostics.
    fn endpoint(&self) -> &str;
}
