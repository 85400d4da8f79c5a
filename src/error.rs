//! Error types for the impersonator broker.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors raised by the pairing/relay transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid pairing URI: {0}")]
    InvalidUri(String),

    #[error("Pairing handshake failed: {0}")]
    Handshake(String),

    #[error("Unknown proposal {0}")]
    UnknownProposal(u64),

    #[error("Unknown session topic {0}")]
    UnknownTopic(String),

    #[error("Failed to publish on topic {topic}: {reason}")]
    PublishFailed { topic: String, reason: String },
}

/// Errors raised by the simulation backend bridge.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Simulation request to {endpoint} failed: {reason}")]
    RequestFailed { endpoint: String, reason: String },

    #[error("Simulation request to {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    #[error("Simulation backend returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Invalid response from simulation backend: {0}")]
    InvalidResponse(String),

    #[error("Simulation backend rejected the transaction: {0}")]
    Rpc(RpcError),
}

impl GatewayError {
    /// Convert into the error payload relayed back to the dApp.
    ///
    /// Backend-supplied JSON-RPC errors pass through untouched; local
    /// failures are wrapped as an internal error carrying the reason.
    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            Self::Rpc(err) => err.clone(),
            other => RpcError::new(RpcError::INTERNAL_ERROR, other.to_string()),
        }
    }
}

/// Address resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Resolver RPC call to {endpoint} failed: {reason}")]
    Rpc { endpoint: String, reason: String },

    #[error("Malformed resolver response: {0}")]
    MalformedResponse(String),

    #[error("Invalid ENS name '{0}'")]
    InvalidName(String),
}

/// Broker-level error kinds surfaced to the operator.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Invalid address '{input}': not an ENS name or Ethereum address")]
    InvalidAddress { input: String },

    #[error("Pairing failed: {reason}")]
    PairingFailed { reason: String },

    #[error("Method {method} is not supported")]
    UnsupportedMethod { method: String },

    #[error("No simulation backend is configured")]
    BackendUnavailable,

    #[error("Simulation backend error: {0}")]
    BackendError(#[from] GatewayError),

    #[error("Failed to acknowledge termination of session {topic}: {reason}")]
    TerminationAcknowledgeFailed { topic: String, reason: String },

    #[error("Session approval failed for proposal {proposal_id}: {reason}")]
    ApprovalFailed { proposal_id: u64, reason: String },

    #[error("Session {0} not found")]
    SessionNotFound(String),
}

/// JSON-RPC error object sent back to the peer or received from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    /// EIP-1193: the requested method is not supported by the wallet.
    pub const UNSUPPORTED_METHOD: i64 = 4200;
    /// EIP-1193: the wallet has not authorized the requested account.
    pub const UNAUTHORIZED: i64 = 4100;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn unsupported_method(method: &str) -> Self {
        Self::new(
            Self::UNSUPPORTED_METHOD,
            format!("method not supported: {method}"),
        )
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}
