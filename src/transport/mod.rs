//! Boundary to the pairing/relay transport.
//!
//! The relay network and its encryption live outside this crate. The broker
//! only needs the operations below plus a stream of inbound events; any
//! WalletConnect v2 client can sit behind [`Transport`]. The in-process
//! [`LoopbackTransport`] backs the test suite and the `demo` command.

mod loopback;
mod uri;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{RpcError, TransportError};
use crate::session::{Namespaces, PeerMetadata, RequiredNamespaces, SettledSession};

pub use self::loopback::LoopbackTransport;
pub use self::uri::PairingUri;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relay {
    pub protocol: String,
}

/// A peer's request to open a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProposal {
    pub id: u64,
    pub pairing_topic: String,
    pub proposer: PeerMetadata,
    pub required_namespaces: RequiredNamespaces,
    #[serde(default)]
    pub optional_namespaces: RequiredNamespaces,
    #[serde(default)]
    pub relays: Vec<Relay>,
}

impl SessionProposal {
    /// Relay protocol to settle on: the proposer's first choice, `irn` otherwise.
    pub fn relay_protocol(&self) -> &str {
        self.relays
            .first()
            .map(|relay| relay.protocol.as_str())
            .unwrap_or("irn")
    }
}

/// An inbound method call on an open session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub topic: String,
    pub id: u64,
    #[serde(default)]
    pub chain_id: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Reason attached to rejections and disconnects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReason {
    pub code: i64,
    pub message: String,
}

impl ErrorReason {
    pub fn user_rejected(message: impl Into<String>) -> Self {
        Self {
            code: 5000,
            message: message.into(),
        }
    }

    pub fn user_disconnected() -> Self {
        Self {
            code: 6000,
            message: "USER_DISCONNECTED".to_string(),
        }
    }

    pub fn session_deleted() -> Self {
        Self {
            code: 6000,
            message: "Session deleted".to_string(),
        }
    }
}

/// Terminal payload of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcOutcome {
    Result(serde_json::Value),
    Error(RpcError),
}

/// JSON-RPC response correlated to an inbound request id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    pub jsonrpc: String,
    #[serde(flatten)]
    pub outcome: RpcOutcome,
}

impl RpcResponse {
    pub fn result(id: u64, result: serde_json::Value) -> Self {
        Self {
            id,
            jsonrpc: "2.0".to_string(),
            outcome: RpcOutcome::Result(result),
        }
    }

    pub fn error(id: u64, error: RpcError) -> Self {
        Self {
            id,
            jsonrpc: "2.0".to_string(),
            outcome: RpcOutcome::Error(error),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, RpcOutcome::Error(_))
    }
}

/// Events pushed by the transport to the broker.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    SessionProposal(SessionProposal),
    SessionRequest(SessionRequest),
    SessionDelete { topic: String },
    SessionAcknowledged { topic: String },
}

impl TransportEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionProposal(_) => "session_proposal",
            Self::SessionRequest(_) => "session_request",
            Self::SessionDelete { .. } => "session_delete",
            Self::SessionAcknowledged { .. } => "session_acknowledged",
        }
    }
}

/// Operations the broker consumes from the relay client.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a pairing from an invitation and wait for the handshake.
    async fn pair(&self, uri: &PairingUri) -> Result<(), TransportError>;

    /// Settle a proposal with the given grant.
    async fn approve_session(
        &self,
        proposal_id: u64,
        relay_protocol: &str,
        namespaces: Namespaces,
    ) -> Result<SettledSession, TransportError>;

    async fn reject_session(
        &self,
        proposal_id: u64,
        reason: ErrorReason,
    ) -> Result<(), TransportError>;

    async fn respond(&self, topic: &str, response: RpcResponse) -> Result<(), TransportError>;

    /// Reissue the grant of an open session.
    async fn update_session(
        &self,
        topic: &str,
        namespaces: Namespaces,
    ) -> Result<(), TransportError>;

    async fn disconnect_session(
        &self,
        topic: &str,
        reason: ErrorReason,
    ) -> Result<(), TransportError>;

    /// Sessions the transport still considers open (its own persisted cache).
    async fn active_sessions(&self) -> Result<Vec<SettledSession>, TransportError>;

    /// Hand over the inbound event stream. Returns `None` once taken.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>>;
}
