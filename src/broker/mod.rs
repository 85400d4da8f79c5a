//! The wallet-side session broker.
//!
//! One [`Broker`] owns the session registry, the impersonation target, the
//! audit log and the correlation table for inbound requests. Transport
//! events are pumped by a single background task: proposals, deletions and
//! acknowledgements are handled in order on that task, while every session
//! request gets its own task so a slow simulation backend on one session
//! never delays another.

mod dispatcher;
mod lifecycle;
mod negotiator;
mod pairing;
mod pending;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use serde::Serialize;
use tokio::sync::{RwLock, broadcast, watch};

use crate::audit::AuditLog;
use crate::error::RpcError;
use crate::resolver::AddressResolver;
use crate::session::SessionRegistry;
use crate::simulation::SimulationGateway;
use crate::target::TargetState;
use crate::transport::{Transport, TransportEvent};

pub use self::dispatcher::{METHOD_TABLE, MethodClass, classify};
pub use self::negotiator::build_namespaces;
pub use self::pending::{PendingRequest, PendingRequests, RequestStatus};

const NOTICE_CAPACITY: usize = 64;

/// Operator-visible connection indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    /// Handshake done or in progress, waiting for a proposal.
    Pairing,
    Connected,
}

/// Who ended a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminatedBy {
    Peer,
    Operator,
}

/// Notifications for the operator surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BrokerNotice {
    SessionApproved {
        topic: String,
        peer: String,
    },
    ProposalRejected {
        proposal_id: u64,
        reason: String,
    },
    SessionUpdated {
        topic: String,
    },
    SessionTerminated {
        topic: String,
        by: TerminatedBy,
    },
    /// A transaction request finished the forwarding path.
    RequestCompleted {
        topic: String,
        id: u64,
        method: String,
        tx_hash: Option<String>,
        error: Option<RpcError>,
    },
    RequestRejected {
        topic: String,
        id: u64,
        method: String,
        error: RpcError,
    },
}

pub struct Broker {
    transport: Arc<dyn Transport>,
    resolver: Arc<dyn AddressResolver>,
    gateway: RwLock<Option<Arc<dyn SimulationGateway>>>,
    registry: SessionRegistry,
    target: TargetState,
    pending: PendingRequests,
    audit: AuditLog,
    notices: broadcast::Sender<BrokerNotice>,
    connection: watch::Sender<ConnectionState>,
    events_attached: AtomicBool,
}

impl Broker {
    pub fn new(transport: Arc<dyn Transport>, resolver: Arc<dyn AddressResolver>) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let (connection, _) = watch::channel(ConnectionState::Idle);
        Self {
            transport,
            resolver,
            gateway: RwLock::new(None),
            registry: SessionRegistry::new(),
            target: TargetState::default(),
            pending: PendingRequests::new(),
            audit: AuditLog::new(),
            notices,
            connection,
            events_attached: AtomicBool::new(false),
        }
    }

    pub fn with_target(mut self, display: impl Into<String>, chain_id: u64) -> Self {
        self.target = TargetState::new(display, chain_id);
        self
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn SimulationGateway>) -> Self {
        self.gateway = RwLock::new(Some(gateway));
        self
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn target(&self) -> &TargetState {
        &self.target
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    /// Install, replace or remove the simulation backend at runtime.
    pub async fn set_gateway(&self, gateway: Option<Arc<dyn SimulationGateway>>) {
        match gateway {
            Some(ref gw) => tracing::info!("Simulation gateway set to {}", gw.endpoint()),
            None => tracing::info!("Simulation gateway cleared"),
        }
        *self.gateway.write().await = gateway;
    }

    pub async fn gateway(&self) -> Option<Arc<dyn SimulationGateway>> {
        self.gateway.read().await.clone()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<BrokerNotice> {
        self.notices.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    fn set_connection(&self, state: ConnectionState) {
        self.connection.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            tracing::debug!("Connection state {:?} -> {:?}", current, state);
            *current = state;
            true
        });
    }

    fn notify(&self, notice: BrokerNotice) {
        // No subscribers is fine; notices are advisory.
        let _ = self.notices.send(notice);
    }

    /// Start pumping transport events. Returns false if already attached.
    pub fn attach_events(self: &Arc<Self>) -> bool {
        if self.events_attached.swap(true, Ordering::SeqCst) {
            return false;
        }
        let Some(mut events) = self.transport.take_events() else {
            tracing::warn!("Transport event stream unavailable; events not attached");
            return false;
        };

        let broker = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(broker) = broker.upgrade() else {
                    break;
                };
                broker.handle_event(event).await;
            }
            tracing::debug!("Transport event stream closed");
        });
        tracing::debug!("Attached to transport events");
        true
    }

    async fn handle_event(self: Arc<Self>, event: TransportEvent) {
        tracing::debug!("Transport event: {}", event.kind());
        match event {
            TransportEvent::SessionProposal(proposal) => {
                if let Err(e) = self.on_proposal(proposal).await {
                    tracing::debug!("Proposal not approved: {}", e);
                }
            }
            TransportEvent::SessionRequest(request) => {
                let broker: Weak<Self> = Arc::downgrade(&self);
                tokio::spawn(async move {
                    if let Some(broker) = broker.upgrade() {
                        broker.on_request(request).await;
                    }
                });
            }
            TransportEvent::SessionDelete { topic } => {
                self.on_session_delete(&topic).await;
            }
            TransportEvent::SessionAcknowledged { topic } => {
                self.on_acknowledged(&topic).await;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use alloy_primitives::{Address, address};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::Broker;
    use crate::error::{GatewayError, RpcError};
    use crate::resolver::StaticResolver;
    use crate::simulation::SimulationGateway;
    use crate::session::{PeerMetadata, RequiredNamespace, RequiredNamespaces};
    use crate::transport::LoopbackTransport;

    pub const TARGET: Address = address!("5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");

    pub fn dapp() -> PeerMetadata {
        PeerMetadata {
            name: "Test dApp".to_string(),
            description: "dApp under test".to_string(),
            url: "https://dapp.example".to_string(),
            icons: vec![],
        }
    }

    pub fn eip155(chains: &[&str]) -> RequiredNamespaces {
        let mut required = RequiredNamespaces::new();
        required.insert(
            "eip155".to_string(),
            RequiredNamespace {
                chains: Some(chains.iter().map(|c| c.to_string()).collect()),
                methods: vec!["eth_sendTransaction".to_string(), "personal_sign".to_string()],
                events: vec!["accountsChanged".to_string()],
            },
        );
        required
    }

    pub fn broker(display: &str) -> (Arc<LoopbackTransport>, Arc<Broker>) {
        let transport = Arc::new(LoopbackTransport::new(PeerMetadata::default()));
        let broker = Broker::new(transport.clone(), Arc::new(StaticResolver::new()))
            .with_target(display, 1);
        (transport, Arc::new(broker))
    }

    /// Resolve the target and settle one session for `eip155:1`.
    pub async fn open_session(transport: &LoopbackTransport, broker: &Broker) -> String {
        broker
            .target()
            .resolve_and_validate(&StaticResolver::new())
            .await
            .expect("target resolves");
        let id = transport
            .peer_propose("pairing", dapp(), eip155(&["eip155:1"]))
            .await;
        let proposal = crate::transport::SessionProposal {
            id,
            pairing_topic: "pairing".to_string(),
            proposer: dapp(),
            required_namespaces: eip155(&["eip155:1"]),
            optional_namespaces: RequiredNamespaces::new(),
            relays: vec![],
        };
        broker.on_proposal(proposal).await.expect("proposal approved")
    }

    /// Gateway answering every call with a fixed reply after `delay`.
    pub struct FakeGateway {
        pub reply: Result<serde_json::Value, RpcError>,
        pub delay: Duration,
        pub calls: Mutex<Vec<(u64, String, serde_json::Value)>>,
    }

    impl FakeGateway {
        pub fn ok(result: serde_json::Value) -> Self {
            Self {
                reply: Ok(result),
                delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(error: RpcError) -> Self {
            Self {
                reply: Err(error),
                delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl SimulationGateway for FakeGateway {
        async fn submit(
            &self,
            id: u64,
            method: &str,
            params: &serde_json::Value,
        ) -> Result<serde_json::Value, GatewayError> {
            self.calls
                .lock()
                .await
                .push((id, method.to_string(), params.clone()));
            tokio::time::sleep(self.delay).await;
            self.reply.clone().map_err(GatewayError::Rpc)
        }

        fn endpoint(&self) -> &str {
            "fake://gateway"
        }
    }

    pub fn uri() -> String {
        format!(
            "wc:7f6e504bfad60b485450578e05678ed3e8e8c4751d3c6160be17160d63ec90f9@2?relay-protocol=irn&symKey={}",
            "587d5484ce2a2a6ee3ba1962fdd7e8588e06200c46823bd18fbd67def96ad303"
        )
    }
}
