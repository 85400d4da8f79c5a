//! In-process transport with a scriptable dApp peer.
//!
//! The wallet side implements [`Transport`]; the peer side is driven through
//! the `peer_*` methods, which push events exactly as a relay would. Every
//! outbound call is recorded so callers can inspect what the broker sent.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, mpsc};

use crate::error::TransportError;
use crate::session::{Namespaces, PeerMetadata, RequiredNamespaces, SettledSession};
use crate::transport::{
    ErrorReason, PairingUri, Relay, RpcResponse, SessionProposal, SessionRequest, Transport,
    TransportEvent,
};

const SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Default)]
struct LoopbackState {
    pairings: Vec<String>,
    queued_proposal: Option<(PeerMetadata, RequiredNamespaces)>,
    proposals: HashMap<u64, SessionProposal>,
    next_proposal_id: u64,
    sessions: BTreeMap<String, SettledSession>,
    responses: Vec<(String, RpcResponse)>,
    rejected_proposals: Vec<(u64, ErrorReason)>,
    disconnects: Vec<(String, ErrorReason)>,
    updates: Vec<(String, Namespaces)>,
    fail_pairing: Option<String>,
    fail_next_approval: Option<String>,
    fail_disconnects: bool,
}

/// Loopback relay: wallet and dApp live in the same process.
pub struct LoopbackTransport {
    wallet_metadata: PeerMetadata,
    state: Mutex<LoopbackState>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: StdMutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
    cache_path: Option<PathBuf>,
}

impl LoopbackTransport {
    pub fn new(wallet_metadata: PeerMetadata) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            wallet_metadata,
            state: Mutex::new(LoopbackState {
                next_proposal_id: 1,
                ..Default::default()
            }),
            events_tx,
            events_rx: StdMutex::new(Some(events_rx)),
            cache_path: None,
        }
    }

    /// Persist settled sessions to `path`, adopting any already stored there.
    pub fn with_session_cache(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cached = load_session_cache(&path);
        if !cached.is_empty() {
            tracing::info!(
                "Loaded {} cached session(s) from {}",
                cached.len(),
                path.display()
            );
        }
        let state = self.state.get_mut();
        for session in cached {
            state.sessions.insert(session.topic.clone(), session);
        }
        self.cache_path = Some(path);
        self
    }

    pub fn wallet_metadata(&self) -> &PeerMetadata {
        &self.wallet_metadata
    }

    // ── Peer side ──────────────────────────────────────────────

    /// Proposal the dApp sends as soon as the next pairing completes.
    pub async fn peer_queue_proposal(&self, proposer: PeerMetadata, required: RequiredNamespaces) {
        self.state.lock().await.queued_proposal = Some((proposer, required));
    }

    /// Send a proposal on an existing pairing. Returns the proposal id.
    pub async fn peer_propose(
        &self,
        pairing_topic: &str,
        proposer: PeerMetadata,
        required: RequiredNamespaces,
    ) -> u64 {
        let mut state = self.state.lock().await;
        let proposal = Self::register_proposal(&mut state, pairing_topic, proposer, required);
        let id = proposal.id;
        self.emit(TransportEvent::SessionProposal(proposal));
        id
    }

    pub fn peer_request(
        &self,
        topic: &str,
        id: u64,
        method: &str,
        params: serde_json::Value,
    ) {
        self.emit(TransportEvent::SessionRequest(SessionRequest {
            topic: topic.to_string(),
            id,
            chain_id: None,
            method: method.to_string(),
            params,
        }));
    }

    /// The dApp closes the session on its side.
    pub async fn peer_delete(&self, topic: &str) {
        {
            let mut state = self.state.lock().await;
            state.sessions.remove(topic);
            self.persist(&state);
        }
        self.emit(TransportEvent::SessionDelete {
            topic: topic.to_string(),
        });
    }

    pub async fn peer_acknowledge(&self, topic: &str) {
        {
            let mut state = self.state.lock().await;
            if let Some(session) = state.sessions.get_mut(topic) {
                session.acknowledged = true;
            }
            self.persist(&state);
        }
        self.emit(TransportEvent::SessionAcknowledged {
            topic: topic.to_string(),
        });
    }

    // ── Failure injection ──────────────────────────────────────

    pub async fn fail_pairing(&self, reason: &str) {
        self.state.lock().await.fail_pairing = Some(reason.to_string());
    }

    pub async fn fail_next_approval(&self, reason: &str) {
        self.state.lock().await.fail_next_approval = Some(reason.to_string());
    }

    pub async fn fail_disconnects(&self, fail: bool) {
        self.state.lock().await.fail_disconnects = fail;
    }

    // ── Inspection ─────────────────────────────────────────────

    pub async fn pair_count(&self) -> usize {
        self.state.lock().await.pairings.len()
    }

    pub async fn responses(&self) -> Vec<(String, RpcResponse)> {
        self.state.lock().await.responses.clone()
    }

    pub async fn responses_for(&self, topic: &str, id: u64) -> Vec<RpcResponse> {
        self.state
            .lock()
            .await
            .responses
            .iter()
            .filter(|(t, r)| t == topic && r.id == id)
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub async fn rejected_proposals(&self) -> Vec<(u64, ErrorReason)> {
        self.state.lock().await.rejected_proposals.clone()
    }

    pub async fn disconnects(&self) -> Vec<(String, ErrorReason)> {
        self.state.lock().await.disconnects.clone()
    }

    pub async fn updates(&self) -> Vec<(String, Namespaces)> {
        self.state.lock().await.updates.clone()
    }

    /// Poll until a response for `(topic, id)` shows up or `timeout` passes.
    pub async fn wait_for_response(
        &self,
        topic: &str,
        id: u64,
        timeout: Duration,
    ) -> Option<RpcResponse> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(response) = self.responses_for(topic, id).await.into_iter().next() {
                return Some(response);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Poll until at least `count` sessions are settled.
    pub async fn wait_for_sessions(&self, count: usize, timeout: Duration) -> Vec<SettledSession> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let sessions: Vec<_> = self.state.lock().await.sessions.values().cloned().collect();
            if sessions.len() >= count || tokio::time::Instant::now() >= deadline {
                return sessions;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn register_proposal(
        state: &mut LoopbackState,
        pairing_topic: &str,
        proposer: PeerMetadata,
        required: RequiredNamespaces,
    ) -> SessionProposal {
        let id = state.next_proposal_id;
        state.next_proposal_id += 1;
        let proposal = SessionProposal {
            id,
            pairing_topic: pairing_topic.to_string(),
            proposer,
            required_namespaces: required,
            optional_namespaces: RequiredNamespaces::new(),
            relays: vec![Relay {
                protocol: "irn".to_string(),
            }],
        };
        state.proposals.insert(id, proposal.clone());
        proposal
    }

    fn emit(&self, event: TransportEvent) {
        if self.events_tx.send(event).is_err() {
            tracing::debug!("Loopback event dropped: no listener attached");
        }
    }

    fn persist(&self, state: &LoopbackState) {
        let Some(ref path) = self.cache_path else {
            return;
        };
        let sessions: Vec<&SettledSession> = state.sessions.values().collect();
        let json = match serde_json::to_string_pretty(&sessions) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Failed to serialize session cache: {}", e);
                return;
            }
        };
        if let Some(parent) = path.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            tracing::warn!("Failed to create {}: {}", parent.display(), e);
            return;
        }
        if let Err(e) = std::fs::write(path, json) {
            tracing::warn!("Failed to write session cache {}: {}", path.display(), e);
        }
    }
}

fn load_session_cache(path: &Path) -> Vec<SettledSession> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(_) => return Vec::new(),
    };
    match serde_json::from_str(&data) {
        Ok(sessions) => sessions,
        Err(e) => {
            tracing::warn!(
                "Corrupt session cache at {}, starting fresh: {}",
                path.display(),
                e
            );
            Vec::new()
        }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn pair(&self, uri: &PairingUri) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        if let Some(reason) = state.fail_pairing.take() {
            return Err(TransportError::Handshake(reason));
        }
        state.pairings.push(uri.topic.clone());
        if let Some((proposer, required)) = state.queued_proposal.take() {
            let proposal = Self::register_proposal(&mut state, &uri.topic, proposer, required);
            self.emit(TransportEvent::SessionProposal(proposal));
        }
        Ok(())
    }

    async fn approve_session(
        &self,
        proposal_id: u64,
        relay_protocol: &str,
        namespaces: Namespaces,
    ) -> Result<SettledSession, TransportError> {
        let mut state = self.state.lock().await;
        if let Some(reason) = state.fail_next_approval.take() {
            state.proposals.remove(&proposal_id);
            return Err(TransportError::PublishFailed {
                topic: format!("proposal:{proposal_id}"),
                reason,
            });
        }
        let proposal = state
            .proposals
            .remove(&proposal_id)
            .ok_or(TransportError::UnknownProposal(proposal_id))?;

        let session = SettledSession {
            topic: uuid::Uuid::new_v4().simple().to_string(),
            peer: proposal.proposer,
            namespaces,
            acknowledged: false,
            relay_protocol: relay_protocol.to_string(),
            expiry: Some(Utc::now().timestamp() + SESSION_TTL_SECS),
        };
        state
            .sessions
            .insert(session.topic.clone(), session.clone());
        self.persist(&state);
        Ok(session)
    }

    async fn reject_session(
        &self,
        proposal_id: u64,
        reason: ErrorReason,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        state
            .proposals
            .remove(&proposal_id)
            .ok_or(TransportError::UnknownProposal(proposal_id))?;
        state.rejected_proposals.push((proposal_id, reason));
        Ok(())
    }

    async fn respond(&self, topic: &str, response: RpcResponse) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        if !state.sessions.contains_key(topic) {
            return Err(TransportError::UnknownTopic(topic.to_string()));
        }
        state.responses.push((topic.to_string(), response));
        Ok(())
    }

    async fn update_session(
        &self,
        topic: &str,
        namespaces: Namespaces,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        let session = state
            .sessions
            .get_mut(topic)
            .ok_or_else(|| TransportError::UnknownTopic(topic.to_string()))?;
        session.namespaces = namespaces.clone();
        state.updates.push((topic.to_string(), namespaces));
        self.persist(&state);
        Ok(())
    }

    async fn disconnect_session(
        &self,
        topic: &str,
        reason: ErrorReason,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        state.disconnects.push((topic.to_string(), reason));
        if state.fail_disconnects {
            return Err(TransportError::PublishFailed {
                topic: topic.to_string(),
                reason: "relay unreachable".to_string(),
            });
        }
        state.sessions.remove(topic);
        self.persist(&state);
        Ok(())
    }

    async fn active_sessions(&self) -> Result<Vec<SettledSession>, TransportError> {
        Ok(self.state.lock().await.sessions.values().cloned().collect())
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        match self.events_rx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::RequiredNamespace;
    use tempfile::tempdir;

    #[test]
    fn wallet_metadata_is_what_the_wallet_advertises() {
        let metadata = PeerMetadata {
            name: "Impersonator".to_string(),
            description: "Watch-only wallet".to_string(),
            url: "https://wallet.example".to_string(),
            icons: vec![],
        };
        let transport = LoopbackTransport::new(metadata.clone());
        assert_eq!(transport.wallet_metadata(), &metadata);
    }

    fn uri() -> PairingUri {
        PairingUri::parse(&format!("wc:{}@2?relay-protocol=irn&symKey={}", "ab".repeat(32), "cd".repeat(32)))
            .unwrap()
    }

    fn required() -> RequiredNamespaces {
        let mut required = RequiredNamespaces::new();
        required.insert(
            "eip155".to_string(),
            RequiredNamespace {
                chains: Some(vec!["eip155:1".to_string()]),
                methods: vec!["eth_sendTransaction".to_string()],
                events: vec!["accountsChanged".to_string()],
            },
        );
        required
    }

    #[tokio::test]
    async fn queued_proposal_is_emitted_on_pair() {
        let transport = LoopbackTransport::new(PeerMetadata::default());
        let mut events = transport.take_events().unwrap();
        assert!(transport.take_events().is_none());

        transport
            .peer_queue_proposal(PeerMetadata::default(), required())
            .await;
        transport.pair(&uri()).await.unwrap();

        match events.recv().await.unwrap() {
            TransportEvent::SessionProposal(p) => assert_eq!(p.id, 1),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(transport.pair_count().await, 1);
    }

    #[tokio::test]
    async fn responses_to_closed_topics_fail() {
        let transport = LoopbackTransport::new(PeerMetadata::default());
        let err = transport
            .respond("gone", RpcResponse::result(1, serde_json::json!("0x")))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::UnknownTopic(_)));
    }

    #[tokio::test]
    async fn session_cache_survives_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        let transport = LoopbackTransport::new(PeerMetadata::default()).with_session_cache(&path);
        let id = transport
            .peer_propose("pairing", PeerMetadata::default(), required())
            .await;
        let settled = transport
            .approve_session(id, "irn", Namespaces::new())
            .await
            .unwrap();

        let restarted = LoopbackTransport::new(PeerMetadata::default()).with_session_cache(&path);
        let sessions = restarted.active_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].topic, settled.topic);
    }
}
