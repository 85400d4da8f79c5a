//! Turns a session proposal into a grant bound to the impersonated address.

use alloy_primitives::Address;

use crate::broker::{Broker, BrokerNotice, ConnectionState};
use crate::error::BrokerError;
use crate::session::{Namespace, Namespaces, RequiredNamespaces, Session};
use crate::transport::{ErrorReason, SessionProposal};

/// Build the granted namespaces for `address`.
///
/// A key that already names a chain (`eip155:1`) grants exactly that chain;
/// otherwise every chain the peer listed is granted. Methods and events are
/// copied as requested.
pub fn build_namespaces(required: &RequiredNamespaces, address: &Address) -> Namespaces {
    let address = address.to_checksum(None);
    required
        .iter()
        .map(|(key, ns)| {
            let chains: Vec<String> = if key.contains(':') {
                vec![key.clone()]
            } else {
                ns.chains.clone().unwrap_or_default()
            };
            let mut accounts: Vec<String> = Vec::with_capacity(chains.len());
            for chain in &chains {
                let account = format!("{chain}:{address}");
                if !accounts.contains(&account) {
                    accounts.push(account);
                }
            }
            (
                key.clone(),
                Namespace {
                    accounts,
                    chains: (!chains.is_empty()).then_some(chains),
                    methods: ns.methods.clone(),
                    events: ns.events.clone(),
                },
            )
        })
        .collect()
}

impl Broker {
    /// Grant or refuse an inbound proposal.
    ///
    /// Returns the new session's topic on approval.
    pub async fn on_proposal(&self, proposal: SessionProposal) -> Result<String, BrokerError> {
        tracing::info!(
            proposal_id = proposal.id,
            peer = %proposal.proposer.name,
            "Session proposal received"
        );

        let Some(address) = self.target.address().await else {
            let reason = "impersonation target is not a resolved address";
            tracing::warn!("Rejecting proposal {}: {}", proposal.id, reason);
            if let Err(e) = self
                .transport
                .reject_session(proposal.id, ErrorReason::user_rejected(reason))
                .await
            {
                tracing::warn!("Failed to reject proposal {}: {}", proposal.id, e);
            }
            self.notify(BrokerNotice::ProposalRejected {
                proposal_id: proposal.id,
                reason: reason.to_string(),
            });
            self.settle_connection_state().await;
            return Err(BrokerError::InvalidAddress {
                input: self.target.snapshot().await.display,
            });
        };

        let namespaces = build_namespaces(&proposal.required_namespaces, &address);
        let settled = match self
            .transport
            .approve_session(proposal.id, proposal.relay_protocol(), namespaces)
            .await
        {
            Ok(settled) => settled,
            Err(e) => {
                tracing::warn!("Approving proposal {} failed: {}", proposal.id, e);
                self.settle_connection_state().await;
                return Err(BrokerError::ApprovalFailed {
                    proposal_id: proposal.id,
                    reason: e.to_string(),
                });
            }
        };

        let topic = settled.topic.clone();
        let peer = settled.peer.name.clone();
        self.registry
            .insert(Session::from_settled(settled).activate())
            .await;
        self.set_connection(ConnectionState::Connected);
        tracing::info!(topic = %topic, peer = %peer, "Session approved");
        self.notify(BrokerNotice::SessionApproved {
            topic: topic.clone(),
            peer,
        });
        Ok(topic)
    }
}
