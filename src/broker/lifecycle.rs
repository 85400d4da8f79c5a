//! Session termination, acknowledgement, startup restore and grant refresh.

use std::sync::Arc;

use futures::future::join_all;

use crate::broker::{Broker, BrokerNotice, TerminatedBy};
use crate::error::BrokerError;
use crate::session::{Namespace, Namespaces, Session};
use crate::transport::ErrorReason;

impl Broker {
    /// The peer closed the session: drop it locally, then acknowledge.
    ///
    /// A failed acknowledgement is logged and otherwise ignored; the session
    /// is already gone from the registry.
    pub async fn on_session_delete(&self, topic: &str) {
        if self.forget_session(topic).await.is_none() {
            tracing::debug!("Delete for unknown session {}", topic);
            return;
        }
        tracing::info!(topic = %topic, "Session deleted by peer");
        self.notify(BrokerNotice::SessionTerminated {
            topic: topic.to_string(),
            by: TerminatedBy::Peer,
        });

        if let Err(e) = self
            .transport
            .disconnect_session(topic, ErrorReason::session_deleted())
            .await
        {
            let err = BrokerError::TerminationAcknowledgeFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            };
            tracing::warn!("{}", err);
        }
    }

    /// Operator-initiated disconnect. The session is removed locally even if
    /// the peer cannot be notified.
    pub async fn disconnect(&self, topic: &str) -> Result<(), BrokerError> {
        if !self.registry.contains(topic).await {
            return Err(BrokerError::SessionNotFound(topic.to_string()));
        }

        let notified = self
            .transport
            .disconnect_session(topic, ErrorReason::user_disconnected())
            .await;
        self.forget_session(topic).await;
        tracing::info!(topic = %topic, "Session disconnected by operator");
        self.notify(BrokerNotice::SessionTerminated {
            topic: topic.to_string(),
            by: TerminatedBy::Operator,
        });

        if let Err(e) = notified {
            let err = BrokerError::TerminationAcknowledgeFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            };
            tracing::warn!("{}", err);
        }
        Ok(())
    }

    /// Disconnect every open session.
    pub async fn disconnect_all(&self) -> usize {
        let topics = self.registry.topics().await;
        let mut closed = 0;
        for topic in topics {
            if self.disconnect(&topic).await.is_ok() {
                closed += 1;
            }
        }
        closed
    }

    /// Peer confirmed the grant.
    pub async fn on_acknowledged(&self, topic: &str) {
        if self.registry.mark_acknowledged(topic).await {
            tracing::debug!(topic = %topic, "Session acknowledged");
        } else {
            tracing::debug!("Acknowledgement for unknown session {}", topic);
        }
    }

    /// Adopt every session the transport still holds, as-is.
    ///
    /// Also attaches the event pump so restored sessions receive requests.
    pub async fn restore_sessions(self: &Arc<Self>) -> Result<usize, BrokerError> {
        let settled = self.transport.active_sessions().await.map_err(|e| {
            BrokerError::PairingFailed {
                reason: format!("could not list transport sessions: {e}"),
            }
        })?;
        let count = settled.len();
        for session in settled {
            tracing::debug!(topic = %session.topic, peer = %session.peer.name, "Restoring session");
            self.registry
                .insert(Session::from_settled(session).activate())
                .await;
        }
        self.attach_events();
        self.settle_connection_state().await;
        if count > 0 {
            tracing::info!("Restored {} session(s)", count);
        }
        Ok(count)
    }

    /// Reissue the grant of every open session for the current target.
    ///
    /// Each session keeps its negotiated chains; only the address changes.
    /// Returns how many sessions were updated.
    pub async fn refresh_sessions(&self) -> Result<usize, BrokerError> {
        let address = self
            .target
            .resolve_and_validate(self.resolver.as_ref())
            .await?;

        let sessions = self.registry.list().await;
        let updates = sessions.iter().map(|session| {
            let namespaces = regrant(&session.namespaces, &address.to_checksum(None));
            async move {
                let result = self
                    .transport
                    .update_session(&session.topic, namespaces.clone())
                    .await;
                (session.topic.clone(), namespaces, result)
            }
        });

        let mut updated = 0;
        for (topic, namespaces, result) in join_all(updates).await {
            match result {
                Ok(()) => {
                    if self.registry.replace_namespaces(&topic, namespaces).await {
                        updated += 1;
                        self.notify(BrokerNotice::SessionUpdated { topic });
                    }
                }
                Err(e) => tracing::warn!("Refreshing session {} failed: {}", topic, e),
            }
        }
        tracing::info!("Refreshed {} of {} session(s)", updated, sessions.len());
        Ok(updated)
    }

    async fn forget_session(&self, topic: &str) -> Option<Session> {
        let removed = self.registry.remove(topic).await;
        let dropped = self.pending.forget_topic(topic).await;
        if dropped > 0 {
            tracing::debug!("Dropped {} pending request(s) of {}", dropped, topic);
        }
        self.settle_connection_state().await;
        removed
    }
}

/// Rebind every account of `namespaces` to `address`, keeping chains.
fn regrant(namespaces: &Namespaces, address: &str) -> Namespaces {
    namespaces
        .iter()
        .map(|(key, ns)| {
            let chains: Vec<String> = match &ns.chains {
                Some(chains) => chains.clone(),
                None => ns
                    .accounts
                    .iter()
                    .filter_map(|account| account.rsplit_once(':').map(|(chain, _)| chain.to_string()))
                    .collect(),
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
                    chains: ns.chains.clone(),
                    methods: ns.methods.clone(),
                    events: ns.events.clone(),
                },
            )
        })
        .collect()
}
