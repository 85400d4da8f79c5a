use std::sync::Arc;

use chrono::Utc;

use crate::broker::{Broker, ConnectionState};
use crate::error::BrokerError;
use crate::transport::PairingUri;

impl Broker {
    /// Pair with a dApp from a `wc:` invitation.
    ///
    /// The invitation is single-use, so both the URI and the impersonation
    /// target are checked before the transport is touched. On success the
    /// broker waits in [`ConnectionState::Pairing`] for the peer's proposal.
    pub async fn pair(self: &Arc<Self>, raw_uri: &str) -> Result<(), BrokerError> {
        let uri = PairingUri::parse(raw_uri).map_err(|e| BrokerError::PairingFailed {
            reason: e.to_string(),
        })?;
        if uri.is_expired(Utc::now().timestamp()) {
            return Err(BrokerError::PairingFailed {
                reason: "pairing URI has expired".to_string(),
            });
        }

        let address = self.target.resolve_and_validate(self.resolver.as_ref()).await?;

        self.attach_events();
        self.set_connection(ConnectionState::Pairing);
        tracing::info!(
            topic = %uri.topic,
            address = %address.to_checksum(None),
            "Pairing with dApp"
        );

        if let Err(e) = self.transport.pair(&uri).await {
            tracing::warn!("Pairing on {} failed: {}", uri.topic, e);
            self.settle_connection_state().await;
            return Err(BrokerError::PairingFailed {
                reason: e.to_string(),
            });
        }
        Ok(())
    }

    /// Connected while any session is open, idle otherwise.
    pub(crate) async fn settle_connection_state(&self) {
        if self.registry.is_empty().await {
            self.set_connection(ConnectionState::Idle);
        } else {
            self.set_connection(ConnectionState::Connected);
        }
    }
}
