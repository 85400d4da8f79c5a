//! The single address being impersonated plus the selected chain.
//!
//! The operator edits the display text (an ENS name or hex address); the
//! resolved address is only set after [`TargetState::resolve_and_validate`]
//! succeeds. Changing the target never touches granted sessions; the broker
//! reissues grants only on an explicit refresh.

use alloy_primitives::Address;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::BrokerError;
use crate::networks::{self, DEFAULT_CHAIN_ID};
use crate::resolver::{AddressResolver, is_well_formed_address};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImpersonationTarget {
    /// What the operator typed; ENS names stay as entered.
    pub display: String,
    pub address: Option<Address>,
    pub chain_id: u64,
}

impl Default for ImpersonationTarget {
    fn default() -> Self {
        Self {
            display: String::new(),
            address: None,
            chain_id: DEFAULT_CHAIN_ID,
        }
    }
}

impl ImpersonationTarget {
    /// EIP-55 form of the resolved address, if any.
    pub fn checksummed(&self) -> Option<String> {
        self.address.map(|a| a.to_checksum(None))
    }

    pub fn chain_caip2(&self) -> String {
        networks::caip2(self.chain_id)
    }
}

#[derive(Debug, Default)]
pub struct TargetState {
    inner: RwLock<ImpersonationTarget>,
}

impl TargetState {
    pub fn new(display: impl Into<String>, chain_id: u64) -> Self {
        Self {
            inner: RwLock::new(ImpersonationTarget {
                display: display.into(),
                address: None,
                chain_id,
            }),
        }
    }

    pub async fn snapshot(&self) -> ImpersonationTarget {
        self.inner.read().await.clone()
    }

    /// Resolved address, if the current display text has been validated.
    pub async fn address(&self) -> Option<Address> {
        self.inner.read().await.address
    }

    pub async fn chain_id(&self) -> u64 {
        self.inner.read().await.chain_id
    }

    /// Replace the display text. Clears the previously resolved address.
    pub async fn set_display(&self, display: impl Into<String>) {
        let mut target = self.inner.write().await;
        target.display = display.into();
        target.address = None;
    }

    pub async fn set_chain(&self, chain_id: u64) {
        self.inner.write().await.chain_id = chain_id;
    }

    /// Resolve the display text and store the result.
    ///
    /// Resolution failures and transport errors from the resolver both leave
    /// the target unresolved and return `InvalidAddress`.
    pub async fn resolve_and_validate(
        &self,
        resolver: &dyn AddressResolver,
    ) -> Result<Address, BrokerError> {
        let input = self.inner.read().await.display.trim().to_string();
        if input.is_empty() {
            self.inner.write().await.address = None;
            return Err(BrokerError::InvalidAddress { input });
        }

        let resolved = match resolver.resolve(&input).await {
            Ok(Some(address)) => Some(address),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Address resolution for '{}' failed: {}", input, e);
                None
            }
        };

        let mut target = self.inner.write().await;
        // The display may have changed while the resolver was in flight.
        if target.display.trim() != input {
            return Err(BrokerError::InvalidAddress { input });
        }
        match resolved {
            Some(address) => {
                target.address = Some(address);
                tracing::info!(
                    display = %input,
                    address = %address.to_checksum(None),
                    "Impersonation target resolved"
                );
                Ok(address)
            }
            None => {
                target.address = None;
                if !is_well_formed_address(&input) {
                    tracing::debug!("'{}' is neither a known name nor an address", input);
                }
                Err(BrokerError::InvalidAddress { input })
            }
        }
    }
}
