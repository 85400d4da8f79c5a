//! Session model shared by the broker components.
//!
//! Wire shapes follow the WalletConnect v2 sign protocol (camelCase JSON),
//! so the same structs are used for proposals, grants and the persisted
//! session cache.

mod registry;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use self::registry::SessionRegistry;

/// Descriptive metadata a peer advertises about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub icons: Vec<String>,
}

/// One namespace the peer requires in its proposal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredNamespace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chains: Option<Vec<String>>,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
}

pub type RequiredNamespaces = BTreeMap<String, RequiredNamespace>;

/// One namespace granted to the peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    /// `chain:address` pairs, ordered, no duplicates.
    pub accounts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chains: Option<Vec<String>>,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
}

pub type Namespaces = BTreeMap<String, Namespace>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Proposed,
    Active,
    Terminated,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Active => "active",
            Self::Terminated => "terminated",
        }
    }
}

/// A settled session as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettledSession {
    pub topic: String,
    pub peer: PeerMetadata,
    pub namespaces: Namespaces,
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(default = "default_relay_protocol")]
    pub relay_protocol: String,
    /// Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
}

pub(crate) fn default_relay_protocol() -> String {
    "irn".to_string()
}

/// A negotiated relationship with one peer, owned by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub topic: String,
    pub peer: PeerMetadata,
    pub namespaces: Namespaces,
    pub acknowledged: bool,
    pub state: SessionState,
    pub relay_protocol: String,
    pub expiry: Option<i64>,
}

impl Session {
    /// Build a session from a transport settlement, still in `Proposed`.
    pub fn from_settled(settled: SettledSession) -> Self {
        Self {
            topic: settled.topic,
            peer: settled.peer,
            namespaces: settled.namespaces,
            acknowledged: settled.acknowledged,
            state: SessionState::Proposed,
            relay_protocol: settled.relay_protocol,
            expiry: settled.expiry,
        }
    }

    pub fn activate(mut self) -> Self {
        self.state = SessionState::Active;
        self
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// All granted `chain:address` accounts across namespaces.
    pub fn accounts(&self) -> impl Iterator<Item = &str> {
        self.namespaces
            .values()
            .flat_map(|ns| ns.accounts.iter().map(String::as_str))
    }

    /// Address components of the granted accounts, lowercased and deduplicated.
    pub fn granted_addresses(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for account in self.accounts() {
            if let Some((_, address)) = account.rsplit_once(':') {
                let address = address.to_ascii_lowercase();
                if !out.contains(&address) {
                    out.push(address);
                }
            }
        }
        out
    }
}
