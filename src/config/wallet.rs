use crate::config::helpers::optional_env;
use crate::error::ConfigError;
use crate::networks;
use crate::session::PeerMetadata;
use crate::settings::Settings;

/// The address to impersonate and the selected chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    /// ENS name or hex address as entered; may be empty.
    pub display: String,
    pub chain_id: u64,
}

impl TargetConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let display = optional_env("IMPERSONATOR_ADDRESS")?
            .or_else(|| settings.show_address.clone())
            .unwrap_or_default();

        let chain_id = match optional_env("IMPERSONATOR_CHAIN")? {
            Some(raw) => networks::parse_chain(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "IMPERSONATOR_CHAIN".to_string(),
                message: format!("expected a chain id, 'eip155:<id>', or a network name, got '{raw}'"),
            })?,
            None => settings.chain_id,
        };

        Ok(Self { display, chain_id })
    }
}

/// How the broker presents itself to dApps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletConfig {
    pub project_id: String,
    pub metadata: PeerMetadata,
}

impl WalletConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let project_id = optional_env("WALLETCONNECT_PROJECT_ID")?
            .unwrap_or_else(|| settings.wallet.project_id.clone());
        if !project_id.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(ConfigError::InvalidValue {
                key: "WALLETCONNECT_PROJECT_ID".to_string(),
                message: "must be alphanumeric".to_string(),
            });
        }

        let metadata = PeerMetadata {
            name: optional_env("WALLET_NAME")?.unwrap_or_else(|| settings.wallet.name.clone()),
            description: optional_env("WALLET_DESCRIPTION")?
                .unwrap_or_else(|| settings.wallet.description.clone()),
            url: optional_env("WALLET_URL")?.unwrap_or_else(|| settings.wallet.url.clone()),
            icons: vec![optional_env("WALLET_ICON")?.unwrap_or_else(|| settings.wallet.icon.clone())],
        };

        Ok(Self {
            project_id,
            metadata,
        })
    }
}
