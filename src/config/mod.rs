//! Configuration for the impersonator broker.
//!
//! Settings are loaded with priority: env var > settings.json > default.
//! `./.env` and `~/.impersonator/.env` are read first via dotenvy, so their
//! values behave like env vars.

pub(crate) mod helpers;
mod resolver;
mod simulation;
mod wallet;

use crate::error::ConfigError;
use crate::settings::Settings;

pub use self::resolver::ResolverConfig;
pub use self::simulation::SimulationConfig;
pub use self::wallet::{TargetConfig, WalletConfig};

/// Main configuration for the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub target: TargetConfig,
    pub simulation: SimulationConfig,
    pub resolver: ResolverConfig,
    pub wallet: WalletConfig,
}

impl Config {
    /// Load `.env` files and `~/.impersonator/settings.json`, then resolve.
    pub fn from_env() -> Result<Self, ConfigError> {
        crate::bootstrap::load_impersonator_env();
        Self::from_settings(&Settings::load())
    }

    /// Resolve against explicit settings; env vars still win.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            target: TargetConfig::resolve(settings)?,
            simulation: SimulationConfig::resolve(settings)?,
            resolver: ResolverConfig::resolve(settings)?,
            wallet: WalletConfig::resolve(settings)?,
        })
    }
}
