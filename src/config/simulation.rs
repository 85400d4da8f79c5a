use std::sync::Arc;
use std::time::Duration;

use crate::config::helpers::{optional_env, parse_optional_env, validate_http_url};
use crate::error::ConfigError;
use crate::settings::Settings;
use crate::simulation::{SimulationGateway, TenderlyGateway};

/// Simulation backend configuration.
///
/// With neither a fork id nor an explicit endpoint there is no gateway; that
/// is a valid configuration, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationConfig {
    pub fork_id: Option<String>,
    pub base_url: String,
    /// Full endpoint override; wins over `base_url/fork_id`.
    pub endpoint_override: Option<String>,
    pub timeout: Duration,
}

impl SimulationConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let fork_id = optional_env("TENDERLY_FORK_ID")?.or_else(|| settings.tenderly_fork_id.clone());

        let base_url = optional_env("SIMULATION_RPC_BASE_URL")?
            .unwrap_or_else(|| settings.simulation.base_url.clone());
        validate_http_url("SIMULATION_RPC_BASE_URL", &base_url)?;

        let endpoint_override = optional_env("SIMULATION_ENDPOINT")?;
        if let Some(ref endpoint) = endpoint_override {
            validate_http_url("SIMULATION_ENDPOINT", endpoint)?;
        }

        let timeout_ms = parse_optional_env::<u64>("SIMULATION_TIMEOUT_MS", "a positive integer")?
            .unwrap_or(settings.simulation.timeout_ms);
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SIMULATION_TIMEOUT_MS".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        Ok(Self {
            fork_id,
            base_url,
            endpoint_override,
            timeout: Duration::from_millis(timeout_ms),
        })
    }

    /// Endpoint requests are posted to, if any backend is configured.
    pub fn endpoint(&self) -> Option<String> {
        if let Some(ref endpoint) = self.endpoint_override {
            return Some(endpoint.clone());
        }
        self.fork_id
            .as_ref()
            .map(|fork| format!("{}/{}", self.base_url.trim_end_matches('/'), fork))
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint().is_some()
    }

    pub fn gateway(&self) -> Option<Arc<dyn SimulationGateway>> {
        let endpoint = self.endpoint()?;
        Some(Arc::new(TenderlyGateway::with_endpoint(endpoint, self.timeout)))
    }
}
