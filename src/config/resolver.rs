use std::sync::Arc;
use std::time::Duration;

use crate::config::helpers::{optional_env, parse_optional_env, validate_http_url};
use crate::error::ConfigError;
use crate::resolver::{AddressResolver, EnsResolver, StaticResolver};
use crate::settings::Settings;

/// ENS resolution endpoint. Without one only literal addresses resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    pub rpc_url: Option<String>,
    pub timeout: Duration,
}

impl ResolverConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let rpc_url = optional_env("RESOLVER_RPC_URL")?.or_else(|| settings.resolver.rpc_url.clone());
        if let Some(ref url) = rpc_url {
            validate_http_url("RESOLVER_RPC_URL", url)?;
        }

        let timeout_ms = parse_optional_env::<u64>("RESOLVER_TIMEOUT_MS", "a positive integer")?
            .unwrap_or(settings.resolver.timeout_ms);
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RESOLVER_TIMEOUT_MS".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        Ok(Self {
            rpc_url,
            timeout: Duration::from_millis(timeout_ms),
        })
    }

    pub fn build(&self) -> Arc<dyn AddressResolver> {
        match self.rpc_url {
            Some(ref url) => Arc::new(EnsResolver::new(url.clone(), self.timeout)),
            None => Arc::new(StaticResolver::new()),
        }
    }
}
