//! User settings persistence.
//!
//! Stores operator preferences in ~/.impersonator/settings.json.
//! Settings are loaded with env var > settings.json > default priority.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::networks::{self, DEFAULT_CHAIN_ID};

/// Settings persisted to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Last-used Tenderly fork id.
    #[serde(default)]
    pub tenderly_fork_id: Option<String>,

    /// Last-entered address text (ENS name or hex address).
    #[serde(default)]
    pub show_address: Option<String>,

    /// Selected chain.
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    #[serde(default)]
    pub simulation: SimulationSettings,

    #[serde(default)]
    pub resolver: ResolverSettings,

    #[serde(default)]
    pub wallet: WalletSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tenderly_fork_id: None,
            show_address: None,
            chain_id: default_chain_id(),
            simulation: SimulationSettings::default(),
            resolver: ResolverSettings::default(),
            wallet: WalletSettings::default(),
        }
    }
}

/// Simulation backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Base URL the fork id is appended to.
    #[serde(default = "default_simulation_base_url")]
    pub base_url: String,

    /// Request timeout in milliseconds.
    #[serde(default = "default_simulation_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_simulation_base_url() -> String {
    "https://rpc.tenderly.co/fork".to_string()
}

fn default_simulation_timeout_ms() -> u64 {
    30_000
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            base_url: default_simulation_base_url(),
            timeout_ms: default_simulation_timeout_ms(),
        }
    }
}

/// ENS resolver settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverSettings {
    /// Mainnet JSON-RPC endpoint used for ENS lookups.
    #[serde(default)]
    pub rpc_url: Option<String>,

    #[serde(default = "default_resolver_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_resolver_timeout_ms() -> u64 {
    10_000
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            rpc_url: None,
            timeout_ms: default_resolver_timeout_ms(),
        }
    }
}

/// Metadata the broker presents to dApps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSettings {
    #[serde(default = "default_project_id")]
    pub project_id: String,
    #[serde(default = "default_wallet_name")]
    pub name: String,
    #[serde(default = "default_wallet_description")]
    pub description: String,
    #[serde(default = "default_wallet_url")]
    pub url: String,
    #[serde(default = "default_wallet_icon")]
    pub icon: String,
}

fn default_chain_id() -> u64 {
    DEFAULT_CHAIN_ID
}

fn default_project_id() -> String {
    "71a01028e78b592975e2c692d2061b35".to_string()
}

fn default_wallet_name() -> String {
    "React Wallet".to_string()
}

fn default_wallet_description() -> String {
    "Impersonator for WalletConnect".to_string()
}

fn default_wallet_url() -> String {
    "https://impersonator.pecorari.fr/".to_string()
}

fn default_wallet_icon() -> String {
    "https://avatars.githubusercontent.com/u/37784886".to_string()
}

impl Default for WalletSettings {
    fn default() -> Self {
        Self {
            project_id: default_project_id(),
            name: default_wallet_name(),
            description: default_wallet_description(),
            url: default_wallet_url(),
            icon: default_wallet_icon(),
        }
    }
}

/// `null` and the empty string both clear an optional setting.
fn decode_optional_setting_string(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl Settings {
    /// Get the default settings file path (~/.impersonator/settings.json).
    pub fn default_path() -> PathBuf {
        crate::bootstrap::impersonator_dir().join("settings.json")
    }

    /// Load settings from disk, returning default if not found.
    pub fn load() -> Self {
        Self::load_from(&Self::default_path())
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::warn!(
                        "Ignoring unreadable settings at {}: {}",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) -> std::io::Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Write settings as pretty JSON, creating parent directories.
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Get a setting value by dotted path (e.g., "simulation.timeout_ms").
    pub fn get(&self, path: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;

        for part in path.split('.') {
            current = current.get(part)?;
        }

        match current {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            serde_json::Value::Null => Some("null".to_string()),
            other => Some(other.to_string()),
        }
    }

    /// Set a setting value by dotted path.
    ///
    /// Returns error if path is invalid or value cannot be parsed.
    pub fn set(&mut self, path: &str, value: &str) -> Result<(), String> {
        if path == "chain_id" {
            let chain_id = networks::parse_chain(value).ok_or_else(|| {
                format!(
                    "Invalid chain_id '{}'. Expected a chain id, 'eip155:<id>', or a network name",
                    value
                )
            })?;
            self.chain_id = chain_id;
            return Ok(());
        }

        if path == "resolver.rpc_url" || path == "simulation.base_url" {
            let endpoint = decode_optional_setting_string(value);
            if let Some(ref endpoint) = endpoint {
                let parsed = url::Url::parse(endpoint)
                    .map_err(|e| format!("Invalid {}: {}", path, e))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(format!("Invalid {}: expected an http(s) URL", path));
                }
            }
            match (path, endpoint) {
                ("resolver.rpc_url", endpoint) => self.resolver.rpc_url = endpoint,
                (_, Some(endpoint)) => self.simulation.base_url = endpoint,
                (_, None) => self.simulation.base_url = default_simulation_base_url(),
            }
            return Ok(());
        }

        let mut json = serde_json::to_value(&self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        let parts: Vec<&str> = path.split('.').collect();
        let Some((final_key, parents)) = parts.split_last() else {
            return Err("Empty path".to_string());
        };

        // Navigate to parent and set the final key
        let mut current = &mut json;
        for part in parents {
            current = current
                .get_mut(*part)
                .ok_or_else(|| format!("Path not found: {}", path))?;
        }

        let obj = current
            .as_object_mut()
            .ok_or_else(|| format!("Parent is not an object: {}", path))?;

        let existing = obj
            .get(*final_key)
            .ok_or_else(|| format!("Unknown setting: {}", path))?;

        // Infer the type from the existing value
        let new_value = match existing {
            serde_json::Value::Bool(_) => {
                let b = value
                    .parse::<bool>()
                    .map_err(|_| format!("Expected boolean for {}, got '{}'", path, value))?;
                serde_json::Value::Bool(b)
            }
            serde_json::Value::Number(_) => {
                let n = value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| format!("Expected integer for {}, got '{}'", path, value))?;
                serde_json::Value::Number(n.into())
            }
            // Optional strings: a bare value is always taken as text.
            serde_json::Value::Null | serde_json::Value::String(_) => {
                match decode_optional_setting_string(value) {
                    Some(text) => serde_json::Value::String(text),
                    None if Self::default().get(path).as_deref() == Some("null") => {
                        serde_json::Value::Null
                    }
                    None => return Err(format!("{} cannot be empty", path)),
                }
            }
            _ => return Err(format!("{} cannot be set directly", path)),
        };

        obj.insert((*final_key).to_string(), new_value);

        // Deserialize back to Settings
        *self =
            serde_json::from_value(json).map_err(|e| format!("Failed to apply setting: {}", e))?;

        Ok(())
    }

    /// Reset a setting to its default value.
    pub fn reset(&mut self, path: &str) -> Result<(), String> {
        let default = Self::default();
        let default_value = default
            .get(path)
            .ok_or_else(|| format!("Unknown setting: {}", path))?;

        self.set(path, &default_value)
    }

    /// List all settings as (path, value) pairs.
    pub fn list(&self) -> Vec<(String, String)> {
        let json = match serde_json::to_value(self) {
            Ok(v) => v,
            Err(_) => return Vec::new(),
        };

        let mut results = Vec::new();
        collect_settings(&json, String::new(), &mut results);
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }
}

/// Recursively collect settings paths and values.
fn collect_settings(
    value: &serde_json::Value,
    prefix: String,
    results: &mut Vec<(String, String)>,
) {
    match value {
        serde_json::Value::Object(obj) => {
            for (key, val) in obj {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                collect_settings(val, path, results);
            }
        }
        serde_json::Value::String(s) => {
            results.push((prefix, s.clone()));
        }
        serde_json::Value::Null => {
            results.push((prefix, "null".to_string()));
        }
        other => {
            results.push((prefix, other.to_string()));
        }
    }
}
