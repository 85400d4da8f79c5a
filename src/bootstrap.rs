//! Bootstrap paths and `.env` loading.
//!
//! Everything the broker persists lives under `~/.impersonator/`:
//! `settings.json`, the transport's `sessions.json` cache, and an optional
//! `.env` file read at startup.

use std::path::{Path, PathBuf};

/// Base directory: `~/.impersonator`.
pub fn impersonator_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".impersonator")
}

/// Path to the impersonator-specific `.env` file: `~/.impersonator/.env`.
pub fn impersonator_env_path() -> PathBuf {
    impersonator_dir().join(".env")
}

/// Transport session cache: `~/.impersonator/sessions.json`.
pub fn session_cache_path() -> PathBuf {
    impersonator_dir().join("sessions.json")
}

/// Load `./.env`, then `~/.impersonator/.env`.
///
/// dotenvy never overwrites existing vars, so the effective priority is:
///
///   explicit env vars > `./.env` > `~/.impersonator/.env`
pub fn load_impersonator_env() {
    let _ = dotenvy::dotenv();
    load_env_file(&impersonator_env_path());
}

/// Load one `.env` file if it exists. Returns true when it was read.
pub fn load_env_file(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }
    match dotenvy::from_path(path) {
        Ok(()) => {
            tracing::debug!("Loaded environment from {}", path.display());
            true
        }
        Err(e) => {
            tracing::warn!("Failed to read {}: {}", path.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn paths_live_under_the_impersonator_dir() {
        assert!(impersonator_env_path().ends_with(".impersonator/.env"));
        assert!(session_cache_path().ends_with(".impersonator/sessions.json"));
    }

    #[test]
    fn missing_env_file_is_skipped() {
        let dir = tempdir().unwrap();
        assert!(!load_env_file(&dir.path().join(".env")));
    }

    #[test]
    fn quoted_values_survive_dotenv_parsing() {
        let dir = tempdir().unwrap();
        let env_path = dir.path().join(".env");

        // A fork URL with a fragment must stay intact when quoted.
        let url = "https://rpc.tenderly.co/fork#section";
        std::fs::write(&env_path, format!("SIMULATION_ENDPOINT=\"{}\"\n", url)).unwrap();

        let parsed: Vec<(String, String)> = dotenvy::from_path_iter(&env_path)
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].0, "SIMULATION_ENDPOINT");
        assert_eq!(parsed[0].1, url);
    }
}
