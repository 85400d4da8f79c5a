//! `impersonator doctor` - active health diagnostics.
//!
//! Validates configuration and pings the simulation backend and ENS
//! resolver so problems surface before a dApp is paired. Each check reports
//! pass/fail with actionable guidance on failures.

use std::time::Duration;

use crate::config::{Config, ResolverConfig, SimulationConfig};
use crate::settings::Settings;
use crate::target::TargetState;

/// Run diagnostic checks and print results.
pub async fn run_doctor_command(strict: bool) -> anyhow::Result<()> {
    println!("Impersonator Doctor");
    println!("===================\n");

    let mut passed = 0u32;
    let mut failed = 0u32;

    crate::bootstrap::load_impersonator_env();
    let settings_path = Settings::default_path();

    // ── Configuration checks ──────────────────────────────────

    check(
        "Settings file",
        check_settings_file(&settings_path),
        &mut passed,
        &mut failed,
    );

    let config = Config::from_settings(&Settings::load_from(&settings_path));
    let config = match config {
        Ok(config) => {
            check(
                "Configuration",
                CheckResult::Pass("env and settings resolve".to_string()),
                &mut passed,
                &mut failed,
            );
            config
        }
        Err(e) => {
            check(
                "Configuration",
                CheckResult::Fail(e.to_string()),
                &mut passed,
                &mut failed,
            );
            summarize(passed, failed, strict)?;
            return Ok(());
        }
    };

    check(
        "Chain selection",
        check_chain(config.target.chain_id),
        &mut passed,
        &mut failed,
    );

    // ── External service checks ───────────────────────────────

    check(
        "ENS resolver",
        check_resolver(&config.resolver).await,
        &mut passed,
        &mut failed,
    );

    check(
        "Impersonation target",
        check_target(&config).await,
        &mut passed,
        &mut failed,
    );

    check(
        "Simulation backend",
        check_simulation(&config.simulation).await,
        &mut passed,
        &mut failed,
    );

    check(
        "Session cache",
        check_session_cache(&crate::bootstrap::session_cache_path()),
        &mut passed,
        &mut failed,
    );

    summarize(passed, failed, strict)
}

fn summarize(passed: u32, failed: u32, strict: bool) -> anyhow::Result<()> {
    println!();
    println!("  {passed} passed, {failed} failed");

    if failed > 0 {
        println!("\n  Some checks failed. Fix them before pairing with a dApp.");
        if strict {
            anyhow::bail!("doctor strict mode failed with {failed} check(s)");
        }
    }

    Ok(())
}

// ── Individual checks ───────────────────────────────────────

fn check(name: &str, result: CheckResult, passed: &mut u32, failed: &mut u32) {
    match result {
        CheckResult::Pass(detail) => {
            *passed += 1;
            println!("  [pass] {name}: {detail}");
        }
        CheckResult::Fail(detail) => {
            *failed += 1;
            println!("  [FAIL] {name}: {detail}");
        }
        CheckResult::Skip(reason) => {
            println!("  [skip] {name}: {reason}");
        }
    }
}

enum CheckResult {
    Pass(String),
    Fail(String),
    Skip(String),
}

fn check_settings_file(path: &std::path::Path) -> CheckResult {
    match std::fs::read_to_string(path) {
        Ok(data) => match serde_json::from_str::<Settings>(&data) {
            Ok(_) => CheckResult::Pass(path.display().to_string()),
            Err(e) => CheckResult::Fail(format!(
                "{} is not valid settings JSON ({e}); defaults will be used",
                path.display()
            )),
        },
        Err(_) => CheckResult::Skip(format!("{} not found, using defaults", path.display())),
    }
}

fn check_chain(chain_id: u64) -> CheckResult {
    match crate::networks::by_chain_id(chain_id) {
        Some(network) => CheckResult::Pass(format!("{} ({})", network.name, chain_id)),
        None => CheckResult::Pass(format!(
            "chain {chain_id} (not in the primary network list)"
        )),
    }
}

async fn check_resolver(config: &ResolverConfig) -> CheckResult {
    match config.rpc_url {
        Some(ref url) => ping_json_rpc("Resolver RPC", url, config.timeout).await,
        None => CheckResult::Skip(
            "RESOLVER_RPC_URL not set; only literal addresses will resolve".to_string(),
        ),
    }
}

async fn check_target(config: &Config) -> CheckResult {
    if config.target.display.trim().is_empty() {
        return CheckResult::Fail(
            "no address set. Set IMPERSONATOR_ADDRESS or `impersonator settings set show_address <addr>`"
                .to_string(),
        );
    }
    let target = TargetState::new(config.target.display.clone(), config.target.chain_id);
    let resolver = config.resolver.build();
    match target.resolve_and_validate(resolver.as_ref()).await {
        Ok(address) => CheckResult::Pass(format!(
            "{} -> {}",
            config.target.display,
            address.to_checksum(None)
        )),
        Err(e) => CheckResult::Fail(e.to_string()),
    }
}

async fn check_simulation(config: &SimulationConfig) -> CheckResult {
    match config.endpoint() {
        Some(endpoint) => ping_json_rpc("Simulation backend", &endpoint, config.timeout).await,
        None => CheckResult::Skip(
            "no fork configured; transaction requests will be rejected. Set TENDERLY_FORK_ID"
                .to_string(),
        ),
    }
}

fn check_session_cache(path: &std::path::Path) -> CheckResult {
    match std::fs::read_to_string(path) {
        Ok(data) => match serde_json::from_str::<Vec<crate::session::SettledSession>>(&data) {
            Ok(sessions) => CheckResult::Pass(format!("{} cached session(s)", sessions.len())),
            Err(e) => CheckResult::Fail(format!("{} is corrupt: {e}", path.display())),
        },
        Err(_) => CheckResult::Skip("no cached sessions".to_string()),
    }
}

/// POST `eth_chainId` and expect a JSON-RPC result.
async fn ping_json_rpc(label: &str, endpoint: &str, timeout: Duration) -> CheckResult {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return CheckResult::Fail(format!("{label} endpoint is empty"));
    }

    let url = match reqwest::Url::parse(endpoint) {
        Ok(url) => url,
        Err(e) => {
            return CheckResult::Fail(format!(
                "{label} endpoint URL is invalid ({}): {e}",
                redact_url_for_display(endpoint)
            ));
        }
    };

    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => return CheckResult::Fail(format!("cannot construct HTTP client: {e}")),
    };

    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "eth_chainId",
        "params": [],
    });

    match client.post(url.clone()).json(&body).send().await {
        Ok(response) => {
            let status = response.status();
            if !status.is_success() {
                return CheckResult::Fail(format!(
                    "{label} reachable but unhealthy ({} at {})",
                    status,
                    redact_url_for_display(url.as_str())
                ));
            }
            match response.json::<serde_json::Value>().await {
                Ok(reply) => match reply.get("result").and_then(|v| v.as_str()) {
                    Some(chain) => CheckResult::Pass(format!(
                        "{} (chain {})",
                        redact_url_for_display(url.as_str()),
                        crate::audit::hex_to_decimal(chain).unwrap_or_else(|_| chain.to_string())
                    )),
                    None => CheckResult::Fail(format!("{label} returned no result: {reply}")),
                },
                Err(e) => CheckResult::Fail(format!("{label} returned invalid JSON: {e}")),
            }
        }
        Err(e) => CheckResult::Fail(format!(
            "{label} unreachable ({}): {e}",
            redact_url_for_display(url.as_str())
        )),
    }
}

fn redact_url_for_display(raw: &str) -> String {
    match reqwest::Url::parse(raw) {
        Ok(mut url) => {
            if !url.username().is_empty() {
                let _ = url.set_username("redacted");
            }
            if url.password().is_some() {
                let _ = url.set_password(Some("redacted"));
            }
            url.to_string()
        }
        Err(_) => "<invalid-url>".to_string(),
    }
}
