//! `impersonator demo` - drive one full session against the loopback relay.
//!
//! Pairs a scripted dApp, lets it ask for a transaction and prints what the
//! broker answered plus the resulting audit log.

use std::sync::Arc;
use std::time::Duration;

use crate::broker::Broker;
use crate::config::Config;
use crate::networks::caip2;
use crate::session::{PeerMetadata, RequiredNamespace, RequiredNamespaces};
use crate::transport::LoopbackTransport;

const DEMO_TIMEOUT: Duration = Duration::from_secs(10);
const DEMO_REQUEST_ID: u64 = 1;

pub async fn run_demo_command(uri: Option<String>, address: Option<String>) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let transport = Arc::new(
        LoopbackTransport::new(config.wallet.metadata.clone())
            .with_session_cache(crate::bootstrap::session_cache_path()),
    );

    let display = address.unwrap_or_else(|| config.target.display.clone());
    let chain_id = config.target.chain_id;
    let mut broker = Broker::new(transport.clone(), config.resolver.build())
        .with_target(display.clone(), chain_id);
    match config.simulation.gateway() {
        Some(gateway) => broker = broker.with_gateway(gateway),
        None => println!("No simulation fork configured; the request will be rejected.\n"),
    }
    let broker = Arc::new(broker);

    let restored = broker.restore_sessions().await?;
    if restored > 0 {
        println!("Restored {restored} cached session(s)");
    }

    transport
        .peer_queue_proposal(demo_dapp(), demo_namespaces(chain_id))
        .await;

    let uri = uri.unwrap_or_else(generate_pairing_uri);
    println!(
        "Pairing {} as {display} on {}",
        transport.wallet_metadata().name,
        caip2(chain_id)
    );
    broker.pair(&uri).await?;

    let sessions = transport.wait_for_sessions(restored + 1, DEMO_TIMEOUT).await;
    let Some(session) = sessions
        .into_iter()
        .find(|s| s.peer.name == demo_dapp().name)
    else {
        anyhow::bail!("the demo dApp was not granted a session");
    };
    println!("Session {} approved", session.topic);
    for account in session.namespaces.values().flat_map(|ns| ns.accounts.iter()) {
        println!("  account {account}");
    }

    let from = broker
        .target()
        .snapshot()
        .await
        .checksummed()
        .unwrap_or_default();
    transport.peer_request(
        &session.topic,
        DEMO_REQUEST_ID,
        "eth_sendTransaction",
        serde_json::json!([{
            "from": from,
            "to": from,
            "data": "0x",
            "value": "0xde0b6b3a7640000",
        }]),
    );

    let Some(response) = transport
        .wait_for_response(&session.topic, DEMO_REQUEST_ID, DEMO_TIMEOUT)
        .await
    else {
        anyhow::bail!("no response to the demo transaction within {DEMO_TIMEOUT:?}");
    };
    println!("\nResponse:\n{}", serde_json::to_string_pretty(&response)?);
    println!(
        "\nAudit log:\n{}",
        serde_json::to_string_pretty(&broker.audit().list().await)?
    );

    let closed = broker.disconnect_all().await;
    println!("\nDisconnected {closed} session(s)");
    Ok(())
}

fn demo_dapp() -> PeerMetadata {
    PeerMetadata {
        name: "Demo dApp".to_string(),
        description: "Scripted peer for the impersonator demo".to_string(),
        url: "https://demo.invalid".to_string(),
        icons: vec![],
    }
}

fn demo_namespaces(chain_id: u64) -> RequiredNamespaces {
    let mut required = RequiredNamespaces::new();
    required.insert(
        "eip155".to_string(),
        RequiredNamespace {
            chains: Some(vec![caip2(chain_id)]),
            methods: vec![
                "eth_sendTransaction".to_string(),
                "personal_sign".to_string(),
            ],
            events: vec!["chainChanged".to_string(), "accountsChanged".to_string()],
        },
    );
    required
}

/// Fresh pairing invitation with a random topic and symmetric key.
fn generate_pairing_uri() -> String {
    let hex32 = || {
        format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        )
    };
    format!(
        "wc:{}@2?relay-protocol=irn&symKey={}",
        hex32(),
        hex32()
    )
}
