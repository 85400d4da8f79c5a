//! End-to-end tests for the broker over the loopback relay.
//!
//! A scripted dApp pairs, proposes and sends requests through
//! `LoopbackTransport`; the broker runs its real event loop. The Tenderly
//! tests start an Axum JSON-RPC stub on a random port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use impersonator::broker::{Broker, BrokerNotice, ConnectionState, TerminatedBy};
use impersonator::error::{BrokerError, GatewayError, RpcError};
use impersonator::resolver::StaticResolver;
use impersonator::session::{PeerMetadata, RequiredNamespace, RequiredNamespaces};
use impersonator::simulation::{SimulationGateway, TenderlyGateway};
use impersonator::transport::{LoopbackTransport, RpcOutcome};

const TARGET: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
const OTHER: &str = "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359";
const TIMEOUT: Duration = Duration::from_secs(5);

fn pairing_uri() -> String {
    "wc:7f6e504bfad60b485450578e05678ed3e8e8c4751d3c6160be17160d63ec90f9@2?relay-protocol=irn&symKey=587d5484ce2a2a6ee3ba1962fdd7e8588e06200c46823bd18fbd67def96ad303".to_string()
}

fn dapp() -> PeerMetadata {
    PeerMetadata {
        name: "Swap".to_string(),
        description: "Token swap".to_string(),
        url: "https://swap.example".to_string(),
        icons: vec![],
    }
}

fn eip155(chains: &[&str]) -> RequiredNamespaces {
    let mut required = RequiredNamespaces::new();
    required.insert(
        "eip155".to_string(),
        RequiredNamespace {
            chains: Some(chains.iter().map(|c| c.to_string()).collect()),
            methods: vec!["eth_sendTransaction".to_string(), "personal_sign".to_string()],
            events: vec!["chainChanged".to_string(), "accountsChanged".to_string()],
        },
    );
    required
}

fn send_tx_params() -> Value {
    json!([{
        "from": TARGET,
        "to": "0x1111111111111111111111111111111111111111",
        "data": "0x",
        "value": "0x1",
    }])
}

/// Gateway answering every call with a fixed reply after `delay`.
struct FakeGateway {
    reply: Result<Value, RpcError>,
    delay: Duration,
    calls: Mutex<Vec<u64>>,
}

impl FakeGateway {
    fn new(reply: Result<Value, RpcError>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply,
            delay,
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl SimulationGateway for FakeGateway {
    async fn submit(&self, id: u64, _method: &str, _params: &Value) -> Result<Value, GatewayError> {
        self.calls.lock().await.push(id);
        tokio::time::sleep(self.delay).await;
        self.reply.clone().map_err(GatewayError::Rpc)
    }

    fn endpoint(&self) -> &str {
        "fake://gateway"
    }
}

fn new_broker(
    display: &str,
    gateway: Option<Arc<dyn SimulationGateway>>,
) -> (Arc<LoopbackTransport>, Arc<Broker>) {
    let transport = Arc::new(LoopbackTransport::new(PeerMetadata::default()));
    let mut broker =
        Broker::new(transport.clone(), Arc::new(StaticResolver::new())).with_target(display, 1);
    if let Some(gateway) = gateway {
        broker = broker.with_gateway(gateway);
    }
    (transport, Arc::new(broker))
}

/// Pair, let the dApp propose `chains`, and return the newly settled topic.
async fn connect(transport: &LoopbackTransport, broker: &Arc<Broker>, chains: &[&str]) -> String {
    let before: Vec<String> = transport
        .wait_for_sessions(0, TIMEOUT)
        .await
        .into_iter()
        .map(|s| s.topic)
        .collect();
    transport.peer_queue_proposal(dapp(), eip155(chains)).await;
    broker.pair(&pairing_uri()).await.expect("pairing succeeds");
    let sessions = transport.wait_for_sessions(before.len() + 1, TIMEOUT).await;
    let Some(topic) = sessions
        .into_iter()
        .map(|s| s.topic)
        .find(|t| !before.contains(t))
    else {
        panic!("session was not approved in time");
    };
    for _ in 0..200 {
        if broker.registry().contains(&topic).await {
            return topic;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session {topic} never reached the registry");
}

#[tokio::test]
async fn approval_grants_target_on_every_requested_chain() {
    let (transport, broker) = new_broker(TARGET, None);
    let topic = connect(&transport, &broker, &["eip155:1", "eip155:137"]).await;

    let session = broker.registry().get(&topic).await.unwrap();
    assert_eq!(
        session.namespaces["eip155"].accounts,
        vec![format!("eip155:1:{TARGET}"), format!("eip155:137:{TARGET}")]
    );
    assert_eq!(broker.connection_state(), ConnectionState::Connected);
}

#[tokio::test]
async fn transaction_without_backend_is_recorded_and_rejected() {
    let (transport, broker) = new_broker(TARGET, None);
    let topic = connect(&transport, &broker, &["eip155:1"]).await;

    transport.peer_request(&topic, 7, "eth_sendTransaction", send_tx_params());
    let response = transport
        .wait_for_response(&topic, 7, TIMEOUT)
        .await
        .expect("response");

    match response.outcome {
        RpcOutcome::Error(err) => assert_eq!(err.code, RpcError::UNSUPPORTED_METHOD),
        other => panic!("expected error, got {other:?}"),
    }
    let record = broker.audit().get(7).await.expect("audit record");
    assert_eq!(record.value, "1");
    assert_eq!(record.from, TARGET);
}

#[tokio::test]
async fn transaction_result_is_relayed_from_backend() {
    let gateway = FakeGateway::new(Ok(json!("0xHASH")), Duration::ZERO);
    let (transport, broker) = new_broker(TARGET, Some(gateway.clone()));
    let topic = connect(&transport, &broker, &["eip155:1"]).await;
    let mut notices = broker.subscribe_notices();

    transport.peer_request(&topic, 7, "eth_sendTransaction", send_tx_params());
    let response = transport.wait_for_response(&topic, 7, TIMEOUT).await.unwrap();

    assert_eq!(response.id, 7);
    assert_eq!(response.outcome, RpcOutcome::Result(json!("0xHASH")));
    assert_eq!(*gateway.calls.lock().await, vec![7]);

    let notice = tokio::time::timeout(TIMEOUT, notices.recv()).await.unwrap().unwrap();
    assert!(matches!(
        notice,
        BrokerNotice::RequestCompleted { id: 7, tx_hash: Some(ref h), .. } if h == "0xHASH"
    ));
}

#[tokio::test]
async fn signing_requests_never_reach_the_backend() {
    let gateway = FakeGateway::new(Ok(json!("0xHASH")), Duration::ZERO);
    let (transport, broker) = new_broker(TARGET, Some(gateway.clone()));
    let topic = connect(&transport, &broker, &["eip155:1"]).await;

    transport.peer_request(&topic, 3, "personal_sign", json!(["0xdeadbeef", TARGET]));
    let response = transport.wait_for_response(&topic, 3, TIMEOUT).await.unwrap();

    assert!(response.is_error());
    assert!(gateway.calls.lock().await.is_empty());
    assert!(broker.audit().is_empty().await);
}

#[tokio::test]
async fn duplicate_delivery_is_answered_once() {
    let gateway = FakeGateway::new(Ok(json!("0xHASH")), Duration::from_millis(100));
    let (transport, broker) = new_broker(TARGET, Some(gateway.clone()));
    let topic = connect(&transport, &broker, &["eip155:1"]).await;

    transport.peer_request(&topic, 9, "eth_sendTransaction", send_tx_params());
    transport.peer_request(&topic, 9, "eth_sendTransaction", send_tx_params());
    transport.wait_for_response(&topic, 9, TIMEOUT).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(transport.responses_for(&topic, 9).await.len(), 1);
    assert_eq!(gateway.calls.lock().await.len(), 1);
    assert_eq!(broker.audit().len().await, 1);
}

#[tokio::test]
async fn slow_backend_does_not_hold_up_other_sessions() {
    let gateway = FakeGateway::new(Ok(json!("0xHASH")), Duration::from_millis(500));
    let (transport, broker) = new_broker(TARGET, Some(gateway.clone()));
    let slow = connect(&transport, &broker, &["eip155:1"]).await;
    let fast = connect(&transport, &broker, &["eip155:1"]).await;
    assert_ne!(slow, fast);

    transport.peer_request(&slow, 1, "eth_sendTransaction", send_tx_params());
    for _ in 0..200 {
        if !gateway.calls.lock().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    transport.peer_request(&fast, 2, "personal_sign", json!(["0x68656c6c6f", TARGET]));

    let answered = transport
        .wait_for_response(&fast, 2, Duration::from_millis(300))
        .await
        .expect("the signing request is answered while the transaction is in flight");
    match answered.outcome {
        RpcOutcome::Error(e) => assert_eq!(e.code, RpcError::UNSUPPORTED_METHOD),
        other => panic!("expected a rejection, got {other:?}"),
    }
    assert!(transport.responses_for(&slow, 1).await.is_empty());

    let relayed = transport.wait_for_response(&slow, 1, TIMEOUT).await.unwrap();
    assert_eq!(relayed.outcome, RpcOutcome::Result(json!("0xHASH")));
    assert_eq!(gateway.calls.lock().await.as_slice(), &[1]);
}

#[tokio::test]
async fn peer_delete_during_inflight_request_drops_the_session() {
    let gateway = FakeGateway::new(Ok(json!("0xHASH")), Duration::from_millis(200));
    let (transport, broker) = new_broker(TARGET, Some(gateway.clone()));
    let topic = connect(&transport, &broker, &["eip155:1"]).await;
    let mut notices = broker.subscribe_notices();

    transport.peer_request(&topic, 11, "eth_sendTransaction", send_tx_params());
    for _ in 0..200 {
        if !gateway.calls.lock().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    transport.peer_delete(&topic).await;

    let notice = tokio::time::timeout(TIMEOUT, notices.recv()).await.unwrap().unwrap();
    assert_eq!(
        notice,
        BrokerNotice::SessionTerminated {
            topic: topic.clone(),
            by: TerminatedBy::Peer,
        }
    );
    assert!(!broker.registry().contains(&topic).await);

    // The late backend answer has nowhere to go.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(transport.responses_for(&topic, 11).await.is_empty());
    assert_eq!(broker.connection_state(), ConnectionState::Idle);
}

#[tokio::test]
async fn invalid_address_blocks_pairing() {
    let (transport, broker) = new_broker("not-an-address", None);
    let err = broker.pair(&pairing_uri()).await.unwrap_err();

    assert!(matches!(err, BrokerError::InvalidAddress { .. }));
    assert_eq!(transport.pair_count().await, 0);
    assert_eq!(broker.connection_state(), ConnectionState::Idle);
}

#[tokio::test]
async fn failed_approval_leaves_no_session_behind() {
    let (transport, broker) = new_broker(TARGET, None);
    transport.fail_next_approval("relay unreachable").await;
    transport.peer_queue_proposal(dapp(), eip155(&["eip155:1"])).await;
    broker.pair(&pairing_uri()).await.unwrap();

    let mut state = broker.watch_connection();
    tokio::time::timeout(TIMEOUT, state.wait_for(|s| *s == ConnectionState::Idle))
        .await
        .unwrap()
        .unwrap();

    assert!(broker.registry().is_empty().await);
    assert!(transport.wait_for_sessions(1, Duration::from_millis(50)).await.is_empty());
}

#[tokio::test]
async fn sessions_survive_restart_and_follow_address_changes() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("sessions.json");

    let first = Arc::new(LoopbackTransport::new(PeerMetadata::default()).with_session_cache(&cache));
    let broker = Arc::new(
        Broker::new(first.clone(), Arc::new(StaticResolver::new())).with_target(TARGET, 1),
    );
    let topic = connect(&first, &broker, &["eip155:1"]).await;
    drop(broker);

    let second =
        Arc::new(LoopbackTransport::new(PeerMetadata::default()).with_session_cache(&cache));
    let restarted = Arc::new(
        Broker::new(second.clone(), Arc::new(StaticResolver::new())).with_target(OTHER, 1),
    );
    assert_eq!(restarted.restore_sessions().await.unwrap(), 1);
    assert!(restarted.registry().contains(&topic).await);
    assert_eq!(restarted.connection_state(), ConnectionState::Connected);

    assert_eq!(restarted.refresh_sessions().await.unwrap(), 1);
    let updates = second.updates().await;
    assert_eq!(updates.len(), 1);
    assert_eq!(
        updates[0].1["eip155"].accounts,
        vec![format!("eip155:1:{OTHER}")]
    );
}

// ── Tenderly gateway against a stub fork ───────────────────────

fn is_bind_permission_error<E: std::fmt::Display>(err: &E) -> bool {
    err.to_string().contains("Operation not permitted")
        || err.to_string().contains("failed to bind")
}

async fn start_fork_stub() -> Option<SocketAddr> {
    async fn ok(Json(body): Json<Value>) -> Json<Value> {
        Json(json!({ "jsonrpc": "2.0", "id": body["id"], "result": "0xfeed" }))
    }

    async fn reverted(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "jsonrpc": "2.0",
                "id": body["id"],
                "error": { "code": -32000, "message": "execution reverted" },
            })),
        )
    }

    let app = Router::new()
        .route("/fork/ok", post(ok))
        .route("/fork/reverted", post(reverted));

    let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(e) if is_bind_permission_error(&e) => return None,
        Err(e) => panic!("failed to bind stub fork: {e}"),
    };
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Some(addr)
}

#[tokio::test]
async fn tenderly_fork_result_reaches_the_dapp() {
    let Some(addr) = start_fork_stub().await else {
        eprintln!("skipping: cannot bind a local port");
        return;
    };
    let gateway = Arc::new(TenderlyGateway::new(
        &format!("http://{addr}/fork"),
        "ok",
        TIMEOUT,
    ));
    let (transport, broker) = new_broker(TARGET, Some(gateway));
    let topic = connect(&transport, &broker, &["eip155:1"]).await;

    transport.peer_request(&topic, 21, "eth_sendTransaction", send_tx_params());
    let response = transport.wait_for_response(&topic, 21, TIMEOUT).await.unwrap();

    assert_eq!(response.outcome, RpcOutcome::Result(json!("0xfeed")));
}

#[tokio::test]
async fn tenderly_fork_error_is_passed_through() {
    let Some(addr) = start_fork_stub().await else {
        eprintln!("skipping: cannot bind a local port");
        return;
    };
    let gateway = TenderlyGateway::new(&format!("http://{addr}/fork"), "reverted", TIMEOUT);

    let err = gateway
        .submit(5, "eth_sendTransaction", &send_tx_params())
        .await
        .unwrap_err();

    assert_eq!(err.to_rpc_error(), RpcError::new(-32000, "execution reverted"));
}
