//! Inbound request handling.
//!
//! Per request: `Received -> Classified -> Forwarded -> Resolved | Rejected`,
//! or straight to `Rejected` for anything not in the forwarding table.
//! Exactly one response is attempted per `(topic, id)`.

use crate::audit::{TransactionFields, TransactionRecord};
use crate::broker::{Broker, BrokerNotice, RequestStatus};
use crate::error::{BrokerError, RpcError};
use crate::transport::{RpcResponse, SessionRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodClass {
    /// Replayed on the simulation backend.
    Forward,
    Reject,
}

/// Methods with an explicit classification. Anything else is rejected.
pub const METHOD_TABLE: &[(&str, MethodClass)] = &[
    ("eth_sendTransaction", MethodClass::Forward),
    ("eth_signTransaction", MethodClass::Reject),
    ("eth_sendRawTransaction", MethodClass::Reject),
    ("eth_sign", MethodClass::Reject),
    ("personal_sign", MethodClass::Reject),
    ("eth_signTypedData", MethodClass::Reject),
    ("eth_signTypedData_v3", MethodClass::Reject),
    ("eth_signTypedData_v4", MethodClass::Reject),
    ("wallet_switchEthereumChain", MethodClass::Reject),
    ("wallet_addEthereumChain", MethodClass::Reject),
    ("wallet_watchAsset", MethodClass::Reject),
];

pub fn classify(method: &str) -> MethodClass {
    METHOD_TABLE
        .iter()
        .find(|(name, _)| *name == method)
        .map(|(_, class)| *class)
        .unwrap_or(MethodClass::Reject)
}

impl Broker {
    /// Handle one inbound request. Returns the terminal status, or `None`
    /// when a duplicate delivery was dropped.
    pub async fn on_request(&self, request: SessionRequest) -> Option<RequestStatus> {
        if !self.registry.contains(&request.topic).await {
            return Some(self.refuse_unknown_session(&request).await);
        }
        if !self.pending.begin(&request).await {
            tracing::debug!(
                topic = %request.topic,
                id = request.id,
                "Dropping duplicate delivery"
            );
            return None;
        }
        // A peer delete may have landed between the lookup and `begin`.
        if !self.registry.contains(&request.topic).await {
            self.pending.forget_topic(&request.topic).await;
            return Some(self.refuse_unknown_session(&request).await);
        }
        tracing::debug!(
            topic = %request.topic,
            id = request.id,
            method = %request.method,
            "Request received"
        );

        let status = match classify(&request.method) {
            MethodClass::Reject => {
                let unsupported = BrokerError::UnsupportedMethod {
                    method: request.method.clone(),
                };
                tracing::info!("{} (request {})", unsupported, request.id);
                self.refuse(&request, RpcError::unsupported_method(&request.method))
                    .await
            }
            MethodClass::Forward => self.forward(&request).await,
        };
        Some(status)
    }

    async fn forward(&self, request: &SessionRequest) -> RequestStatus {
        let fields = match TransactionFields::from_params(&request.params) {
            Ok(fields) => fields,
            Err(reason) => {
                tracing::warn!(
                    "Malformed {} params (request {}): {}",
                    request.method,
                    request.id,
                    reason
                );
                return self
                    .refuse(request, RpcError::new(RpcError::INVALID_PARAMS, reason))
                    .await;
            }
        };
        // Recorded before the target and backend checks so the log shows
        // intent even when the request cannot be forwarded.
        match TransactionRecord::from_fields(request.id, &fields) {
            Ok(record) => {
                if !self.audit.record(record).await {
                    tracing::debug!("Transaction {} already in the audit log", request.id);
                }
            }
            Err(reason) => tracing::warn!("Could not build audit record: {}", reason),
        }

        if self.target.address().await.is_none() {
            return self
                .refuse(
                    request,
                    RpcError::new(RpcError::UNAUTHORIZED, "no impersonated address is set"),
                )
                .await;
        }

        let Some(gateway) = self.gateway().await else {
            tracing::info!(
                "{}; rejecting {} (request {})",
                BrokerError::BackendUnavailable,
                request.method,
                request.id
            );
            let error = RpcError::unsupported_method(&request.method);
            self.reject(request, error.clone()).await;
            self.notify_completed(request, None, Some(error));
            return RequestStatus::Rejected;
        };

        self.pending
            .advance(&request.topic, request.id, RequestStatus::Forwarded)
            .await;
        tracing::info!(
            "Forwarding {} (request {}) to {}",
            request.method,
            request.id,
            gateway.endpoint()
        );

        match gateway
            .submit(request.id, &request.method, &request.params)
            .await
        {
            Ok(result) => {
                let tx_hash = result.as_str().map(String::from);
                self.respond(request, RpcResponse::result(request.id, result))
                    .await;
                self.pending
                    .advance(&request.topic, request.id, RequestStatus::Resolved)
                    .await;
                tracing::info!(
                    "Simulated {} (request {}): {}",
                    request.method,
                    request.id,
                    tx_hash.as_deref().unwrap_or("no hash")
                );
                self.notify_completed(request, tx_hash, None);
                RequestStatus::Resolved
            }
            Err(e) => {
                let error = e.to_rpc_error();
                tracing::warn!("{} (request {})", BrokerError::BackendError(e), request.id);
                self.reject(request, error.clone()).await;
                self.notify_completed(request, None, Some(error));
                RequestStatus::Rejected
            }
        }
    }

    /// Best-effort rejection for a topic the registry does not hold. No
    /// correlation entry is kept, so a later restore can still serve a retry.
    async fn refuse_unknown_session(&self, request: &SessionRequest) -> RequestStatus {
        tracing::warn!(
            topic = %request.topic,
            id = request.id,
            "Request for unknown session"
        );
        let error = RpcError::new(
            RpcError::UNAUTHORIZED,
            format!("unknown session {}", request.topic),
        );
        self.respond(request, RpcResponse::error(request.id, error.clone()))
            .await;
        self.notify(BrokerNotice::RequestRejected {
            topic: request.topic.clone(),
            id: request.id,
            method: request.method.clone(),
            error,
        });
        RequestStatus::Rejected
    }

    /// Reject before the forwarding path and tell the operator.
    async fn refuse(&self, request: &SessionRequest, error: RpcError) -> RequestStatus {
        self.reject(request, error.clone()).await;
        self.notify(BrokerNotice::RequestRejected {
            topic: request.topic.clone(),
            id: request.id,
            method: request.method.clone(),
            error,
        });
        RequestStatus::Rejected
    }

    async fn reject(&self, request: &SessionRequest, error: RpcError) {
        self.respond(request, RpcResponse::error(request.id, error))
            .await;
        self.pending
            .advance(&request.topic, request.id, RequestStatus::Rejected)
            .await;
    }

    /// Send the response; delivery failures are logged, never retried.
    async fn respond(&self, request: &SessionRequest, response: RpcResponse) {
        if let Err(e) = self.transport.respond(&request.topic, response).await {
            tracing::warn!(
                topic = %request.topic,
                id = request.id,
                "Response delivery failed: {}",
                e
            );
        }
    }

    fn notify_completed(
        &self,
        request: &SessionRequest,
        tx_hash: Option<String>,
        error: Option<RpcError>,
    ) {
        self.notify(BrokerNotice::RequestCompleted {
            topic: request.topic.clone(),
            id: request.id,
            method: request.method.clone(),
            tx_hash,
            error,
        });
    }
}
