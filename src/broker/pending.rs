//! Correlation table for inbound requests.
//!
//! An entry is created when a request is first seen and never recreated,
//! so a redelivered `(topic, id)` is recognised and dropped. Terminal
//! entries live until their session goes away.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::transport::SessionRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Received,
    Forwarded,
    Resolved,
    Rejected,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Rejected)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingRequest {
    pub id: u64,
    pub session_topic: String,
    pub method: String,
    pub raw_params: serde_json::Value,
    pub status: RequestStatus,
}

#[derive(Debug, Default)]
pub struct PendingRequests {
    entries: Mutex<HashMap<(String, u64), PendingRequest>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request as `Received`. Returns false if `(topic, id)` was
    /// already seen, whatever its status.
    pub(crate) async fn begin(&self, request: &SessionRequest) -> bool {
        let mut entries = self.entries.lock().await;
        let key = (request.topic.clone(), request.id);
        if entries.contains_key(&key) {
            return false;
        }
        entries.insert(
            key,
            PendingRequest {
                id: request.id,
                session_topic: request.topic.clone(),
                method: request.method.clone(),
                raw_params: request.params.clone(),
                status: RequestStatus::Received,
            },
        );
        true
    }

    /// Move a request forward. Terminal states are final; returns false if
    /// the entry is unknown or already terminal.
    pub(crate) async fn advance(&self, topic: &str, id: u64, status: RequestStatus) -> bool {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(&(topic.to_string(), id)) {
            Some(entry) if !entry.status.is_terminal() => {
                entry.status = status;
                true
            }
            _ => false,
        }
    }

    /// Drop every entry of a closed session.
    pub(crate) async fn forget_topic(&self, topic: &str) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|(t, _), _| t != topic);
        before - entries.len()
    }

    pub async fn get(&self, topic: &str, id: u64) -> Option<PendingRequest> {
        self.entries
            .lock()
            .await
            .get(&(topic.to_string(), id))
            .cloned()
    }

    /// Requests that have not produced a response yet.
    pub async fn in_flight(&self) -> Vec<PendingRequest> {
        let mut out: Vec<_> = self
            .entries
            .lock()
            .await
            .values()
            .filter(|entry| !entry.status.is_terminal())
            .cloned()
            .collect();
        out.sort_by(|a, b| a.session_topic.cmp(&b.session_topic).then(a.id.cmp(&b.id)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(topic: &str, id: u64) -> SessionRequest {
        SessionRequest {
            topic: topic.to_string(),
            id,
            chain_id: None,
            method: "eth_sendTransaction".to_string(),
            params: serde_json::json!([]),
        }
    }

    #[tokio::test]
    async fn duplicate_delivery_is_refused() {
        let pending = PendingRequests::new();
        assert!(pending.begin(&request("a", 1)).await);
        assert!(!pending.begin(&request("a", 1)).await);
        // Same id on another session is a different request.
        assert!(pending.begin(&request("b", 1)).await);
    }

    #[tokio::test]
    async fn terminal_status_is_final() {
        let pending = PendingRequests::new();
        pending.begin(&request("a", 1)).await;
        assert!(pending.advance("a", 1, RequestStatus::Forwarded).await);
        assert!(pending.advance("a", 1, RequestStatus::Resolved).await);
        assert!(!pending.advance("a", 1, RequestStatus::Rejected).await);
        assert_eq!(
            pending.get("a", 1).await.unwrap().status,
            RequestStatus::Resolved
        );
        assert!(!pending.advance("a", 2, RequestStatus::Resolved).await);
    }

    #[tokio::test]
    async fn forgetting_a_topic_leaves_others() {
        let pending = PendingRequests::new();
        pending.begin(&request("a", 1)).await;
        pending.begin(&request("a", 2)).await;
        pending.begin(&request("b", 1)).await;
        assert_eq!(pending.forget_topic("a").await, 2);
        assert_eq!(pending.in_flight().await.len(), 1);
    }
}
