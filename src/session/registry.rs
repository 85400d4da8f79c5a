//! Authoritative in-memory record of open sessions.
//!
//! All mutations go through one async mutex so negotiation and lifecycle
//! steps never interleave. Mutating methods are crate-private: only the
//! negotiator inserts and only the lifecycle manager updates or removes.

use std::collections::BTreeMap;

use tokio::sync::Mutex;

use crate::session::{Namespaces, Session, SessionState};

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<BTreeMap<String, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a session keyed by topic.
    pub(crate) async fn insert(&self, session: Session) {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&session.topic) {
            tracing::debug!(topic = %session.topic, "Replacing existing registry entry");
        }
        sessions.insert(session.topic.clone(), session);
    }

    /// Remove a session, returning it in the `Terminated` state.
    pub(crate) async fn remove(&self, topic: &str) -> Option<Session> {
        let mut removed = self.sessions.lock().await.remove(topic)?;
        removed.state = SessionState::Terminated;
        Some(removed)
    }

    /// Mark a session as confirmed by the peer. Returns false if unknown.
    pub(crate) async fn mark_acknowledged(&self, topic: &str) -> bool {
        match self.sessions.lock().await.get_mut(topic) {
            Some(session) => {
                session.acknowledged = true;
                true
            }
            None => false,
        }
    }

    /// Swap the granted namespaces of an open session. Returns false if unknown.
    pub(crate) async fn replace_namespaces(&self, topic: &str, namespaces: Namespaces) -> bool {
        match self.sessions.lock().await.get_mut(topic) {
            Some(session) => {
                session.namespaces = namespaces;
                true
            }
            None => false,
        }
    }

    pub async fn get(&self, topic: &str) -> Option<Session> {
        self.sessions.lock().await.get(topic).cloned()
    }

    pub async fn contains(&self, topic: &str) -> bool {
        self.sessions.lock().await.contains_key(topic)
    }

    pub async fn list(&self) -> Vec<Session> {
        self.sessions.lock().await.values().cloned().collect()
    }

    pub async fn topics(&self) -> Vec<String> {
        self.sessions.lock().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}
