//! RealtimeHub - WebSocket Session Registry and Fan-out
//!
//! ## Responsibilities
//!
//! - Observer session registration (one per WebSocket connection)
//! - Welcome acknowledgment on connect (sent to the new session only)
//! - Artifact-ready broadcast to every session registered at publish time
//!
//! Only the artifact identifier is pushed over the socket. The image itself is
//! fetched by the client via HTTP GET /images/{artifact_id}.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Greeting sent once to each session on connect
pub const WELCOME_MESSAGE: &str = "You have successfully connected to server through a web socket";

/// Unique connection handle of an observer session
pub type SessionId = Uuid;

/// Hub message types
///
/// Serialized as `{"type": "connected" | "sendData", "data": "<payload>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "camelCase")]
pub enum HubMessage {
    /// Welcome acknowledgment, sent once at registration
    Connected(String),
    /// A settled artifact is available
    SendData(String),
}

impl HubMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            HubMessage::Connected(_) => "connected",
            HubMessage::SendData(_) => "sendData",
        }
    }
}

/// Outcome of a single publish call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    /// Sessions the message was handed to
    pub delivered: usize,
    /// Sessions whose channel was closed (removed from the registry)
    pub dropped: usize,
}

/// Observer session
struct ObserverSession {
    id: SessionId,
    tx: mpsc::UnboundedSender<String>,
}

/// RealtimeHub instance
pub struct RealtimeHub {
    sessions: RwLock<HashMap<SessionId, ObserverSession>>,
    connection_count: AtomicU64,
}

impl RealtimeHub {
    /// Create new RealtimeHub
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            connection_count: AtomicU64::new(0),
        }
    }

    /// Register a new session
    ///
    /// The returned receiver yields serialized frames for the socket writer,
    /// starting with the welcome acknowledgment.
    pub async fn register(&self) -> (SessionId, mpsc::UnboundedReceiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        self.attach(id, tx).await;

        (id, rx)
    }

    /// Register a session under a caller-supplied handle
    ///
    /// Returns false (and sends nothing) if the handle is already registered.
    pub async fn attach(&self, id: SessionId, tx: mpsc::UnboundedSender<String>) -> bool {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&id) {
            tracing::warn!(connection_id = %id, "Session already registered, ignoring");
            return false;
        }

        // Welcome goes out before insertion so no broadcast can precede it
        match encode(&HubMessage::Connected(WELCOME_MESSAGE.to_string())) {
            Some(json) => {
                if tx.send(json).is_err() {
                    tracing::warn!(connection_id = %id, "Session closed before welcome");
                    return false;
                }
            }
            None => return false,
        }

        sessions.insert(id, ObserverSession { id, tx });
        self.connection_count.fetch_add(1, Ordering::Relaxed);

        tracing::info!(connection_id = %id, sessions = sessions.len(), "Client connected");
        true
    }

    /// Unregister a session
    pub async fn unregister(&self, id: &SessionId) {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(id).is_some() {
            self.connection_count.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(connection_id = %id, "Client disconnected");
        }
    }

    /// Broadcast a settled artifact to every registered session
    ///
    /// Membership is snapshotted before fan-out. A failed send only affects
    /// that session, which is removed afterwards.
    pub async fn publish(&self, artifact_id: &str) -> PublishReport {
        let message = HubMessage::SendData(artifact_id.to_string());
        tracing::info!(
            message_type = %message.kind(),
            artifact_id = %artifact_id,
            "Broadcasting message to clients"
        );

        let Some(json) = encode(&message) else {
            return PublishReport::default();
        };

        let targets: Vec<(SessionId, mpsc::UnboundedSender<String>)> = {
            let sessions = self.sessions.read().await;
            sessions.values().map(|s| (s.id, s.tx.clone())).collect()
        };
        tracing::debug!(client_count = targets.len(), "Sending to connected clients");

        let mut report = PublishReport::default();
        let mut closed = Vec::new();

        for (id, tx) in targets {
            match tx.send(json.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(connection_id = %id, error = %e, "Failed to send message");
                    closed.push(id);
                }
            }
        }

        for id in &closed {
            self.unregister(id).await;
        }
        report.dropped = closed.len();

        report
    }

    /// Get connection count
    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }

    /// Handles of all registered sessions
    pub async fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.read().await.keys().copied().collect()
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

fn encode(message: &HubMessage) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize message");
            None
        }
    }
}
