//! Protocol sessions and the session table
//!
//! A [`ProtocolSession`] is created by a well-formed `initialize` request and
//! lives until its subscriber stream closes or the client sends `DELETE`.
//! Each session carries at most one notification subscriber at a time; pushes
//! with no subscriber attached are dropped (best-effort delivery).

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::{McpError, McpResult},
    protocol::{JsonRpcRequest, LogLevel, LoggingMessageParams},
};

/// One live subscriber binding. The generation distinguishes a stream that
/// was displaced by a newer subscriber from the currently-bound one.
#[derive(Debug)]
struct SubscriberSlot {
    sender: mpsc::UnboundedSender<JsonRpcRequest>,
    generation: u64,
}

/// A live protocol session
#[derive(Debug)]
pub struct ProtocolSession {
    /// Server-issued session identifier, never reused
    pub session_id: String,

    /// When the session was created
    pub created_at: DateTime<Utc>,

    subscriber: RwLock<Option<SubscriberSlot>>,
    next_generation: RwLock<u64>,
}

impl ProtocolSession {
    fn new(session_id: String) -> Self {
        Self {
            session_id,
            created_at: Utc::now(),
            subscriber: RwLock::new(None),
            next_generation: RwLock::new(0),
        }
    }

    /// Bind a notification subscriber, displacing any previous one.
    ///
    /// Dropping the old sender ends the displaced stream. Returns the
    /// receiver plus the binding generation the caller must hand back on
    /// close so a displaced stream cannot tear down its successor.
    pub async fn subscribe(&self) -> (mpsc::UnboundedReceiver<JsonRpcRequest>, u64) {
        let generation = {
            let mut next = self.next_generation.write().await;
            *next += 1;
            *next
        };

        let (sender, receiver) = mpsc::unbounded_channel();
        let previous = self
            .subscriber
            .write()
            .await
            .replace(SubscriberSlot { sender, generation });
        if previous.is_some() {
            debug!(session_id = %self.session_id, "displacing existing event stream subscriber");
        }

        (receiver, generation)
    }

    /// Whether a subscriber is currently attached and still connected
    pub async fn has_subscriber(&self) -> bool {
        match self.subscriber.read().await.as_ref() {
            Some(slot) => !slot.sender.is_closed(),
            None => false,
        }
    }

    /// Whether the given binding is still the current one
    pub async fn is_current_subscriber(&self, generation: u64) -> bool {
        matches!(
            self.subscriber.read().await.as_ref(),
            Some(slot) if slot.generation == generation
        )
    }

    /// Push a notification to the subscriber, if one is attached.
    ///
    /// Returns whether the notification was handed to a live stream;
    /// unsubscribed sessions drop pushes without error.
    pub async fn notify(&self, notification: JsonRpcRequest) -> bool {
        match self.subscriber.read().await.as_ref() {
            Some(slot) => slot.sender.send(notification).is_ok(),
            None => false,
        }
    }

    /// Push a logging message notification tagged with this session
    pub async fn notify_log(&self, level: LogLevel, data: serde_json::Value) -> bool {
        let params = LoggingMessageParams {
            level,
            data,
            logger: None,
        };
        let notification = JsonRpcRequest::notification(
            "notifications/message",
            Some(serde_json::to_value(params).unwrap_or_default()),
        );
        self.notify(notification).await
    }
}

/// Owner of the session table. Sessions are created only through
/// [`SessionManager::create_session`] and are never shared across managers.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<ProtocolSession>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a new session, generating a fresh id unless the caller
    /// suggests one. A suggested id that collides with a live session is
    /// rejected rather than silently displacing it.
    pub async fn create_session(
        &self,
        suggested_id: Option<String>,
    ) -> McpResult<Arc<ProtocolSession>> {
        let mut sessions = self.sessions.write().await;

        let session_id = match suggested_id {
            Some(id) => {
                if sessions.contains_key(&id) {
                    return Err(McpError::Session {
                        message: format!("Session id '{}' is already in use", id),
                    });
                }
                id
            }
            None => Uuid::new_v4().to_string(),
        };

        let session = Arc::new(ProtocolSession::new(session_id.clone()));
        sessions.insert(session_id.clone(), Arc::clone(&session));

        info!(session_id = %session_id, "created protocol session");
        Ok(session)
    }

    /// Get an existing session
    pub async fn get_session(&self, session_id: &str) -> Option<Arc<ProtocolSession>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Remove a session, releasing its subscriber channel
    pub async fn remove_session(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            info!(session_id = %session_id, "removed protocol session");
        }
        removed
    }

    /// Evict a session when its currently-bound stream closes. A displaced
    /// stream handing back a stale generation is a no-op.
    pub async fn close_if_current(&self, session_id: &str, generation: u64) {
        let session = match self.get_session(session_id).await {
            Some(session) => session,
            None => return,
        };
        if session.is_current_subscriber(generation).await {
            debug!(session_id = %session_id, "event stream closed, evicting session");
            self.remove_session(session_id).await;
        }
    }

    /// Number of live sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
