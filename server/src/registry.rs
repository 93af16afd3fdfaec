//! Live session lookup by id.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, watch};
use uuid::Uuid;

use crate::session::{SessionCommand, SessionState, SessionStatus};

/// Observer channel capacity; slow observers lag instead of blocking.
pub const OBSERVER_BUFFER: usize = 256;

/// Everything the HTTP layer needs to reach a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub avatar_id: Option<String>,
    pub created_at: DateTime<Utc>,
    commands: mpsc::Sender<SessionCommand>,
    status: watch::Receiver<SessionStatus>,
    observers: broadcast::Sender<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub avatar_id: Option<String>,
    pub voice_id: Option<String>,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub observers: usize,
}

impl SessionHandle {
    pub fn new(
        id: Uuid,
        avatar_id: Option<String>,
        commands: mpsc::Sender<SessionCommand>,
        status: watch::Receiver<SessionStatus>,
        observers: broadcast::Sender<String>,
    ) -> Self {
        Self {
            id,
            avatar_id,
            created_at: Utc::now(),
            commands,
            status,
            observers,
        }
    }

    pub fn state(&self) -> SessionState {
        self.status.borrow().state
    }

    /// Queue a command for the session task without waiting. `Full` means the
    /// session is backed up, `Closed` that it is gone.
    pub fn send(&self, command: SessionCommand) -> Result<(), TrySendError<SessionCommand>> {
        self.commands.try_send(command)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.observers.subscribe()
    }

    pub fn snapshot(&self) -> SessionSummary {
        let status = self.status.borrow().clone();
        SessionSummary {
            id: self.id,
            avatar_id: self.avatar_id.clone(),
            voice_id: status.voice_id,
            state: status.state,
            created_at: self.created_at,
            observers: self.observers.receiver_count(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<Uuid, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: SessionHandle) {
        self.sessions.insert(handle.id, handle);
    }

    pub fn get(&self, id: &Uuid) -> Option<SessionHandle> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: &Uuid) -> Option<SessionHandle> {
        self.sessions.remove(id).map(|(_, handle)| handle)
    }

    pub fn list(&self) -> Vec<SessionSummary> {
        let mut sessions: Vec<SessionSummary> = self
            .sessions
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
