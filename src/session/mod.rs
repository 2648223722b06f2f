//! Session management
//!
//! Bounded per-conversation turn history and the registry that owns every
//! live session. Sessions are in-memory only.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::debug;
use uuid::Uuid;

/// One user/assistant exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub user_text: String,
    pub assistant_text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(user_text: impl Into<String>, assistant_text: impl Into<String>) -> Self {
        Self {
            user_text: user_text.into(),
            assistant_text: assistant_text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Bounded FIFO of turns for one session.
///
/// Holds at most `max_size` turns; appending to a full history evicts the
/// oldest turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionHistory {
    session_id: String,
    turns: VecDeque<Turn>,
    max_size: usize,
}

impl SessionHistory {
    /// Create an empty history. A `max_size` of 0 is raised to 1.
    pub fn new(session_id: impl Into<String>, max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            session_id: session_id.into(),
            turns: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    pub fn append(&mut self, user_text: impl Into<String>, assistant_text: impl Into<String>) {
        self.push(Turn::new(user_text, assistant_text));
    }

    pub fn push(&mut self, turn: Turn) {
        while self.turns.len() >= self.max_size {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    /// Turns oldest first
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&Turn> {
        self.turns.back()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// Shared handle to one session's history
pub type SessionHandle = Arc<Mutex<SessionHistory>>;

/// Lock a session, recovering the history if a previous holder panicked
pub fn lock_session(handle: &SessionHandle) -> MutexGuard<'_, SessionHistory> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns every live session, keyed by session id
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    max_history: usize,
}

impl SessionRegistry {
    pub fn new(max_history: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_history,
        }
    }

    /// Start a session under a fresh id
    pub fn create(&self) -> (String, SessionHandle) {
        let id = Uuid::new_v4().to_string();
        let handle = self.get_or_create(&id);
        (id, handle)
    }

    /// Fetch a session, creating it on first use
    pub fn get_or_create(&self, id: &str) -> SessionHandle {
        if let Some(handle) = self.get(id) {
            return handle;
        }

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                debug!("Created session {}", id);
                Arc::new(Mutex::new(SessionHistory::new(id, self.max_history)))
            })
            .clone()
    }

    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Drop a session; returns whether it existed
    pub fn delete(&self, id: &str) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some();
        if removed {
            debug!("Deleted session {}", id);
        }
        removed
    }

    /// Live session ids, sorted
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }
}
