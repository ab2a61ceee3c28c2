//! Session Registry
//!
//! Process-wide map from session identifier to live session. Each session
//! sits behind its own lock; there is no lock spanning sessions.
//!
//! ## Locking
//!
//! - Mutations to one session run inside a single `parking_lot::Mutex`
//!   critical section, so append/truncate/clear-redo/resnapshot is atomic
//!   with respect to every other mutation on that session.
//! - Critical sections never await. Fan-out uses `try_send` on bounded
//!   queues, so broadcasting under the lock cannot suspend and every member
//!   observes mutations in the same order.
//! - Membership changes that can create or tear down a session hold the
//!   map shard first and the session lock second. Nothing takes a shard
//!   while holding a session lock.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

use crate::canvas::state::{ConnectionId, SessionState};
use crate::core::sanitize::is_valid_session_id;
use crate::network::protocol::ServerMessage;

/// Outbound queue for one connection.
pub type Outbound = mpsc::Sender<ServerMessage>;

/// Shared handle to a live session.
pub type SessionHandle = Arc<Mutex<Session>>;

// =============================================================================
// SESSION ID
// =============================================================================

/// Validated session identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Accept a raw identifier if it is well-formed.
    pub fn parse(raw: &str) -> Option<Self> {
        is_valid_session_id(raw).then(|| Self(raw.to_string()))
    }

    /// Identifier as sent by clients.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// A live session: shared canvas state plus the connections joined to it.
pub struct Session {
    /// Session identifier.
    pub id: SessionId,
    /// Canvas and chat state.
    pub state: SessionState,
    /// Joined connections and their outbound queues.
    members: BTreeMap<ConnectionId, Outbound>,
}

impl Session {
    /// Create an empty session.
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            state: SessionState::new(),
            members: BTreeMap::new(),
        }
    }

    /// Add a member. Returns `false` if it was already present.
    pub fn add_member(&mut self, id: ConnectionId, outbound: Outbound) -> bool {
        self.members.insert(id, outbound).is_none()
    }

    /// Remove a member. Returns `false` if it was not present.
    pub fn remove_member(&mut self, id: &ConnectionId) -> bool {
        self.members.remove(id).is_some()
    }

    /// Check membership.
    pub fn is_member(&self, id: &ConnectionId) -> bool {
        self.members.contains_key(id)
    }

    /// Number of joined connections.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// True once the last member has left.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Joined connections other than `excluding`, in id order.
    pub fn peers(&self, excluding: &ConnectionId) -> Vec<ConnectionId> {
        self.members
            .keys()
            .filter(|id| *id != excluding)
            .copied()
            .collect()
    }

    /// Deliver to every member except `exclude`. Returns the delivered count.
    pub fn broadcast(&self, message: &ServerMessage, exclude: Option<&ConnectionId>) -> usize {
        self.members
            .iter()
            .filter(|(id, _)| Some(*id) != exclude)
            .filter(|(id, outbound)| deliver(id, outbound, message.clone()))
            .count()
    }

    /// Deliver to a single member.
    pub fn send_to(&self, target: &ConnectionId, message: ServerMessage) -> bool {
        match self.members.get(target) {
            Some(outbound) => deliver(target, outbound, message),
            None => false,
        }
    }
}

/// Non-blocking enqueue. A full or closed queue drops the message.
pub(crate) fn deliver(id: &ConnectionId, outbound: &Outbound, message: ServerMessage) -> bool {
    match outbound.try_send(message) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            debug!("Outbound queue full for {}, dropping message", id);
            false
        }
        Err(TrySendError::Closed(_)) => {
            trace!("Outbound queue closed for {}", id);
            false
        }
    }
}

// =============================================================================
// SESSION REGISTRY
// =============================================================================

/// Manages all live sessions.
///
/// Sessions are created on first join and removed the moment their last
/// member leaves. Nothing is persisted.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionHandle>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Get a session, creating it if absent. Never fails.
    pub fn get_or_create(&self, id: &SessionId) -> SessionHandle {
        self.sessions
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(id.clone()))))
            .clone()
    }

    /// Get a session by ID.
    pub fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// Remove a session. No-op if absent.
    pub fn remove(&self, id: &SessionId) {
        self.sessions.remove(id);
    }

    /// Add a member, creating the session if needed.
    ///
    /// The member is inserted while the map entry is held, so a concurrent
    /// [`remove_if_empty`](Self::remove_if_empty) can never tear down the
    /// session between creation and insertion.
    pub fn join(&self, id: &SessionId, member: ConnectionId, outbound: Outbound) -> SessionHandle {
        let entry = self
            .sessions
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(id.clone()))));
        entry.lock().add_member(member, outbound);
        entry.value().clone()
    }

    /// Remove the session if it has no members. Returns `true` if removed.
    pub fn remove_if_empty(&self, id: &SessionId) -> bool {
        self.sessions
            .remove_if(id, |_, session| session.lock().is_empty())
            .is_some()
    }

    /// Check whether a session is live.
    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Get active session count.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
