//! Connection State
//!
//! Per-connection protocol phase. A connection starts `Unjoined`, becomes
//! `Joined` on a valid join, and ends when it is handed to
//! [`SyncEngine::disconnect`](crate::network::engine::SyncEngine::disconnect),
//! which consumes it. Events can therefore never be processed after
//! disconnect.

use crate::canvas::state::ConnectionId;
use crate::network::registry::{Outbound, SessionId};

/// Transient association between a connection and its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    /// Joined session.
    pub session_id: SessionId,
    /// Escaped display name given at join.
    pub name: String,
    /// Escaped color tag given at join.
    pub color: String,
}

/// Protocol phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Connected, no session yet.
    Unjoined,
    /// Joined to a session.
    Joined(ConnectionContext),
}

/// A live connection as seen by the engine.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    outbound: Outbound,
    phase: ConnectionPhase,
}

impl Connection {
    /// Create an unjoined connection.
    pub fn new(id: ConnectionId, outbound: Outbound) -> Self {
        Self {
            id,
            outbound,
            phase: ConnectionPhase::Unjoined,
        }
    }

    /// Connection identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Outbound queue.
    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    /// Current phase.
    pub fn phase(&self) -> &ConnectionPhase {
        &self.phase
    }

    /// Session context, if joined.
    pub fn context(&self) -> Option<&ConnectionContext> {
        match &self.phase {
            ConnectionPhase::Joined(context) => Some(context),
            ConnectionPhase::Unjoined => None,
        }
    }

    /// True once joined.
    pub fn is_joined(&self) -> bool {
        matches!(self.phase, ConnectionPhase::Joined(_))
    }

    /// Transition `Unjoined -> Joined`. Returns `false` if already joined.
    pub(crate) fn mark_joined(&mut self, context: ConnectionContext) -> bool {
        if self.is_joined() {
            return false;
        }
        self.phase = ConnectionPhase::Joined(context);
        true
    }

    /// Context if joined to the session named by `raw_session_id`.
    ///
    /// Events that name any other session are protocol-state violations.
    pub fn joined_to(&self, raw_session_id: &str) -> Option<&ConnectionContext> {
        self.context()
            .filter(|context| context.session_id.as_str() == raw_session_id)
    }
}
