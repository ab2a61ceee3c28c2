//! Session State
//!
//! Shared canvas state for one collaborative session: the derived snapshot,
//! a bounded stroke history with a redo stack, and a bounded chat log.
//!
//! All mutators run under the owning session's lock, so each one is a single
//! atomic read-modify-write from the point of view of other connections.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::canvas::document::Document;

/// Maximum strokes kept in history.
pub const MAX_HISTORY: usize = 50;

/// Maximum chat messages kept for late joiners.
pub const MAX_CHAT: usize = 100;

// =============================================================================
// CONNECTION ID
// =============================================================================

/// Server-assigned connection identifier.
///
/// Serialized as a hyphenated UUID string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Allocate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a UUID string.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// CHAT
// =============================================================================

/// A sanitized chat message as stored and broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Session the message belongs to.
    pub session_id: String,
    /// Escaped message body.
    pub body: String,
    /// Escaped author display name.
    pub name: String,
    /// Escaped author color tag.
    pub color: String,
    /// Author connection.
    pub sender_id: ConnectionId,
    /// Server receive time, milliseconds since the Unix epoch.
    pub timestamp: i64,
}

// =============================================================================
// SESSION STATE
// =============================================================================

/// Canvas and chat state for one session.
///
/// Invariants, held after every method returns:
/// - `history.len() <= MAX_HISTORY`, `chat.len() <= MAX_CHAT`
/// - `history.len() + redo.len() <= MAX_HISTORY`
/// - `snapshot` is the base document with `objects` set to `history`
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    snapshot: Option<String>,
    history: VecDeque<Value>,
    redo: VecDeque<Value>,
    chat: VecDeque<ChatMessage>,
}

impl SessionState {
    /// Fresh state with no snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stroke.
    ///
    /// The base document is rebuilt from the sender's full snapshot, the
    /// oldest strokes are evicted past `MAX_HISTORY`, redo is cleared and the
    /// snapshot is re-derived from the new history.
    pub fn append_mutation(&mut self, record: Value, full_snapshot: &Value) {
        let base = Document::from_value(full_snapshot);

        self.history.push_back(record);
        while self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }
        self.redo.clear();

        self.resnapshot(base);
    }

    /// Move the newest stroke onto the front of the redo stack.
    ///
    /// Returns `false` and leaves the state untouched when history is empty.
    pub fn undo(&mut self) -> bool {
        let Some(last) = self.history.pop_back() else {
            return false;
        };
        self.redo.push_front(last);
        self.resnapshot(Document::from_snapshot(self.snapshot.as_deref()));
        true
    }

    /// Move the front of the redo stack back onto history.
    ///
    /// Returns `false` and leaves the state untouched when redo is empty.
    pub fn redo(&mut self) -> bool {
        let Some(next) = self.redo.pop_front() else {
            return false;
        };
        self.history.push_back(next);
        self.resnapshot(Document::from_snapshot(self.snapshot.as_deref()));
        true
    }

    /// Reset the canvas to the given document with an empty history.
    pub fn clear(&mut self, full_snapshot: &Value) {
        self.history.clear();
        self.redo.clear();
        self.resnapshot(Document::from_value(full_snapshot));
    }

    /// Append a chat message, evicting the oldest past `MAX_CHAT`.
    pub fn push_chat(&mut self, message: ChatMessage) {
        self.chat.push_back(message);
        while self.chat.len() > MAX_CHAT {
            self.chat.pop_front();
        }
    }

    fn resnapshot(&mut self, base: Document) {
        self.snapshot = Some(base.with_objects(&self.history).to_json());
    }

    /// Serialized snapshot, `None` until the first mutation.
    pub fn snapshot(&self) -> Option<&str> {
        self.snapshot.as_deref()
    }

    /// Strokes, oldest first.
    pub fn history(&self) -> &VecDeque<Value> {
        &self.history
    }

    /// Undone strokes, next-to-redo first.
    pub fn redo_stack(&self) -> &VecDeque<Value> {
        &self.redo
    }

    /// Chat log, oldest first.
    pub fn chat(&self) -> &VecDeque<ChatMessage> {
        &self.chat
    }

    /// History length.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Redo stack length.
    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }
}
