//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every message is a JSON object with a `type` discriminator and
//! camelCase fields.
//!
//! Document payloads (strokes, snapshots) and signaling payloads are carried
//! as untyped JSON and never interpreted beyond the shape checks the engine
//! performs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canvas::state::{ChatMessage, ConnectionId, SessionState};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Join a session.
    Join(JoinRequest),

    /// Append a stroke to the session history.
    Draw(DrawRequest),

    /// Reset the canvas.
    Clear(ClearRequest),

    /// Cursor position update.
    Cursor(CursorUpdate),

    /// Chat message.
    Chat(ChatRequest),

    /// Undo the newest stroke.
    Undo(SessionRef),

    /// Redo the last undone stroke.
    Redo(SessionRef),

    /// Ask for the current peer list.
    RequestPeers(SessionRef),

    /// Peer-connection offer for one target.
    Offer(SignalRequest),

    /// Peer-connection answer for one target.
    Answer(SignalRequest),

    /// ICE candidate for one target.
    Ice(SignalRequest),
}

/// Join request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    /// Session to join.
    pub session_id: String,
    /// Display name (sanitized on receipt).
    #[serde(default)]
    pub name: Value,
    /// Cursor color tag (sanitized on receipt).
    #[serde(default)]
    pub color: Value,
}

/// Stroke submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawRequest {
    /// Target session.
    pub session_id: String,
    /// The stroke. Must be a JSON object.
    pub record: Value,
    /// Sender's full canvas document (object, serialized string or null).
    #[serde(default)]
    pub snapshot: Value,
}

/// Canvas reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearRequest {
    /// Target session.
    pub session_id: String,
    /// Sender's cleared canvas document.
    #[serde(default)]
    pub snapshot: Value,
}

/// Cursor position.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorUpdate {
    /// Target session.
    pub session_id: String,
    /// Canvas X coordinate. Not clamped.
    pub x: f64,
    /// Canvas Y coordinate. Not clamped.
    pub y: f64,
    /// Display name.
    #[serde(default)]
    pub name: Value,
    /// Color tag.
    #[serde(default)]
    pub color: Value,
}

/// Chat submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Target session.
    pub session_id: String,
    /// Message body.
    #[serde(default)]
    pub body: Value,
    /// Display name.
    #[serde(default)]
    pub name: Value,
    /// Color tag.
    #[serde(default)]
    pub color: Value,
}

/// Payload carrying only a session id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRef {
    /// Target session.
    pub session_id: String,
}

/// Peer-connection setup message addressed to one connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRequest {
    /// Session both peers are joined to.
    pub session_id: String,
    /// Receiving connection.
    pub target_id: String,
    /// Opaque payload (SDP or ICE candidate), relayed verbatim.
    #[serde(default)]
    pub payload: Value,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Full session state, sent to a joining connection.
    State(HistoryState),

    /// Recent chat log, sent to a joining connection.
    ChatHistory(ChatHistory),

    /// Other connections in the session.
    Peers(PeerList),

    /// Stroke from another connection.
    Draw(DrawBroadcast),

    /// History and redo lengths after a stroke or clear.
    HistorySync(HistorySync),

    /// Canvas was cleared by another connection.
    Clear(SessionRef),

    /// Another connection's cursor moved.
    Cursor(CursorBroadcast),

    /// Chat message (sender included).
    Chat(ChatMessage),

    /// State after an undo.
    Undo(HistoryState),

    /// State after a redo.
    Redo(HistoryState),

    /// Relayed peer-connection offer.
    Offer(SignalForward),

    /// Relayed peer-connection answer.
    Answer(SignalForward),

    /// Relayed ICE candidate.
    Ice(SignalForward),

    /// A connection left the session.
    Left(PeerLeft),

    /// Server is shutting down.
    Shutdown {
        /// Human-readable reason.
        reason: String,
    },
}

/// Snapshot plus history and redo stacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryState {
    /// Session identifier.
    pub session_id: String,
    /// Serialized canvas document, `null` before the first stroke.
    pub snapshot: Option<String>,
    /// Strokes, oldest first.
    pub history: Vec<Value>,
    /// Undone strokes, next-to-redo first.
    pub redo: Vec<Value>,
}

impl HistoryState {
    /// Capture the current state of a session.
    pub fn capture(session_id: &str, state: &SessionState) -> Self {
        Self {
            session_id: session_id.to_string(),
            snapshot: state.snapshot().map(str::to_string),
            history: state.history().iter().cloned().collect(),
            redo: state.redo_stack().iter().cloned().collect(),
        }
    }
}

/// Chat log for a joining connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistory {
    /// Session identifier.
    pub session_id: String,
    /// Messages, oldest first.
    pub messages: Vec<ChatMessage>,
}

/// Peer list for mesh connection setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerList {
    /// Session identifier.
    pub session_id: String,
    /// Connections joined to the session, excluding the receiver.
    pub peers: Vec<ConnectionId>,
}

/// Stroke fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawBroadcast {
    /// Session identifier.
    pub session_id: String,
    /// The stroke.
    pub record: Value,
    /// Sender's canvas document as received.
    pub snapshot: Value,
    /// Drawing connection.
    pub sender_id: ConnectionId,
}

/// History length signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySync {
    /// Session identifier.
    pub session_id: String,
    /// Strokes in history.
    pub history_length: usize,
    /// Strokes in the redo stack.
    pub redo_length: usize,
}

/// Cursor fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorBroadcast {
    /// Session identifier.
    pub session_id: String,
    /// Moving connection.
    pub sender_id: ConnectionId,
    /// Canvas X coordinate.
    pub x: f64,
    /// Canvas Y coordinate.
    pub y: f64,
    /// Escaped display name.
    pub name: String,
    /// Escaped color tag.
    pub color: String,
}

/// Relayed signaling message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalForward {
    /// Session identifier.
    pub session_id: String,
    /// Originating connection.
    pub sender_id: ConnectionId,
    /// Opaque payload as received.
    pub payload: Value,
}

/// Departure notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerLeft {
    /// Session identifier.
    pub session_id: String,
    /// Departed connection.
    pub sender_id: ConnectionId,
}

/// Signaling message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// Session description offer.
    Offer,
    /// Session description answer.
    Answer,
    /// ICE candidate.
    Ice,
}

impl SignalKind {
    /// Wrap a forwarded payload in the matching server message.
    pub fn into_message(self, forward: SignalForward) -> ServerMessage {
        match self {
            SignalKind::Offer => ServerMessage::Offer(forward),
            SignalKind::Answer => ServerMessage::Answer(forward),
            SignalKind::Ice => ServerMessage::Ice(forward),
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Deserialize from UTF-8 JSON bytes (binary frames).
    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
