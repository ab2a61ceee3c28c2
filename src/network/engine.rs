//! Sync Engine
//!
//! Connection-event orchestrator. Every inbound event goes through the same
//! pipeline:
//!
//! ```text
//! phase check -> session id check -> rate check -> payload check
//!     -> mutate session (under its lock) -> fan-out
//! ```
//!
//! Any failed step drops the event silently. Malformed input, rate-limit
//! rejections, out-of-phase events and absent relay targets never produce a
//! reply and never touch session state.

use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::canvas::state::{ChatMessage, ConnectionId};
use crate::core::rate_limit::{EventKind, RateLimitConfig, RateLimiter};
use crate::core::sanitize::{sanitize_text, MAX_CHAT_LEN, MAX_COLOR_LEN, MAX_NAME_LEN};
use crate::network::connection::{Connection, ConnectionContext};
use crate::network::protocol::{
    ChatHistory, ChatRequest, ClearRequest, ClientMessage, CursorBroadcast, CursorUpdate,
    DrawBroadcast, DrawRequest, HistoryState, HistorySync, JoinRequest, PeerLeft, PeerList,
    ServerMessage, SessionRef, SignalKind, SignalRequest,
};
use crate::network::registry::{deliver, Outbound, SessionId, SessionRegistry};
use crate::network::signaling::SignalingRelay;

/// Direction of a history step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HistoryStep {
    Undo,
    Redo,
}

/// The connection-event orchestrator.
pub struct SyncEngine {
    registry: Arc<SessionRegistry>,
    relay: SignalingRelay,
    limiter: RateLimiter<ConnectionId>,
    limits: RateLimitConfig,
}

impl SyncEngine {
    /// Create an engine over a shared registry.
    pub fn new(registry: Arc<SessionRegistry>, limits: RateLimitConfig) -> Self {
        Self {
            relay: SignalingRelay::new(registry.clone()),
            registry,
            limiter: RateLimiter::new(),
            limits,
        }
    }

    /// Registry backing this engine.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Get active session count.
    pub fn session_count(&self) -> usize {
        self.registry.session_count()
    }

    /// Register a new, unjoined connection.
    pub fn connect(&self, outbound: Outbound) -> Connection {
        let conn = Connection::new(ConnectionId::new(), outbound);
        debug!("Connection {} opened", conn.id());
        conn
    }

    /// Process one inbound event.
    ///
    /// Events for one connection must be handled in arrival order; events
    /// for different connections may be handled concurrently.
    pub fn handle(&self, conn: &mut Connection, msg: ClientMessage) {
        match msg {
            ClientMessage::Join(req) => self.handle_join(conn, req),
            ClientMessage::Draw(req) => self.handle_draw(conn, req),
            ClientMessage::Clear(req) => self.handle_clear(conn, req),
            ClientMessage::Cursor(req) => self.handle_cursor(conn, req),
            ClientMessage::Chat(req) => self.handle_chat(conn, req),
            ClientMessage::Undo(req) => self.handle_history_step(conn, req, HistoryStep::Undo),
            ClientMessage::Redo(req) => self.handle_history_step(conn, req, HistoryStep::Redo),
            ClientMessage::RequestPeers(req) => self.handle_request_peers(conn, req),
            ClientMessage::Offer(req) => self.handle_signal(conn, req, SignalKind::Offer),
            ClientMessage::Answer(req) => self.handle_signal(conn, req, SignalKind::Answer),
            ClientMessage::Ice(req) => self.handle_signal(conn, req, SignalKind::Ice),
        }
    }

    /// Terminal transition.
    ///
    /// Notifies the remaining members, removes the connection from its
    /// session, tears the session down if it is now empty and discards the
    /// connection's rate-limit windows.
    pub fn disconnect(&self, conn: Connection) {
        let id = conn.id();
        self.limiter.forget(&id);

        let Some(context) = conn.context() else {
            debug!("Connection {} closed before joining", id);
            return;
        };

        if let Some(session) = self.registry.get(&context.session_id) {
            let mut session = session.lock();
            if session.remove_member(&id) {
                let left = ServerMessage::Left(PeerLeft {
                    session_id: context.session_id.to_string(),
                    sender_id: id,
                });
                session.broadcast(&left, None);
            }
        }

        if self.registry.remove_if_empty(&context.session_id) {
            info!("Session {} torn down after last member left", context.session_id);
        }
        debug!("Connection {} left session {}", id, context.session_id);
    }

    // =========================================================================
    // EVENT HANDLERS
    // =========================================================================

    fn handle_join(&self, conn: &mut Connection, req: JoinRequest) {
        if conn.is_joined() {
            trace!("Ignoring repeated join from {}", conn.id());
            return;
        }
        let Some(session_id) = SessionId::parse(&req.session_id) else {
            trace!("Ignoring join with malformed session id from {}", conn.id());
            return;
        };

        let context = ConnectionContext {
            session_id: session_id.clone(),
            name: sanitize_text(&req.name, MAX_NAME_LEN),
            color: sanitize_text(&req.color, MAX_COLOR_LEN),
        };

        let session = self.registry.join(&session_id, conn.id(), conn.outbound().clone());
        {
            let session = session.lock();
            let id = conn.id();
            let outbound = conn.outbound();

            deliver(
                &id,
                outbound,
                ServerMessage::State(HistoryState::capture(session_id.as_str(), &session.state)),
            );
            deliver(
                &id,
                outbound,
                ServerMessage::ChatHistory(ChatHistory {
                    session_id: session_id.to_string(),
                    messages: session.state.chat().iter().cloned().collect(),
                }),
            );
            deliver(
                &id,
                outbound,
                ServerMessage::Peers(PeerList {
                    session_id: session_id.to_string(),
                    peers: session.peers(&id),
                }),
            );
        }

        info!(
            "Connection {} joined session {} as {:?}",
            conn.id(),
            session_id,
            context.name
        );
        conn.mark_joined(context);
    }

    fn handle_draw(&self, conn: &Connection, req: DrawRequest) {
        let Some(session_id) = self.admit(conn, &req.session_id, EventKind::Draw) else {
            return;
        };
        if !req.record.is_object() {
            trace!("Ignoring non-object stroke from {}", conn.id());
            return;
        }
        let Some(session) = self.registry.get(&session_id) else {
            return;
        };

        let mut session = session.lock();
        session.state.append_mutation(req.record.clone(), &req.snapshot);

        let draw = ServerMessage::Draw(DrawBroadcast {
            session_id: req.session_id.clone(),
            record: req.record,
            snapshot: req.snapshot,
            sender_id: conn.id(),
        });
        session.broadcast(&draw, Some(&conn.id()));

        let sync = ServerMessage::HistorySync(HistorySync {
            session_id: req.session_id,
            history_length: session.state.history_len(),
            redo_length: session.state.redo_len(),
        });
        session.broadcast(&sync, None);
    }

    fn handle_clear(&self, conn: &Connection, req: ClearRequest) {
        let Some(session_id) = self.admit(conn, &req.session_id, EventKind::Clear) else {
            return;
        };
        let Some(session) = self.registry.get(&session_id) else {
            return;
        };

        let mut session = session.lock();
        session.state.clear(&req.snapshot);

        let clear = ServerMessage::Clear(SessionRef {
            session_id: req.session_id.clone(),
        });
        session.broadcast(&clear, Some(&conn.id()));

        let sync = ServerMessage::HistorySync(HistorySync {
            session_id: req.session_id,
            history_length: 0,
            redo_length: 0,
        });
        session.broadcast(&sync, None);
    }

    fn handle_cursor(&self, conn: &Connection, req: CursorUpdate) {
        let Some(session_id) = self.admit(conn, &req.session_id, EventKind::Cursor) else {
            return;
        };
        let Some(session) = self.registry.get(&session_id) else {
            return;
        };
        let (name, color) = self.identity(conn, &req.name, &req.color);

        let cursor = ServerMessage::Cursor(CursorBroadcast {
            session_id: req.session_id,
            sender_id: conn.id(),
            x: req.x,
            y: req.y,
            name,
            color,
        });
        session.lock().broadcast(&cursor, Some(&conn.id()));
    }

    fn handle_chat(&self, conn: &Connection, req: ChatRequest) {
        let Some(session_id) = self.admit(conn, &req.session_id, EventKind::Chat) else {
            return;
        };
        let body = sanitize_text(&req.body, MAX_CHAT_LEN);
        if body.is_empty() {
            trace!("Ignoring empty chat from {}", conn.id());
            return;
        }
        let Some(session) = self.registry.get(&session_id) else {
            return;
        };
        let (name, color) = self.identity(conn, &req.name, &req.color);

        let message = ChatMessage {
            session_id: req.session_id,
            body,
            name,
            color,
            sender_id: conn.id(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };

        let mut session = session.lock();
        session.state.push_chat(message.clone());
        session.broadcast(&ServerMessage::Chat(message), None);
    }

    fn handle_history_step(&self, conn: &Connection, req: SessionRef, step: HistoryStep) {
        let kind = match step {
            HistoryStep::Undo => EventKind::Undo,
            HistoryStep::Redo => EventKind::Redo,
        };
        let Some(session_id) = self.admit(conn, &req.session_id, kind) else {
            return;
        };
        let Some(session) = self.registry.get(&session_id) else {
            return;
        };

        let mut session = session.lock();
        let changed = match step {
            HistoryStep::Undo => session.state.undo(),
            HistoryStep::Redo => session.state.redo(),
        };
        if !changed {
            trace!("{:?} on empty stack in session {}", step, session_id);
        }

        let state = HistoryState::capture(&req.session_id, &session.state);
        let message = match step {
            HistoryStep::Undo => ServerMessage::Undo(state),
            HistoryStep::Redo => ServerMessage::Redo(state),
        };
        session.broadcast(&message, None);
    }

    fn handle_request_peers(&self, conn: &Connection, req: SessionRef) {
        let Some(session_id) = self.admit(conn, &req.session_id, EventKind::Signaling) else {
            return;
        };
        let peers = self.relay.list_peers(&session_id, &conn.id());
        deliver(
            &conn.id(),
            conn.outbound(),
            ServerMessage::Peers(PeerList {
                session_id: req.session_id,
                peers,
            }),
        );
    }

    fn handle_signal(&self, conn: &Connection, req: SignalRequest, kind: SignalKind) {
        let Some(session_id) = self.admit(conn, &req.session_id, EventKind::Signaling) else {
            return;
        };
        let Some(target) = ConnectionId::parse(&req.target_id) else {
            trace!("Ignoring {:?} with malformed target from {}", kind, conn.id());
            return;
        };
        self.relay
            .forward(&session_id, kind, conn.id(), target, req.payload);
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    /// Gate shared by every post-join event.
    ///
    /// The connection must be joined to exactly the named session and must
    /// be within its budget for `kind`.
    fn admit(&self, conn: &Connection, raw_session_id: &str, kind: EventKind) -> Option<SessionId> {
        let Some(context) = conn.joined_to(raw_session_id) else {
            trace!("Ignoring {:?} from {} outside its session", kind, conn.id());
            return None;
        };
        if self
            .limiter
            .should_reject(&conn.id(), kind, self.limits.rule(kind))
        {
            trace!("Rate limited {:?} from {}", kind, conn.id());
            return None;
        }
        Some(context.session_id.clone())
    }

    /// Sanitized name and color, falling back to the join-time values.
    fn identity(
        &self,
        conn: &Connection,
        name: &serde_json::Value,
        color: &serde_json::Value,
    ) -> (String, String) {
        let name = sanitize_text(name, MAX_NAME_LEN);
        let color = sanitize_text(color, MAX_COLOR_LEN);
        match conn.context() {
            Some(context) => (
                if name.is_empty() { context.name.clone() } else { name },
                if color.is_empty() { context.color.clone() } else { color },
            ),
            None => (name, color),
        }
    }
}
