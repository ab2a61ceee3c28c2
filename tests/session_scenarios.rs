//! End-to-end session scenarios driven through in-memory channels.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use collab_canvas::network::protocol::{ClientMessage, ServerMessage};
use collab_canvas::network::registry::SessionRegistry;
use collab_canvas::network::{Connection, SyncEngine};
use collab_canvas::{RateLimitConfig, MAX_HISTORY};

const SESSION: &str = "board-0001";

struct Client {
    conn: Connection,
    rx: mpsc::Receiver<ServerMessage>,
}

impl Client {
    fn connect(engine: &SyncEngine) -> Self {
        let (tx, rx) = mpsc::channel(1024);
        Self {
            conn: engine.connect(tx),
            rx,
        }
    }

    fn send(&mut self, engine: &SyncEngine, msg: Value) {
        let msg = ClientMessage::from_json(&msg.to_string()).unwrap();
        engine.handle(&mut self.conn, msg);
    }

    fn join(&mut self, engine: &SyncEngine, name: &str) {
        self.send(
            engine,
            json!({"type": "join", "sessionId": SESSION, "name": name, "color": "#3B82F6"}),
        );
    }

    fn drain(&mut self) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }
}

fn engine_with(limits: RateLimitConfig) -> SyncEngine {
    SyncEngine::new(Arc::new(SessionRegistry::new()), limits)
}

fn relaxed_limits() -> RateLimitConfig {
    let mut limits = RateLimitConfig::default();
    limits.draw.limit = 10_000;
    limits
}

fn draw_message(i: usize) -> Value {
    json!({
        "type": "draw",
        "sessionId": SESSION,
        "record": {"type": "rect", "id": i},
        "snapshot": {"version": "5.3.0", "background": "#fff", "objects": []},
    })
}

#[tokio::test]
async fn test_history_bounded_and_visible_to_late_joiner() {
    let engine = engine_with(relaxed_limits());
    let mut a = Client::connect(&engine);
    a.join(&engine, "Ada");
    a.drain();

    for i in 0..51 {
        a.send(&engine, draw_message(i));
    }

    let last_sync = a
        .drain()
        .into_iter()
        .filter_map(|m| match m {
            ServerMessage::HistorySync(s) => Some(s),
            _ => None,
        })
        .last()
        .unwrap();
    assert_eq!(last_sync.history_length, MAX_HISTORY);
    assert_eq!(last_sync.redo_length, 0);

    let mut b = Client::connect(&engine);
    b.join(&engine, "Grace");
    match b.drain().first() {
        Some(ServerMessage::State(state)) => {
            assert_eq!(state.history.len(), MAX_HISTORY);
            assert_eq!(state.history[0]["id"], 1);
            assert_eq!(state.history[49]["id"], 50);

            let snapshot: Value = serde_json::from_str(state.snapshot.as_deref().unwrap()).unwrap();
            assert_eq!(snapshot["background"], "#fff");
            assert_eq!(snapshot["objects"].as_array().unwrap().len(), MAX_HISTORY);
        }
        other => panic!("expected state first, got {:?}", other),
    }
}

#[tokio::test]
async fn test_undo_redo_round_trip() {
    let engine = engine_with(relaxed_limits());
    let mut a = Client::connect(&engine);
    let mut b = Client::connect(&engine);
    a.join(&engine, "Ada");
    b.join(&engine, "Grace");
    for i in 0..3 {
        a.send(&engine, draw_message(i));
    }
    a.drain();
    b.drain();

    b.send(&engine, json!({"type": "undo", "sessionId": SESSION}));
    for client in [&mut a, &mut b] {
        match client.drain().as_slice() {
            [ServerMessage::Undo(state)] => {
                assert_eq!(state.history.len(), 2);
                assert_eq!(state.redo.len(), 1);
                assert_eq!(state.redo[0]["id"], 2);
            }
            other => panic!("unexpected messages: {:?}", other),
        }
    }

    a.send(&engine, json!({"type": "redo", "sessionId": SESSION}));
    match b.drain().as_slice() {
        [ServerMessage::Redo(state)] => {
            assert_eq!(state.history.len(), 3);
            assert!(state.redo.is_empty());
            assert_eq!(state.history[2]["id"], 2);
        }
        other => panic!("unexpected messages: {:?}", other),
    }

    // A new draw invalidates redo.
    b.send(&engine, json!({"type": "undo", "sessionId": SESSION}));
    a.send(&engine, draw_message(9));
    let sync = b
        .drain()
        .into_iter()
        .filter_map(|m| match m {
            ServerMessage::HistorySync(s) => Some(s),
            _ => None,
        })
        .last()
        .unwrap();
    assert_eq!(sync.history_length, 3);
    assert_eq!(sync.redo_length, 0);
}

#[tokio::test]
async fn test_chat_rate_limit_drops_excess() {
    let limits = RateLimitConfig::default().with_window(Duration::from_secs(60));
    let engine = engine_with(limits);
    let mut a = Client::connect(&engine);
    a.join(&engine, "Ada");
    a.drain();

    for i in 0..25 {
        a.send(
            &engine,
            json!({"type": "chat", "sessionId": SESSION, "body": format!("msg {i}"), "name": "Ada", "color": "#fff"}),
        );
    }

    let chats = a.drain();
    assert_eq!(chats.len(), 24);
    assert!(matches!(chats.last(), Some(ServerMessage::Chat(c)) if c.body == "msg 23"));

    // Drawing is still allowed.
    a.send(&engine, draw_message(0));
    assert_eq!(a.drain().len(), 1);
}

#[tokio::test]
async fn test_chat_log_bounded() {
    let mut limits = RateLimitConfig::default();
    limits.chat.limit = 1_000;
    let engine = engine_with(limits);
    let mut a = Client::connect(&engine);
    a.join(&engine, "Ada");

    for i in 0..120 {
        a.send(
            &engine,
            json!({"type": "chat", "sessionId": SESSION, "body": format!("msg {i}"), "name": "", "color": ""}),
        );
    }

    let mut b = Client::connect(&engine);
    b.join(&engine, "Grace");
    match &b.drain()[1] {
        ServerMessage::ChatHistory(history) => {
            assert_eq!(history.messages.len(), 100);
            assert_eq!(history.messages[0].body, "msg 20");
            // Empty payload identity falls back to the join-time identity.
            assert_eq!(history.messages[0].name, "Ada");
            assert_eq!(history.messages[0].color, "#3B82F6");
        }
        other => panic!("expected chat history, got {:?}", other),
    }
}

#[tokio::test]
async fn test_session_torn_down_on_last_disconnect() {
    let engine = engine_with(RateLimitConfig::default());
    let mut a = Client::connect(&engine);
    let mut b = Client::connect(&engine);
    a.join(&engine, "Ada");
    b.join(&engine, "Grace");
    a.send(&engine, draw_message(0));
    assert_eq!(engine.session_count(), 1);

    let Client { conn, .. } = a;
    engine.disconnect(conn);
    assert_eq!(engine.session_count(), 1);
    assert!(b.drain().iter().any(|m| matches!(m, ServerMessage::Left(_))));

    let Client { conn, .. } = b;
    engine.disconnect(conn);
    assert_eq!(engine.session_count(), 0);

    let mut c = Client::connect(&engine);
    c.join(&engine, "Linus");
    assert!(matches!(&c.drain()[0], ServerMessage::State(s) if s.history.is_empty() && s.snapshot.is_none()));
}

#[tokio::test]
async fn test_unjoined_and_foreign_session_events_dropped() {
    let engine = engine_with(RateLimitConfig::default());
    let mut a = Client::connect(&engine);
    a.send(&engine, draw_message(0));
    a.send(&engine, json!({"type": "chat", "sessionId": SESSION, "body": "hi"}));
    assert!(a.drain().is_empty());
    assert_eq!(engine.session_count(), 0);

    a.join(&engine, "Ada");
    a.drain();
    a.send(
        &engine,
        json!({"type": "clear", "sessionId": "another-board", "snapshot": null}),
    );
    a.send(&engine, json!({"type": "join", "sessionId": "another-board", "name": "x"}));
    assert!(a.drain().is_empty());
    assert_eq!(engine.session_count(), 1);
}

#[tokio::test]
async fn test_signaling_between_peers() {
    let engine = engine_with(RateLimitConfig::default());
    let mut a = Client::connect(&engine);
    let mut b = Client::connect(&engine);
    a.join(&engine, "Ada");
    b.join(&engine, "Grace");
    a.drain();
    b.drain();

    let a_id = a.conn.id();
    let b_id = b.conn.id();

    b.send(
        &engine,
        json!({"type": "offer", "sessionId": SESSION, "targetId": a_id.to_string(), "payload": {"sdp": "offer"}}),
    );
    match a.drain().as_slice() {
        [ServerMessage::Offer(offer)] => {
            assert_eq!(offer.sender_id, b_id);
            assert_eq!(offer.payload, json!({"sdp": "offer"}));
        }
        other => panic!("unexpected messages: {:?}", other),
    }

    a.send(
        &engine,
        json!({"type": "answer", "sessionId": SESSION, "targetId": b_id.to_string(), "payload": {"sdp": "answer"}}),
    );
    assert!(matches!(b.drain().as_slice(), [ServerMessage::Answer(ans)] if ans.sender_id == a_id));

    // Target that left is absent; nothing is queued for it.
    let Client { conn, .. } = a;
    engine.disconnect(conn);
    b.drain();
    b.send(
        &engine,
        json!({"type": "ice", "sessionId": SESSION, "targetId": a_id.to_string(), "payload": {}}),
    );
    assert!(b.drain().is_empty());
}
