//! Network Layer
//!
//! Session registry, connection protocol state machine and the WebSocket
//! transport. Everything on the event path is synchronous; only the
//! transport in `server` awaits.

pub mod connection;
pub mod engine;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod signaling;

pub use connection::{Connection, ConnectionContext, ConnectionPhase};
pub use engine::SyncEngine;
pub use protocol::{ClientMessage, ServerMessage, HistoryState, SignalKind};
pub use registry::{Session, SessionHandle, SessionId, SessionRegistry};
pub use server::{SyncServer, ServerConfig, SyncServerError};
pub use signaling::SignalingRelay;
