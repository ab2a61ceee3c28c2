//! # Collaborative Canvas Sync Server
//!
//! Server-side core of a real-time collaborative whiteboard: session
//! membership, bounded undo/redo history, chat log, cursor fan-out and
//! peer-connection signaling relay.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  COLLAB CANVAS SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/             - Stateless primitives                    │
//! │  ├── sanitize.rs   - Text escaping, session id checks        │
//! │  └── rate_limit.rs - Fixed-window per-event limiter          │
//! │                                                              │
//! │  canvas/           - Session state (synchronous)             │
//! │  ├── document.rs   - Base document and object list           │
//! │  └── state.rs      - History, redo stack, chat log           │
//! │                                                              │
//! │  network/          - Protocol and transport                  │
//! │  ├── protocol.rs   - Message types                           │
//! │  ├── registry.rs   - Live sessions and membership            │
//! │  ├── connection.rs - Per-connection phase                    │
//! │  ├── engine.rs     - Event pipeline                          │
//! │  ├── signaling.rs  - Offer/answer/ice relay                  │
//! │  └── server.rs     - WebSocket server                        │
//! │                                                              │
//! │  config.rs         - Environment configuration               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency
//!
//! Each session is guarded by its own lock. Every mutation and its fan-out
//! happen inside one critical section, so all members of a session observe
//! mutations in the same order and `snapshot` always equals the base
//! document with its object list replaced by `history`. Sessions live only
//! in memory and vanish when their last member leaves.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod canvas;
pub mod config;
pub mod core;
pub mod network;

// Re-export commonly used types
pub use canvas::state::{ChatMessage, ConnectionId, SessionState, MAX_CHAT, MAX_HISTORY};
pub use config::{Config, ConfigError};
pub use core::rate_limit::{EventKind, RateLimitConfig, RateRule};
pub use network::engine::SyncEngine;
pub use network::server::{ServerConfig, SyncServer, SyncServerError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
