//! Canvas Domain Module
//!
//! Session state and snapshot derivation. Synchronous and transport-free.
//!
//! ## Module Structure
//!
//! - `document`: Base document parsing and object-list replacement
//! - `state`: Per-session history, redo stack and chat log

pub mod document;
pub mod state;

// Re-export key types
pub use document::Document;
pub use state::{ChatMessage, ConnectionId, SessionState, MAX_CHAT, MAX_HISTORY};
