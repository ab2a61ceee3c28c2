//! Core stateless primitives.
//!
//! Input sanitization and admission control. Nothing in this module knows
//! about sessions or the wire protocol.

pub mod sanitize;
pub mod rate_limit;

// Re-export core types
pub use sanitize::{sanitize_text, escape_html, is_valid_session_id};
pub use rate_limit::{EventKind, RateLimiter, RateLimitConfig, RateRule};
