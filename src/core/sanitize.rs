//! Input Sanitization
//!
//! Stateless checks applied to every user-supplied field before it is
//! stored or broadcast:
//! - HTML entity escaping with length truncation
//! - Session identifier shape checks
//!
//! Escaping is the only injection defense in the system. Clients render
//! names, colors and chat bodies as trusted strings.

use serde_json::Value;

/// Maximum length of a display name (characters).
pub const MAX_NAME_LEN: usize = 24;

/// Maximum length of a color tag (characters).
pub const MAX_COLOR_LEN: usize = 16;

/// Maximum length of a chat body (characters).
pub const MAX_CHAT_LEN: usize = 280;

/// Session identifiers must be strictly longer than this.
pub const MIN_SESSION_ID_LEN: usize = 8;

/// Upper bound on session identifier length.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Escape the five HTML-significant characters after truncating to `max_len` chars.
///
/// Truncation happens before escaping, so the output may be longer than
/// `max_len` when entities are substituted.
pub fn escape_html(input: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(input.len().min(max_len * 4));
    for ch in input.chars().take(max_len) {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Sanitize an untyped JSON field into display text.
///
/// Non-string values become the empty string. Strings are trimmed,
/// truncated to `max_len` characters and entity-escaped.
pub fn sanitize_text(value: &Value, max_len: usize) -> String {
    match value {
        Value::String(s) => escape_html(s.trim(), max_len),
        _ => String::new(),
    }
}

/// Cheap well-formedness check for a session identifier.
///
/// Not a secret and not a cryptographic check: any caller holding an id
/// of the right shape may join.
pub fn is_valid_session_id(id: &str) -> bool {
    let len = id.chars().count();
    len > MIN_SESSION_ID_LEN && len <= MAX_SESSION_ID_LEN
}
