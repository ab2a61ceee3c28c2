//! Per-Connection Rate Limiting
//!
//! Fixed-window admission control keyed by connection and event kind.
//! Every event kind has its own budget, so a connection that exhausts its
//! chat budget can still draw.
//!
//! Rejection is silent backpressure: callers drop the event without
//! replying, mutating or broadcasting.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Inbound event kinds that carry an independent budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Stroke appended to history.
    Draw,
    /// Canvas reset.
    Clear,
    /// Cursor movement.
    Cursor,
    /// Chat message.
    Chat,
    /// History undo.
    Undo,
    /// History redo.
    Redo,
    /// Peer-connection setup (peer list, offer, answer, ice).
    Signaling,
}

/// Limit and window for one event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateRule {
    /// Events admitted per window.
    pub limit: u32,
    /// Window length.
    pub window: Duration,
}

impl RateRule {
    /// Rule admitting `limit` events per second.
    pub const fn per_second(limit: u32) -> Self {
        Self {
            limit,
            window: Duration::from_secs(1),
        }
    }
}

/// Rate limits for every event kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Draw events.
    pub draw: RateRule,
    /// Clear events.
    pub clear: RateRule,
    /// Cursor events.
    pub cursor: RateRule,
    /// Chat events.
    pub chat: RateRule,
    /// Undo events.
    pub undo: RateRule,
    /// Redo events.
    pub redo: RateRule,
    /// Signaling events.
    pub signaling: RateRule,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            draw: RateRule::per_second(180),
            clear: RateRule::per_second(30),
            cursor: RateRule::per_second(240),
            chat: RateRule::per_second(24),
            undo: RateRule::per_second(30),
            redo: RateRule::per_second(30),
            signaling: RateRule::per_second(120),
        }
    }
}

impl RateLimitConfig {
    /// Rule for an event kind.
    pub fn rule(&self, kind: EventKind) -> RateRule {
        match kind {
            EventKind::Draw => self.draw,
            EventKind::Clear => self.clear,
            EventKind::Cursor => self.cursor,
            EventKind::Chat => self.chat,
            EventKind::Undo => self.undo,
            EventKind::Redo => self.redo,
            EventKind::Signaling => self.signaling,
        }
    }

    /// Apply the same window length to every rule.
    pub fn with_window(mut self, window: Duration) -> Self {
        for rule in [
            &mut self.draw,
            &mut self.clear,
            &mut self.cursor,
            &mut self.chat,
            &mut self.undo,
            &mut self.redo,
            &mut self.signaling,
        ] {
            rule.window = window;
        }
        self
    }
}

/// Counter for one (connection, kind) pair.
#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window rate limiter.
///
/// Entries are never shared across keys. Callers must `forget` a key when
/// its connection goes away, otherwise the entry lives for the process.
pub struct RateLimiter<K> {
    windows: DashMap<K, HashMap<EventKind, Window>>,
}

impl<K: Eq + Hash + Clone> RateLimiter<K> {
    /// Create an empty limiter.
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }

    /// Count an event and report whether it exceeds the rule.
    pub fn should_reject(&self, key: &K, kind: EventKind, rule: RateRule) -> bool {
        self.should_reject_at(key, kind, rule, Instant::now())
    }

    /// Same as [`should_reject`](Self::should_reject) with an explicit clock.
    ///
    /// The first event for a key, or the first after the window expired,
    /// opens a new window with `count = 1`. Later events increment the
    /// count and are rejected once it exceeds `rule.limit`.
    pub fn should_reject_at(&self, key: &K, kind: EventKind, rule: RateRule, now: Instant) -> bool {
        let mut windows = self.windows.entry(key.clone()).or_default();
        let window = windows.entry(kind).or_insert(Window {
            count: 0,
            reset_at: now,
        });

        if now >= window.reset_at {
            window.count = 0;
            window.reset_at = now + rule.window;
        }
        window.count = window.count.saturating_add(1);
        window.count > rule.limit
    }

    /// Drop every window held for `key`.
    pub fn forget(&self, key: &K) {
        self.windows.remove(key);
    }

    /// Number of keys with live windows.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

impl<K: Eq + Hash + Clone> Default for RateLimiter<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULE: RateRule = RateRule {
        limit: 3,
        window: Duration::from_millis(1000),
    };

    #[test]
    fn test_admits_exactly_limit() {
        let limiter = RateLimiter::new();
        let t0 = Instant::now();

        for i in 0..3 {
            assert!(
                !limiter.should_reject_at(&1u32, EventKind::Draw, RULE, t0),
                "event {} should be admitted",
                i
            );
        }
        assert!(limiter.should_reject_at(&1u32, EventKind::Draw, RULE, t0));
        assert!(limiter.should_reject_at(&1u32, EventKind::Draw, RULE, t0 + Duration::from_millis(999)));
    }

    #[test]
    fn test_window_expiry_resets() {
        let limiter = RateLimiter::new();
        let t0 = Instant::now();

        for _ in 0..4 {
            limiter.should_reject_at(&1u32, EventKind::Chat, RULE, t0);
        }
        assert!(limiter.should_reject_at(&1u32, EventKind::Chat, RULE, t0));

        let later = t0 + RULE.window;
        for _ in 0..3 {
            assert!(!limiter.should_reject_at(&1u32, EventKind::Chat, RULE, later));
        }
        assert!(limiter.should_reject_at(&1u32, EventKind::Chat, RULE, later));
    }

    #[test]
    fn test_kinds_are_independent() {
        let limiter = RateLimiter::new();
        let t0 = Instant::now();

        for _ in 0..10 {
            limiter.should_reject_at(&1u32, EventKind::Chat, RULE, t0);
        }
        assert!(limiter.should_reject_at(&1u32, EventKind::Chat, RULE, t0));
        assert!(!limiter.should_reject_at(&1u32, EventKind::Draw, RULE, t0));
        assert!(!limiter.should_reject_at(&1u32, EventKind::Undo, RULE, t0));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new();
        let t0 = Instant::now();

        for _ in 0..10 {
            limiter.should_reject_at(&1u32, EventKind::Cursor, RULE, t0);
        }
        assert!(limiter.should_reject_at(&1u32, EventKind::Cursor, RULE, t0));
        assert!(!limiter.should_reject_at(&2u32, EventKind::Cursor, RULE, t0));
    }

    #[test]
    fn test_forget_drops_state() {
        let limiter = RateLimiter::new();
        let t0 = Instant::now();

        for _ in 0..4 {
            limiter.should_reject_at(&7u32, EventKind::Redo, RULE, t0);
        }
        assert_eq!(limiter.tracked_keys(), 1);

        limiter.forget(&7u32);
        assert_eq!(limiter.tracked_keys(), 0);
        assert!(!limiter.should_reject_at(&7u32, EventKind::Redo, RULE, t0));
    }

    #[test]
    fn test_zero_limit_rejects_everything() {
        let limiter = RateLimiter::new();
        let rule = RateRule::per_second(0);
        assert!(limiter.should_reject(&1u32, EventKind::Signaling, rule));
        assert!(limiter.should_reject(&1u32, EventKind::Signaling, rule));
    }

    #[test]
    fn test_default_limits() {
        let config = RateLimitConfig::default();
        assert_eq!(config.rule(EventKind::Draw).limit, 180);
        assert_eq!(config.rule(EventKind::Cursor).limit, 240);
        assert_eq!(config.rule(EventKind::Chat).limit, 24);
        assert_eq!(config.rule(EventKind::Undo).limit, 30);
        assert_eq!(config.rule(EventKind::Redo).limit, 30);
        assert_eq!(config.rule(EventKind::Chat).window, Duration::from_secs(1));
    }

    #[test]
    fn test_with_window_applies_to_all() {
        let config = RateLimitConfig::default().with_window(Duration::from_secs(60));
        assert_eq!(config.draw.window, Duration::from_secs(60));
        assert_eq!(config.signaling.window, Duration::from_secs(60));
        assert_eq!(config.draw.limit, 180);
    }
}
