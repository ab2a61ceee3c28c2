//! Process configuration.
//!
//! Every setting comes from an environment variable and every variable is
//! optional. A variable that is set but does not parse is a startup error.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::core::rate_limit::{RateLimitConfig, RateRule};
use crate::network::server::ServerConfig;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable held an unusable value.
    #[error("Invalid value {value:?} for {key}")]
    Invalid {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },
}

/// Full process configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Transport settings.
    pub server: ServerConfig,
    /// Per-event rate limits.
    pub limits: RateLimitConfig,
}

impl Config {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `SYNC_BIND_ADDR` | `0.0.0.0:$PORT` |
    /// | `PORT` | `3000` |
    /// | `SYNC_MAX_CONNECTIONS` | `1000` |
    /// | `SYNC_MAX_MESSAGE_BYTES` | `1048576` |
    /// | `SYNC_HANDSHAKE_TIMEOUT_SECS` | `10` |
    /// | `SYNC_OUTBOUND_BUFFER` | `256` |
    /// | `SYNC_RATE_WINDOW_MS` | `1000` |
    /// | `SYNC_RATE_DRAW` | `180` |
    /// | `SYNC_RATE_CURSOR` | `240` |
    /// | `SYNC_RATE_CHAT` | `24` |
    /// | `SYNC_RATE_UNDO` | `30` |
    /// | `SYNC_RATE_REDO` | `30` |
    /// | `SYNC_RATE_CLEAR` | `30` |
    /// | `SYNC_RATE_SIGNALING` | `120` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_fn(|key| std::env::var(key).ok())
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ServerConfig::default();

        let port: u16 = parse_or(&env, "PORT", defaults.bind_addr.port())?;
        let bind_addr = parse_or(&env, "SYNC_BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], port)))?;

        let server = ServerConfig {
            bind_addr,
            max_connections: parse_positive(&env, "SYNC_MAX_CONNECTIONS", defaults.max_connections)?,
            handshake_timeout: Duration::from_secs(parse_positive(
                &env,
                "SYNC_HANDSHAKE_TIMEOUT_SECS",
                defaults.handshake_timeout.as_secs(),
            )?),
            outbound_buffer: parse_positive(&env, "SYNC_OUTBOUND_BUFFER", defaults.outbound_buffer)?,
            max_message_bytes: parse_positive(&env, "SYNC_MAX_MESSAGE_BYTES", defaults.max_message_bytes)?,
            version: defaults.version,
        };

        let base = RateLimitConfig::default();
        let window = Duration::from_millis(parse_positive(&env, "SYNC_RATE_WINDOW_MS", 1000u64)?);
        let rule = |key: &str, fallback: RateRule| -> Result<RateRule, ConfigError> {
            Ok(RateRule {
                limit: parse_or(&env, key, fallback.limit)?,
                window,
            })
        };

        let limits = RateLimitConfig {
            draw: rule("SYNC_RATE_DRAW", base.draw)?,
            clear: rule("SYNC_RATE_CLEAR", base.clear)?,
            cursor: rule("SYNC_RATE_CURSOR", base.cursor)?,
            chat: rule("SYNC_RATE_CHAT", base.chat)?,
            undo: rule("SYNC_RATE_UNDO", base.undo)?,
            redo: rule("SYNC_RATE_REDO", base.redo)?,
            signaling: rule("SYNC_RATE_SIGNALING", base.signaling)?,
        };

        Ok(Self { server, limits })
    }
}

fn parse_or<F, T>(env: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match env(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value: raw,
        }),
    }
}

/// Like [`parse_or`], but zero is rejected.
fn parse_positive<F, T>(env: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialEq + Default,
{
    let value = parse_or(env, key, default)?;
    if value == T::default() {
        return Err(ConfigError::Invalid {
            key: key.to_string(),
            value: env(key).unwrap_or_default(),
        });
    }
    Ok(value)
}
