//! WebSocket Sync Server
//!
//! Async WebSocket transport in front of the [`SyncEngine`]. Each connection
//! gets a reader that feeds decoded messages to the engine in arrival order
//! and a writer that drains its bounded outbound queue into the socket.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{accept_async_with_config, tungstenite::Message};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::ConfigError;
use crate::core::rate_limit::RateLimitConfig;
use crate::network::engine::SyncEngine;
use crate::network::protocol::{ClientMessage, ServerMessage};
use crate::network::registry::SessionRegistry;

/// How long a closing connection may spend flushing its outbound queue.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// WebSocket handshake timeout.
    pub handshake_timeout: Duration,
    /// Per-connection outbound queue depth.
    pub outbound_buffer: usize,
    /// Largest accepted inbound message, in bytes.
    pub max_message_bytes: usize,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            max_connections: 1000,
            handshake_timeout: Duration::from_secs(10),
            outbound_buffer: 256,
            max_message_bytes: 1024 * 1024,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Sync server errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Handshake did not complete in time.
    #[error("WebSocket handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Decrements the live connection count when a connection task ends.
struct ConnectionSlot(Arc<AtomicUsize>);

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The sync server.
pub struct SyncServer {
    /// Server configuration.
    config: ServerConfig,
    /// Event orchestrator.
    engine: Arc<SyncEngine>,
    /// Live connection count.
    connections: Arc<AtomicUsize>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl SyncServer {
    /// Create a new sync server.
    pub fn new(config: ServerConfig, limits: RateLimitConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            engine: Arc::new(SyncEngine::new(Arc::new(SessionRegistry::new()), limits)),
            connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), SyncServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Sync server listening on {}", self.config.bind_addr);
        self.serve(listener).await
    }

    /// Serve connections from an already-bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), SyncServerError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let Some(slot) = self.claim_slot() else {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            };

                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr, slot);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Reserve a connection slot if under the cap.
    fn claim_slot(&self) -> Option<ConnectionSlot> {
        let max = self.config.max_connections;
        self.connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .ok()
            .map(|_| ConnectionSlot(self.connections.clone()))
    }

    /// Handle a new TCP connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr, slot: ConnectionSlot) {
        let engine = self.engine.clone();
        let config = self.config.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let _slot = slot;
            if let Err(e) = Self::serve_connection(stream, addr, engine, config, shutdown_rx).await {
                warn!("Connection {} ended with error: {}", addr, e);
            }
        });
    }

    /// Run one WebSocket connection to completion.
    async fn serve_connection(
        stream: TcpStream,
        addr: SocketAddr,
        engine: Arc<SyncEngine>,
        config: ServerConfig,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), SyncServerError> {
        let ws_config = WebSocketConfig {
            max_message_size: Some(config.max_message_bytes),
            max_frame_size: Some(config.max_message_bytes),
            ..WebSocketConfig::default()
        };
        let ws_stream = tokio::time::timeout(
            config.handshake_timeout,
            accept_async_with_config(stream, Some(ws_config)),
        )
        .await
        .map_err(|_| SyncServerError::HandshakeTimeout(config.handshake_timeout))??;

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(config.outbound_buffer);

        let mut conn = engine.connect(msg_tx);
        let conn_id = conn.id();
        info!("Client {} connected as {}", addr, conn_id);

        // Writer ends once every sender for this queue is dropped.
        let mut writer = tokio::spawn(async move {
            while let Some(msg) = msg_rx.recv().await {
                let text = match msg.to_json() {
                    Ok(t) => t,
                    Err(e) => {
                        error!("Failed to serialize message: {}", e);
                        continue;
                    }
                };
                if ws_sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = ws_sender.close().await;
        });

        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => match ClientMessage::from_json(&text) {
                            Ok(client_msg) => engine.handle(&mut conn, client_msg),
                            Err(e) => trace!("Malformed message from {}: {}", conn_id, e),
                        },
                        Some(Ok(Message::Binary(data))) => match ClientMessage::from_bytes(&data) {
                            Ok(client_msg) => engine.handle(&mut conn, client_msg),
                            Err(e) => trace!("Malformed binary message from {}: {}", conn_id, e),
                        },
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("Client {} disconnected", conn_id);
                            break;
                        }
                        Some(Err(e)) => {
                            debug!("WebSocket error for {}: {}", conn_id, e);
                            break;
                        }
                        // Ping/pong are answered by tungstenite.
                        Some(Ok(_)) => {}
                    }
                }
                _ = shutdown_rx.recv() => {
                    let _ = conn.outbound().try_send(ServerMessage::Shutdown {
                        reason: "Server shutting down".to_string(),
                    });
                    break;
                }
            }
        }

        engine.disconnect(conn);

        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
            writer.abort();
        }

        info!("Client {} ({}) cleaned up", conn_id, addr);
        Ok(())
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Get active session count.
    pub fn session_count(&self) -> usize {
        self.engine.session_count()
    }

    /// Server version string.
    pub fn version(&self) -> &str {
        &self.config.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.outbound_buffer, 256);
        assert_eq!(config.max_message_bytes, 1024 * 1024);
    }

    #[tokio::test]
    async fn test_server_creation() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = SyncServer::new(config, RateLimitConfig::default());

        assert_eq!(server.connection_count(), 0);
        assert_eq!(server.session_count(), 0);
        assert_eq!(server.version(), env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_connection_cap() {
        let config = ServerConfig {
            max_connections: 1,
            ..Default::default()
        };
        let server = SyncServer::new(config, RateLimitConfig::default());

        let first = server.claim_slot();
        assert!(first.is_some());
        assert!(server.claim_slot().is_none());
        assert_eq!(server.connection_count(), 1);

        drop(first);
        assert_eq!(server.connection_count(), 0);
        assert!(server.claim_slot().is_some());
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let server = Arc::new(SyncServer::new(ServerConfig::default(), RateLimitConfig::default()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let handle = {
            let server = server.clone();
            tokio::spawn(async move { server.serve(listener).await })
        };
        // Give the accept loop a chance to subscribe.
        tokio::time::sleep(Duration::from_millis(20)).await;
        server.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }
}
