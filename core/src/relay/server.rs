//! Relay server accepting WebSocket connections and feeding them to the hub

use super::connection::{DeliveryError, WireSink, DEFAULT_LOCAL_QUEUE_CAPACITY};
use super::heartbeat::HeartbeatDriver;
use super::hub::{HubConfig, RelayHub};
use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Relay server configuration
#[derive(Debug, Clone)]
pub struct RelayServerConfig {
    /// Interface to listen on
    pub host: String,
    /// Port to listen on (0 = any free port)
    pub port: u16,
    /// Heartbeat period; `None` disables the heartbeat driver for the
    /// lifetime of the server
    pub heartbeat_interval: Option<Duration>,
    /// Inbound queue capacity of local terminals
    pub local_queue_capacity: usize,
    /// MESSAGE bodies longer than this are not relayed (None = no limit,
    /// the default)
    pub max_message_length: Option<usize>,
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5678,
            heartbeat_interval: Some(Duration::from_secs(60)),
            local_queue_capacity: DEFAULT_LOCAL_QUEUE_CAPACITY,
            max_message_length: None,
        }
    }
}

impl RelayServerConfig {
    fn hub_config(&self) -> HubConfig {
        HubConfig {
            local_queue_capacity: self.local_queue_capacity,
            max_message_length: self.max_message_length,
        }
    }
}

/// Relay server error types
#[derive(Debug, Error)]
pub enum RelayServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("WebSocket handshake failed: {0}")]
    Handshake(String),
}

type WsWriter = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Outbound half of an accepted WebSocket
struct WsSink(Mutex<WsWriter>);

#[async_trait]
impl WireSink for WsSink {
    async fn send_text(&self, text: String) -> Result<(), DeliveryError> {
        self.0
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))
    }
}

/// A running relay hub behind a WebSocket listener.
///
/// Dropping the server drops its shutdown sender, which stops the accept
/// loop, every connection task and the heartbeat driver without waiting for
/// them. [`RelayServer::shutdown`] does the same and waits.
pub struct RelayServer {
    hub: Arc<RelayHub>,
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    heartbeat: Option<HeartbeatDriver>,
}

impl RelayServer {
    /// Bind the listener and start accepting connections.
    ///
    /// The heartbeat driver starts here if an interval is configured;
    /// whether heartbeats run is fixed for the lifetime of the server.
    pub async fn bind(config: RelayServerConfig) -> Result<Self, RelayServerError> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| RelayServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| RelayServerError::NetworkError(e.to_string()))?;
        info!(%local_addr, "relay server listening");

        let hub = Arc::new(RelayHub::with_config(config.hub_config()));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(listener, Arc::clone(&hub), shutdown_rx));
        let heartbeat = config
            .heartbeat_interval
            .map(|interval| HeartbeatDriver::spawn(Arc::clone(&hub), interval));

        Ok(Self {
            hub,
            local_addr,
            shutdown,
            accept_task,
            heartbeat,
        })
    }

    pub fn hub(&self) -> &Arc<RelayHub> {
        &self.hub
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `ws://` URI of the listener
    pub fn uri(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    pub fn heartbeat_enabled(&self) -> bool {
        self.heartbeat.is_some()
    }

    /// Current heartbeat interval, `None` if heartbeats are disabled
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat.as_ref().map(HeartbeatDriver::interval)
    }

    /// Change the heartbeat interval.
    ///
    /// Returns false, changing nothing, when the server started without
    /// heartbeats.
    pub fn set_heartbeat_interval(&self, interval: Duration) -> bool {
        match &self.heartbeat {
            Some(driver) => {
                driver.set_interval(interval);
                true
            }
            None => {
                debug!("heartbeat disabled at start; interval change ignored");
                false
            }
        }
    }

    /// Stop heartbeats, then stop accepting and close every connection
    pub async fn shutdown(self) {
        if let Some(driver) = self.heartbeat {
            driver.stop().await;
        }
        let _ = self.shutdown.send(true);
        if let Err(e) = self.accept_task.await {
            warn!(error = %e, "accept task ended abnormally");
        }
        info!(local_addr = %self.local_addr, "relay server stopped");
    }
}

async fn accept_loop(listener: TcpListener, hub: Arc<RelayHub>, mut shutdown: watch::Receiver<bool>) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    connections.spawn(serve_connection(
                        stream,
                        addr,
                        Arc::clone(&hub),
                        shutdown.clone(),
                    ));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = shutdown.changed() => break,
        }
    }

    while connections.join_next().await.is_some() {}
}

async fn serve_connection(
    stream: TcpStream,
    addr: SocketAddr,
    hub: Arc<RelayHub>,
    mut shutdown: watch::Receiver<bool>,
) {
    let handshake = tokio::select! {
        handshake = tokio_tungstenite::accept_async(stream) => handshake,
        _ = shutdown.changed() => return,
    };
    let ws = match handshake {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%addr, error = %RelayServerError::Handshake(e.to_string()), "rejected connection");
            return;
        }
    };

    let (writer, reader) = ws.split();
    let sink = Arc::new(WsSink(Mutex::new(writer)));
    let id = hub.connect(Arc::clone(&sink) as Arc<dyn WireSink>).await;
    debug!(peer = %id, %addr, "connection accepted");

    read_loop(reader, id, &hub, shutdown).await;

    hub.disconnect(id).await;
    let _ = sink.0.lock().await.close().await;
}

async fn read_loop(
    mut reader: futures::stream::SplitStream<WebSocketStream<TcpStream>>,
    id: Uuid,
    hub: &RelayHub,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let frame = tokio::select! {
            frame = reader.next() => frame,
            _ = shutdown.changed() => return,
        };

        match frame {
            Some(Ok(Message::Text(text))) => hub.handle_text(&text, id).await,
            Some(Ok(Message::Binary(bytes))) => hub.handle_bytes(&bytes, id).await,
            Some(Ok(Message::Close(_))) | None => return,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!(peer = %id, error = %e, "read failed");
                return;
            }
        }
    }
}
