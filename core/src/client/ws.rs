//! WebSocket transport: a terminal talking to a remote hub

use super::{ClientError, ClientTransport, TerminalClient};
use crate::protocol::{decode_envelope, decode_envelope_bytes, encode_envelope, Envelope};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{info, warn};

/// Terminal connected to a hub over WebSocket
pub type WsTerminal = TerminalClient<WsTransport>;

pub struct WsTransport {
    uri: String,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTransport {
    /// Dial the hub at `uri` (`ws://host:port`)
    pub async fn connect(uri: &str) -> Result<Self, ClientError> {
        let (stream, _response) = tokio_tungstenite::connect_async(uri)
            .await
            .map_err(|e| ClientError::ConnectionFailed(format!("{}: {}", uri, e)))?;
        info!(uri, "connected to hub");

        Ok(Self {
            uri: uri.trim_end_matches('/').to_string(),
            stream,
        })
    }

    /// Send a close frame
    pub async fn close(&mut self) -> Result<(), ClientError> {
        self.stream
            .close(None)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }
}

#[async_trait]
impl ClientTransport for WsTransport {
    async fn recv(&mut self) -> Result<Envelope, ClientError> {
        loop {
            let decoded = match self.stream.next().await {
                Some(Ok(Message::Text(text))) => decode_envelope(&text),
                Some(Ok(Message::Binary(bytes))) => decode_envelope_bytes(&bytes),
                Some(Ok(Message::Close(_))) | None => return Err(ClientError::ConnectionClosed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(ClientError::Transport(e.to_string())),
            };
            match decoded {
                Ok(envelope) => return Ok(envelope),
                Err(e) => warn!(uri = %self.uri, error = %e, "skipping malformed frame"),
            }
        }
    }

    async fn send(&mut self, envelope: Envelope) -> Result<(), ClientError> {
        let text = encode_envelope(&envelope)?;
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    fn server_uri(&self) -> Option<&str> {
        Some(&self.uri)
    }
}

impl TerminalClient<WsTransport> {
    /// Dial the hub and wait for this terminal's id
    pub async fn connect(uri: &str) -> Result<Self, ClientError> {
        let mut client = Self::new(WsTransport::connect(uri).await?);
        client.register().await?;
        Ok(client)
    }
}
