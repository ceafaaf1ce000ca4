//! WebSocket client for the OKX v3 feed
//!
//! Thin transport wrapper: connects, surfaces raw frames and answers
//! protocol-level pings. Frame decoding lives in the parser.

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::error::{FeedError, Result};
use crate::parser::FeedFrame;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client for a single feed connection
pub struct FeedClient {
    stream: Option<WsStream>,
    endpoint: String,
}

impl FeedClient {
    /// Create a new feed client
    pub fn new(endpoint: &str) -> Self {
        Self {
            stream: None,
            endpoint: endpoint.to_string(),
        }
    }

    /// Connect to the feed endpoint
    pub async fn connect(&mut self) -> Result<()> {
        info!(url = %self.endpoint, "Connecting to feed WebSocket");

        let (ws_stream, response) = connect_async(&self.endpoint)
            .await
            .map_err(|e| FeedError::Transport(format!("Failed to connect: {}", e)))?;

        info!(status = ?response.status(), "WebSocket connected");
        self.stream = Some(ws_stream);

        Ok(())
    }

    /// Receive the next raw frame.
    ///
    /// Returns `Ok(None)` for protocol-level control frames.
    pub async fn recv(&mut self) -> Result<Option<FeedFrame>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| FeedError::Transport("Not connected".to_string()))?;

        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                debug!(len = text.len(), "Received text frame");
                Ok(Some(FeedFrame::Text(text)))
            }
            Some(Ok(Message::Binary(data))) => {
                debug!(len = data.len(), "Received binary frame");
                Ok(Some(FeedFrame::Binary(data)))
            }
            Some(Ok(Message::Ping(data))) => {
                debug!("Received ping, sending pong");
                if let Some(stream) = self.stream.as_mut() {
                    let _ = stream.send(Message::Pong(data)).await;
                }
                Ok(None)
            }
            Some(Ok(Message::Pong(_))) => {
                debug!("Received pong");
                Ok(None)
            }
            Some(Ok(Message::Close(frame))) => {
                warn!(frame = ?frame, "Received close frame");
                self.stream = None;
                Err(FeedError::Transport("Connection closed".to_string()))
            }
            Some(Ok(Message::Frame(_))) => Ok(None),
            Some(Err(e)) => {
                error!(error = %e, "WebSocket error");
                self.stream = None;
                Err(FeedError::Transport(e.to_string()))
            }
            None => {
                warn!("WebSocket stream ended");
                self.stream = None;
                Err(FeedError::Transport("Stream ended".to_string()))
            }
        }
    }

    /// Send a literal text payload (keepalive requests)
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        if let Some(stream) = self.stream.as_mut() {
            stream
                .send(Message::Text(text.to_string()))
                .await
                .map_err(|e| FeedError::Transport(e.to_string()))?;
        }
        Ok(())
    }

    /// Serialize a command as JSON and send it
    pub async fn send_json<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let payload = serde_json::to_string(value)?;
        self.send_text(&payload).await
    }

    /// Whether the transport is open and writable
    pub fn is_ready(&self) -> bool {
        self.stream.is_some()
    }

    /// Close the connection
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
    }
}
