/// WebSocket push transport for the market snapshot feed
///
/// Wraps the socket's open / message / close events in a single future
/// (the handshake) followed by a stream of text frames that ends when the
/// server closes the connection.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

use super::error::SyncError;

/// Raw text frames from an open push channel; ends on close, yields `Err` on socket error
pub type FrameStream = BoxStream<'static, Result<String, SyncError>>;

/// A push channel that can be (re)opened on demand
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Resolve once the handshake succeeds or fails
    async fn connect(&self) -> Result<FrameStream, SyncError>;

    fn describe(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl PushTransport for WebSocketTransport {
    async fn connect(&self) -> Result<FrameStream, SyncError> {
        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| SyncError::Handshake(e.to_string()))?;

        // Dropping the stream drops the socket, so teardown needs no explicit close
        let frames = ws_stream.filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => Some(
                    String::from_utf8(bytes.to_vec())
                        .map_err(|e| SyncError::Frame(format!("binary frame is not utf-8: {e}"))),
                ),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "Server closed connection");
                    None
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {
                    // Heartbeat messages - tungstenite handles these automatically
                    None
                }
                Err(e) => Some(Err(SyncError::from(e))),
            }
        });

        Ok(frames.boxed())
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
