//! WebSocket connector.
//!
//! Each connection gets a writer task and a reader task bridging the socket
//! to a [`Link`]'s channels. Only text frames are forwarded; binary frames are
//! accepted if they are valid UTF-8.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use super::error::TransportError;
use super::link::{Connector, Link};

/// Opens `ws://` links.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, address: &str) -> Result<Link, TransportError> {
        let (stream, _) = connect_async(address)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        debug!(address, "websocket connected");

        let (mut sink, mut source) = stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(frame)).await {
                    warn!(error = %e, "websocket write failed");
                    break;
                }
            }
            let _ = sink.close().await;
            trace!("websocket writer finished");
        });

        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                let frame = match message {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(_) => {
                            debug!("dropping non-utf8 binary frame");
                            continue;
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        debug!(error = %e, "websocket read failed");
                        break;
                    }
                };
                if in_tx.send(frame).is_err() {
                    break;
                }
            }
            trace!("websocket reader finished");
        });

        Ok(Link::new(out_tx, in_rx))
    }
}
