//! WebSocket relay link
//!
//! Client-side WebSocket wiring for the transport. Pumps text frames
//! between the socket and the transport's channel pair; any socket error
//! or close drops the channel, which the transport sees as a disconnect
//! and answers with its fixed-delay retry.

use crate::error::TransportError;
use crate::transport::{LinkChannel, RelayLink};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const CLIENT_QUEUE: usize = 64;

/// Relay link over a `ws://` / `wss://` URL
#[derive(Debug, Clone)]
pub struct WsLink {
    url: String,
}

impl WsLink {
    /// Link to a relay WebSocket endpoint
    #[inline]
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl RelayLink for WsLink {
    async fn open(&self) -> Result<LinkChannel, TransportError> {
        let (socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;
        let (mut sink, mut stream) = socket.split();

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(CLIENT_QUEUE);
        let (inbound_tx, inbound_rx) = mpsc::channel::<String>(CLIENT_QUEUE);

        // Transport -> socket.
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Socket -> transport. Dropping inbound_tx signals disconnect.
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if inbound_tx.send(text).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        });

        Ok(LinkChannel {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
