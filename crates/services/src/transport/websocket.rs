//! WebSocket adapter built on tokio-tungstenite.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use super::{Connector, InboundMessage, Link, LinkEvent, LinkPeer, DEFAULT_QUEUE_CAPACITY};
use crate::error::TransportError;
use crate::protocol::Endpoint;

/// Opens one WebSocket per link and pumps it from two background tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Link, TransportError> {
        let (stream, _response) = tokio_tungstenite::connect_async(endpoint.as_str()).await?;
        let (mut sink, mut source) = stream.split();
        let (link, peer) = Link::pair(DEFAULT_QUEUE_CAPACITY);
        let LinkPeer { mut frames, events } = peer;
        let link_id = link.id();
        info!(%link_id, %endpoint, "websocket open");

        // Writer: ends when the link owner drops its sender.
        tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                if let Err(err) = sink.send(Message::Binary(frame)).await {
                    debug!(%link_id, error = %err, "websocket write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Reader: forwards messages until the socket ends or the owner goes away.
        tokio::spawn(async move {
            let reason = loop {
                let message = match source.next().await {
                    Some(Ok(Message::Text(text))) => InboundMessage::Text(text),
                    Some(Ok(Message::Binary(bytes))) => InboundMessage::Binary(bytes),
                    Some(Ok(Message::Close(_))) | None => break None,
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => break Some(TransportError::from(err)),
                };
                if events.send(LinkEvent::Message(message)).await.is_err() {
                    return;
                }
            };
            debug!(%link_id, "websocket closed");
            let _ = events.send(LinkEvent::Closed(reason)).await;
        });

        Ok(link)
    }
}
