//! Transport seam between the connection manager and the classifier.
//!
//! A [`Connector`] opens one [`Link`] per connection attempt. The link is a
//! pair of queues, so the connection manager never touches a socket and tests
//! can drive it with [`Link::pair`].

pub mod websocket;

pub use websocket::WebSocketConnector;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::TransportError;
use crate::protocol::Endpoint;

/// Outbound frame queue depth used when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

/// Opens links to the classification service.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a new link.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the service cannot be reached.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Link, TransportError>;
}

/// Payload received from the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Debug)]
pub enum LinkEvent {
    Message(InboundMessage),
    /// The link ended; `None` is an orderly close.
    Closed(Option<TransportError>),
}

/// Result of queueing one outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Queued,
    /// Queue full; the frame was dropped.
    Full,
    /// The far side is gone.
    Closed,
}

/// One connection instance.
#[derive(Debug)]
pub struct Link {
    id: Uuid,
    outbound: mpsc::Sender<Vec<u8>>,
    inbound: mpsc::Receiver<LinkEvent>,
}

/// The far side of a [`Link`], held by the transport adapter.
#[derive(Debug)]
pub struct LinkPeer {
    pub frames: mpsc::Receiver<Vec<u8>>,
    pub events: mpsc::Sender<LinkEvent>,
}

impl Link {
    /// Create a connected link and its peer.
    #[must_use]
    pub fn pair(capacity: usize) -> (Self, LinkPeer) {
        let capacity = capacity.max(1);
        let (outbound, frames) = mpsc::channel(capacity);
        let (events, inbound) = mpsc::channel(capacity);
        let link = Self {
            id: Uuid::new_v4(),
            outbound,
            inbound,
        };
        (link, LinkPeer { frames, events })
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue a frame without waiting.
    pub fn try_send(&self, frame: Vec<u8>) -> SendOutcome {
        match self.outbound.try_send(frame) {
            Ok(()) => SendOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => SendOutcome::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Next event from the service; `None` once the peer is dropped.
    ///
    /// Cancel safe.
    pub async fn recv(&mut self) -> Option<LinkEvent> {
        self.inbound.recv().await
    }
}

impl LinkPeer {
    /// Deliver a text message to the link owner. Returns `false` if the link is gone.
    pub async fn push_text(&self, text: impl Into<String>) -> bool {
        self.events
            .send(LinkEvent::Message(InboundMessage::Text(text.into())))
            .await
            .is_ok()
    }
}
