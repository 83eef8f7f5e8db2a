//! Lifecycle of the link to the classification service.
//!
//! The manager is an explicit state machine owned by the session loop. It
//! holds at most one connect attempt, one live link and one reconnect timer;
//! dropping any of them cancels it.

use std::fmt;
use std::future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::error::TransportError;
use crate::protocol::Endpoint;
use crate::transport::{Connector, InboundMessage, Link, LinkEvent, SendOutcome};

/// Delay before a lost connection is retried.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
        };
        f.write_str(label)
    }
}

/// What happened on the connection since the last call to `next_event`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Opened {
        link_id: Uuid,
    },
    Message {
        link_id: Uuid,
        message: InboundMessage,
    },
    /// The attempt failed or the link dropped; a reconnect is scheduled.
    Lost {
        link_id: Option<Uuid>,
        reason: String,
    },
    /// The reconnect timer fired and a new attempt started.
    Reconnecting,
}

/// Counters reported when the session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub attempts: u64,
    pub reconnects_scheduled: u64,
    pub frames_queued: u64,
    pub frames_dropped: u64,
}

pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    endpoint: Endpoint,
    reconnect_delay: Duration,
    state: ConnectionState,
    pending: Option<JoinHandle<Result<Link, TransportError>>>,
    link: Option<Link>,
    reconnect: Option<Pin<Box<Sleep>>>,
    transitions: Vec<ConnectionState>,
    stats: ConnectionStats,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, endpoint: Endpoint) -> Self {
        Self {
            connector,
            endpoint,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            state: ConnectionState::Disconnected,
            pending: None,
            link: None,
            reconnect: None,
            transitions: Vec::new(),
            stats: ConnectionStats::default(),
        }
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    #[must_use]
    pub fn reconnect_pending(&self) -> bool {
        self.reconnect.is_some()
    }

    #[must_use]
    pub fn link_id(&self) -> Option<Uuid> {
        self.link.as_ref().map(Link::id)
    }

    #[must_use]
    pub fn stats(&self) -> ConnectionStats {
        self.stats
    }

    /// State changes recorded since the last drain, oldest first.
    pub fn drain_transitions(&mut self) -> Vec<ConnectionState> {
        std::mem::take(&mut self.transitions)
    }

    /// Start a connection attempt.
    ///
    /// Ignored while connecting or open. Supersedes a scheduled reconnect.
    pub fn connect(&mut self) {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            debug!(state = %self.state, "connect ignored");
            return;
        }

        self.reconnect = None;
        self.stats.attempts += 1;
        let connector = Arc::clone(&self.connector);
        let endpoint = self.endpoint.clone();
        self.pending = Some(tokio::spawn(
            async move { connector.connect(&endpoint).await },
        ));
        info!(endpoint = %self.endpoint, attempt = self.stats.attempts, "connecting");
        self.set_state(ConnectionState::Connecting);
    }

    /// Queue a frame on the open link.
    ///
    /// A silent no-op unless the connection is open. Returns whether the frame
    /// was queued.
    pub fn send(&mut self, frame: Vec<u8>) -> bool {
        if self.state != ConnectionState::Open {
            return false;
        }
        let Some(link) = self.link.as_ref() else {
            return false;
        };

        match link.try_send(frame) {
            SendOutcome::Queued => {
                self.stats.frames_queued += 1;
                trace!(link_id = %link.id(), "frame queued");
                true
            }
            SendOutcome::Full => {
                self.stats.frames_dropped += 1;
                trace!(link_id = %link.id(), "outbound queue full, frame dropped");
                false
            }
            // The inbound side reports the loss.
            SendOutcome::Closed => false,
        }
    }

    /// Tear everything down without scheduling a reconnect.
    pub fn close(&mut self) {
        let idle = self.state == ConnectionState::Disconnected
            && self.pending.is_none()
            && self.reconnect.is_none();
        if idle {
            return;
        }

        self.set_state(ConnectionState::Closing);
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        if let Some(link) = self.link.take() {
            info!(link_id = %link.id(), "closing link");
        }
        self.reconnect = None;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Wait for the next connection event.
    ///
    /// Cancel safe: it only awaits the connect task, the live link or the
    /// reconnect timer, and never completes when none of them exists.
    pub async fn next_event(&mut self) -> ConnectionEvent {
        if let Some(pending) = self.pending.as_mut() {
            let joined = pending.await;
            self.pending = None;
            return match joined {
                Ok(Ok(link)) => self.opened(link),
                Ok(Err(err)) => self.lose(None, err.to_string()),
                Err(err) => {
                    let reason = TransportError::ConnectTask(err.to_string()).to_string();
                    self.lose(None, reason)
                }
            };
        }

        if let Some(link) = self.link.as_mut() {
            let link_id = link.id();
            let event = link.recv().await;
            return match event {
                Some(LinkEvent::Message(message)) => ConnectionEvent::Message { link_id, message },
                Some(LinkEvent::Closed(Some(err))) => self.lose(Some(link_id), err.to_string()),
                Some(LinkEvent::Closed(None)) | None => {
                    self.lose(Some(link_id), "closed by peer".to_owned())
                }
            };
        }

        if let Some(timer) = self.reconnect.as_mut() {
            timer.as_mut().await;
            self.reconnect = None;
            self.connect();
            return ConnectionEvent::Reconnecting;
        }

        future::pending().await
    }

    fn opened(&mut self, link: Link) -> ConnectionEvent {
        let link_id = link.id();
        info!(%link_id, "connection open");
        self.link = Some(link);
        self.set_state(ConnectionState::Open);
        ConnectionEvent::Opened { link_id }
    }

    fn lose(&mut self, link_id: Option<Uuid>, reason: String) -> ConnectionEvent {
        // In-flight frames and unread messages of the old instance go with it.
        self.link = None;
        self.set_state(ConnectionState::Disconnected);
        self.reconnect = Some(Box::pin(tokio::time::sleep(self.reconnect_delay)));
        self.stats.reconnects_scheduled += 1;
        warn!(
            link_id = ?link_id,
            %reason,
            delay_ms = self.reconnect_delay.as_millis() as u64,
            "connection lost, reconnect scheduled"
        );
        ConnectionEvent::Lost { link_id, reason }
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "connection state");
            self.state = next;
            self.transitions.push(next);
        }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .field("link_id", &self.link_id())
            .field("reconnect_pending", &self.reconnect.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LinkPeer;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    /// Refuses the first `refuse` attempts, then hands out channel links.
    struct FakeConnector {
        attempts: AtomicUsize,
        refuse: usize,
        peers: Mutex<Option<mpsc::UnboundedSender<LinkPeer>>>,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self, _endpoint: &Endpoint) -> Result<Link, TransportError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.refuse {
                return Err(TransportError::Refused("fake".into()));
            }
            let (link, peer) = Link::pair(4);
            if let Some(peers) = self.peers.lock().unwrap().as_ref() {
                let _ = peers.send(peer);
            }
            Ok(link)
        }
    }

    fn manager(refuse: usize) -> (ConnectionManager, Arc<FakeConnector>, mpsc::UnboundedReceiver<LinkPeer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(FakeConnector {
            attempts: AtomicUsize::new(0),
            refuse,
            peers: Mutex::new(Some(tx)),
        });
        let endpoint = Endpoint::parse("ws://localhost:8001/ws/predict").unwrap();
        let manager = ConnectionManager::new(connector.clone(), endpoint);
        (manager, connector, rx)
    }

    #[tokio::test]
    async fn send_is_a_no_op_until_open() {
        let (mut manager, _connector, mut peers) = manager(0);
        assert!(!manager.send(vec![1]));

        manager.connect();
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert!(!manager.send(vec![1]));

        assert!(matches!(manager.next_event().await, ConnectionEvent::Opened { .. }));
        assert!(manager.send(vec![7]));
        let mut peer = peers.recv().await.unwrap();
        assert_eq!(peer.frames.recv().await, Some(vec![7]));
        assert_eq!(
            manager.drain_transitions(),
            vec![ConnectionState::Connecting, ConnectionState::Open]
        );
    }

    #[tokio::test]
    async fn connect_is_ignored_while_connecting_or_open() {
        let (mut manager, connector, _peers) = manager(0);
        manager.connect();
        manager.connect();
        assert!(matches!(manager.next_event().await, ConnectionEvent::Opened { .. }));
        manager.connect();
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(manager.stats().attempts, 1);
    }

    #[tokio::test]
    async fn messages_are_tagged_with_their_link() {
        let (mut manager, _connector, mut peers) = manager(0);
        manager.connect();
        let ConnectionEvent::Opened { link_id } = manager.next_event().await else {
            panic!("expected open");
        };
        let peer = peers.recv().await.unwrap();
        assert!(peer.push_text("first").await);
        assert!(peer.push_text("second").await);

        for expected in ["first", "second"] {
            assert_eq!(
                manager.next_event().await,
                ConnectionEvent::Message {
                    link_id,
                    message: InboundMessage::Text(expected.into()),
                }
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn lost_link_schedules_exactly_one_reconnect() {
        let (mut manager, connector, mut peers) = manager(0);
        manager.connect();
        let ConnectionEvent::Opened { link_id } = manager.next_event().await else {
            panic!("expected open");
        };
        drop(peers.recv().await.unwrap());

        let lost = manager.next_event().await;
        assert!(matches!(lost, ConnectionEvent::Lost { link_id: Some(id), .. } if id == link_id));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.reconnect_pending());
        assert!(!manager.send(vec![1]));

        let started = Instant::now();
        assert_eq!(manager.next_event().await, ConnectionEvent::Reconnecting);
        assert!(started.elapsed() >= DEFAULT_RECONNECT_DELAY);
        assert_eq!(manager.state(), ConnectionState::Connecting);

        assert!(matches!(manager.next_event().await, ConnectionEvent::Opened { .. }));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(manager.stats().reconnects_scheduled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn refused_attempts_retry_forever() {
        let (mut manager, connector, _peers) = manager(3);
        manager.connect();
        for _ in 0..3 {
            assert!(matches!(
                manager.next_event().await,
                ConnectionEvent::Lost { link_id: None, .. }
            ));
            assert_eq!(manager.next_event().await, ConnectionEvent::Reconnecting);
        }
        assert!(matches!(manager.next_event().await, ConnectionEvent::Opened { .. }));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(manager.stats().reconnects_scheduled, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_connect_supersedes_the_reconnect_timer() {
        let (mut manager, connector, _peers) = manager(1);
        manager.connect();
        assert!(matches!(manager.next_event().await, ConnectionEvent::Lost { .. }));
        assert!(manager.reconnect_pending());

        manager.connect();
        assert!(!manager.reconnect_pending());
        assert!(matches!(manager.next_event().await, ConnectionEvent::Opened { .. }));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn close_cancels_everything() {
        let (mut manager, _connector, _peers) = manager(1);
        manager.connect();
        assert!(matches!(manager.next_event().await, ConnectionEvent::Lost { .. }));
        manager.drain_transitions();

        manager.close();
        assert!(!manager.reconnect_pending());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(
            manager.drain_transitions(),
            vec![ConnectionState::Closing, ConnectionState::Disconnected]
        );

        // Nothing left to wait for.
        let idle = tokio::time::timeout(Duration::from_secs(10), manager.next_event()).await;
        assert!(idle.is_err());
    }
}
