//! The session actor.
//!
//! One task owns the practice session, the connection, the sampler and the
//! progress store. UI commands, connection events and sampler ticks are
//! serialized through a single `select!`, so progress is only ever touched
//! from here and needs no lock.

use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use sign_core::model::{LabelMap, SessionState, Symbol};
use sign_core::{
    Clock, GateInput, MoveKind, Navigation, NavigationError, PracticeEvent, PracticeSession,
    ProgressUpdate, Verdict,
};

use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionState, ConnectionStats};
use crate::error::{CaptureError, ProtocolError, SessionLoopError};
use crate::progress_store::ProgressStore;
use crate::protocol::ServiceMessage;
use crate::sampler::{FrameSampler, SamplerStats};
use crate::transport::InboundMessage;

const COMMAND_QUEUE: usize = 32;

/// Control requests from the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Navigate(Navigation),
    Shutdown,
}

/// Everything the UI needs to render. The UI never computes verdicts.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Candidate {
        label: Symbol,
        confidence: f32,
        probabilities: BTreeMap<String, f32>,
    },
    Verdict(Verdict),
    Progress(ProgressUpdate),
    SymbolChanged {
        index: usize,
        symbol: Symbol,
        kind: MoveKind,
    },
    Connection(ConnectionState),
    Status(String),
    NavigationRejected(NavigationError),
    /// Terminal; the session ends after this event.
    CaptureFailed(String),
}

/// Summary returned when the loop exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub state: SessionState,
    pub sampler: SamplerStats,
    pub connection: ConnectionStats,
    pub messages: u64,
    pub malformed: u64,
    pub confirmations: u64,
}

/// Handle to a spawned session loop.
#[derive(Debug)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    task: JoinHandle<Result<SessionReport, SessionLoopError>>,
}

impl SessionHandle {
    /// Queue a navigation request. Returns `false` once the loop has ended.
    pub async fn navigate(&self, navigation: Navigation) -> bool {
        self.commands
            .send(Command::Navigate(navigation))
            .await
            .is_ok()
    }

    #[must_use]
    pub fn commands(&self) -> mpsc::Sender<Command> {
        self.commands.clone()
    }

    /// Ask the loop to stop and wait for its report.
    ///
    /// # Errors
    ///
    /// Returns `SessionLoopError` if the session ended on a capture error or
    /// the task failed.
    pub async fn shutdown(self) -> Result<SessionReport, SessionLoopError> {
        let _ = self.commands.send(Command::Shutdown).await;
        self.join().await
    }

    /// Wait for the loop to end on its own.
    ///
    /// # Errors
    ///
    /// See [`SessionHandle::shutdown`].
    pub async fn join(self) -> Result<SessionReport, SessionLoopError> {
        self.task
            .await
            .map_err(|err| SessionLoopError::Task(err.to_string()))?
    }
}

#[derive(Debug, Default)]
struct Counters {
    messages: u64,
    malformed: u64,
    confirmations: u64,
}

#[derive(Debug)]
pub struct SessionLoop {
    session: PracticeSession,
    labels: LabelMap,
    connection: ConnectionManager,
    sampler: FrameSampler,
    store: ProgressStore,
    clock: Clock,
    events: Option<mpsc::UnboundedSender<UiEvent>>,
    counters: Counters,
}

impl SessionLoop {
    #[must_use]
    pub fn new(
        session: PracticeSession,
        labels: LabelMap,
        connection: ConnectionManager,
        sampler: FrameSampler,
        store: ProgressStore,
    ) -> Self {
        Self {
            session,
            labels,
            connection,
            sampler,
            store,
            clock: Clock::default(),
            events: None,
            counters: Counters::default(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Spawn the loop on the current runtime.
    #[must_use]
    pub fn spawn(self) -> (SessionHandle, mpsc::UnboundedReceiver<UiEvent>) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(commands_rx, events_tx));
        (
            SessionHandle {
                commands: commands_tx,
                task,
            },
            events_rx,
        )
    }

    /// Drive the session until shutdown, a closed command queue, or a capture error.
    ///
    /// # Errors
    ///
    /// Returns `SessionLoopError::Capture` when the capture device fails.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        events: mpsc::UnboundedSender<UiEvent>,
    ) -> Result<SessionReport, SessionLoopError> {
        self.events = Some(events);

        if let Err(err) = self.sampler.open() {
            return Err(self.fail(err).await);
        }

        let index = self.session.tracker().current_index();
        let symbol = self.session.current_symbol().clone();
        info!(%symbol, index, "session started");
        self.emit(UiEvent::SymbolChanged {
            index,
            symbol: symbol.clone(),
            kind: MoveKind::Moved,
        });
        self.emit(UiEvent::Progress(self.current_progress()));

        self.connection.connect();
        self.flush_transitions();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Navigate(navigation)) => self.on_navigate(navigation).await,
                    Some(Command::Shutdown) | None => break,
                },
                event = self.connection.next_event() => self.on_connection_event(event).await,
                () = self.sampler.tick(), if self.sampler.is_running() => {
                    if let Err(err) = self.sampler.sample(&mut self.connection) {
                        return Err(self.fail(err).await);
                    }
                }
            }
            self.flush_transitions();
        }

        info!("session shutting down");
        self.sampler.stop();
        self.connection.close();
        self.flush_transitions();
        self.save().await;
        Ok(self.report())
    }

    async fn on_navigate(&mut self, navigation: Navigation) {
        match self.session.navigate(navigation) {
            Ok(events) => {
                debug!(?navigation, "navigation applied");
                self.forward(events, &BTreeMap::new());
                self.save().await;
            }
            Err(err) => {
                info!(?navigation, error = %err, "navigation rejected");
                self.emit(UiEvent::NavigationRejected(err));
            }
        }
    }

    async fn on_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened { link_id } => {
                self.sampler.start();
                debug!(%link_id, "sampling");
                self.emit(UiEvent::Status("connected to recognition service".to_owned()));
            }
            ConnectionEvent::Message { link_id, message } => {
                self.counters.messages += 1;
                self.on_message(link_id, message).await;
            }
            ConnectionEvent::Lost { reason, .. } => {
                self.sampler.stop();
                let delay = self.connection.reconnect_delay();
                self.emit(UiEvent::Status(format!(
                    "connection lost ({reason}), retrying in {:.1}s",
                    delay.as_secs_f32()
                )));
            }
            ConnectionEvent::Reconnecting => {
                self.emit(UiEvent::Status("reconnecting".to_owned()));
            }
        }
    }

    async fn on_message(&mut self, link_id: Uuid, message: InboundMessage) {
        let decoded = match message {
            InboundMessage::Text(text) => ServiceMessage::decode(&text),
            InboundMessage::Binary(bytes) => Err(ProtocolError::UnexpectedBinary(bytes.len())),
        };
        let interpreted = decoded.and_then(|message| self.interpret(message));
        let (input, probabilities) = match interpreted {
            Ok(interpreted) => interpreted,
            Err(err) => {
                self.counters.malformed += 1;
                warn!(%link_id, error = %err, "discarding malformed service message");
                return;
            }
        };

        let events = self.session.observe(input, self.clock.now());
        let changed = events
            .iter()
            .any(|event| matches!(event, PracticeEvent::Progress(_)));
        self.forward(events, &probabilities);
        if changed {
            self.save().await;
        }
    }

    fn interpret(
        &self,
        message: ServiceMessage,
    ) -> Result<(GateInput, BTreeMap<String, f32>), ProtocolError> {
        let probabilities = match &message {
            ServiceMessage::Prediction(prediction) => {
                if !self.labels.lookup(&prediction.label).is_mapped() {
                    debug!(label = %prediction.label, "unmapped label passed through");
                }
                prediction.probabilities.clone()
            }
            ServiceMessage::Pending => BTreeMap::new(),
        };
        Ok((message.into_gate_input(&self.labels)?, probabilities))
    }

    fn forward(&mut self, events: Vec<PracticeEvent>, probabilities: &BTreeMap<String, f32>) {
        for event in events {
            let ui = match event {
                PracticeEvent::Candidate { label, confidence } => UiEvent::Candidate {
                    label,
                    confidence,
                    probabilities: probabilities.clone(),
                },
                PracticeEvent::Verdict(verdict) => {
                    self.counters.confirmations += 1;
                    info!(
                        target_symbol = %verdict.target,
                        label = %verdict.label,
                        confidence = verdict.confidence,
                        correct = verdict.correct,
                        "confirmed observation"
                    );
                    UiEvent::Verdict(verdict)
                }
                PracticeEvent::Progress(update) => {
                    if update.newly_mastered {
                        info!(symbol = %update.symbol, "symbol mastered");
                    }
                    UiEvent::Progress(update)
                }
                PracticeEvent::SymbolChanged {
                    index,
                    symbol,
                    kind,
                } => UiEvent::SymbolChanged {
                    index,
                    symbol,
                    kind,
                },
            };
            self.emit(ui);
        }
    }

    async fn fail(&mut self, err: CaptureError) -> SessionLoopError {
        warn!(error = %err, "capture failed, ending session");
        self.sampler.stop();
        self.connection.close();
        self.flush_transitions();
        self.emit(UiEvent::CaptureFailed(err.to_string()));
        self.save().await;
        SessionLoopError::Capture(err)
    }

    // Takes `&mut self` so the loop future only needs `Send`.
    async fn save(&mut self) {
        self.store
            .save(self.session.state(), self.session.tracker().catalog())
            .await;
    }

    fn current_progress(&self) -> ProgressUpdate {
        let tracker = self.session.tracker();
        let record = tracker.current_record();
        ProgressUpdate {
            symbol: tracker.current_symbol().clone(),
            mastered: tracker.is_round_mastered(),
            record,
            streak: tracker.state().streak(),
            newly_mastered: false,
        }
    }

    fn flush_transitions(&mut self) {
        for state in self.connection.drain_transitions() {
            self.emit(UiEvent::Connection(state));
        }
    }

    fn emit(&self, event: UiEvent) {
        if let Some(events) = &self.events {
            // A closed UI does not stop practice.
            let _ = events.send(event);
        }
    }

    fn report(&self) -> SessionReport {
        SessionReport {
            state: self.session.state().clone(),
            sampler: self.sampler.stats(),
            connection: self.connection.stats(),
            messages: self.counters.messages,
            malformed: self.counters.malformed,
            confirmations: self.counters.confirmations,
        }
    }
}
