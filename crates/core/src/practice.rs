//! The session context shared by the gate and the tracker.

use chrono::{DateTime, Utc};

use crate::model::{SessionState, Symbol};
use crate::progress::{
    MoveKind, Navigation, NavigationError, ProgressTracker, ProgressUpdate, Verdict,
};
use crate::stability::{GateDecision, GateInput, StabilityGate};

/// Display-ready changes produced by the practice session.
#[derive(Debug, Clone, PartialEq)]
pub enum PracticeEvent {
    /// Live feedback for every accepted observation.
    Candidate { label: Symbol, confidence: f32 },
    Verdict(Verdict),
    Progress(ProgressUpdate),
    SymbolChanged {
        index: usize,
        symbol: Symbol,
        kind: MoveKind,
    },
}

/// Owns the stability gate and the progress tracker for one learner.
///
/// Every mutation of learner progress goes through `observe` or `navigate`,
/// which take `&mut self`; callers serialize access by owning the session.
#[derive(Debug, Clone)]
pub struct PracticeSession {
    gate: StabilityGate,
    tracker: ProgressTracker,
}

impl PracticeSession {
    #[must_use]
    pub fn new(gate: StabilityGate, tracker: ProgressTracker) -> Self {
        Self { gate, tracker }
    }

    #[must_use]
    pub fn gate(&self) -> &StabilityGate {
        &self.gate
    }

    #[must_use]
    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        self.tracker.state()
    }

    #[must_use]
    pub fn current_symbol(&self) -> &Symbol {
        self.tracker.current_symbol()
    }

    /// Feeds one classifier response through the gate and, when it is
    /// confirmed, into the tracker.
    pub fn observe(&mut self, input: GateInput, at: DateTime<Utc>) -> Vec<PracticeEvent> {
        let decision = self.gate.observe(input);
        let mut events = Vec::new();

        if let Some(candidate) = decision.candidate() {
            events.push(PracticeEvent::Candidate {
                label: candidate.label().clone(),
                confidence: candidate.confidence(),
            });
        }

        if let GateDecision::Confirmed(observation) = decision {
            if let Some(applied) = self.tracker.apply_confirmed(&observation, at) {
                events.push(PracticeEvent::Verdict(applied.verdict));
                events.push(PracticeEvent::Progress(applied.update));
            }
        }

        events
    }

    /// Applies a navigation request and clears the current run.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError` if the tracker rejects the request; nothing
    /// changes in that case.
    pub fn navigate(&mut self, navigation: Navigation) -> Result<Vec<PracticeEvent>, NavigationError> {
        let outcome = self.tracker.navigate(navigation)?;
        self.gate.reset();

        let record = self.tracker.current_record();
        let update = ProgressUpdate {
            mastered: record.is_round_complete(self.tracker.settings().required_attempts()),
            symbol: outcome.symbol.clone(),
            record,
            streak: self.tracker.state().streak(),
            newly_mastered: false,
        };

        Ok(vec![
            PracticeEvent::SymbolChanged {
                index: outcome.index,
                symbol: outcome.symbol,
                kind: outcome.kind,
            },
            PracticeEvent::Progress(update),
        ])
    }
}
