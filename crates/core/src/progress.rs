use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{
    AttemptRecord, Observation, SessionState, SessionStateError, Symbol, SymbolCatalog,
};
use crate::stability::SettingsError;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NavigationError {
    #[error("`{symbol}` is not mastered yet; skip it instead")]
    RoundIncomplete { symbol: Symbol },

    #[error("symbol index {index} is outside a catalog of {len} symbols")]
    OutOfRange { index: usize, len: usize },
}

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSettings {
    required_attempts: u32,
}

impl ProgressSettings {
    pub const DEFAULT_REQUIRED_ATTEMPTS: u32 = 3;

    /// # Errors
    ///
    /// Returns `SettingsError::InvalidRequiredAttempts` if `required_attempts` is zero.
    pub fn new(required_attempts: u32) -> Result<Self, SettingsError> {
        if required_attempts == 0 {
            return Err(SettingsError::InvalidRequiredAttempts);
        }
        Ok(Self { required_attempts })
    }

    #[must_use]
    pub fn required_attempts(&self) -> u32 {
        self.required_attempts
    }
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            required_attempts: Self::DEFAULT_REQUIRED_ATTEMPTS,
        }
    }
}

//
// ─── OUTCOMES ──────────────────────────────────────────────────────────────────
//

/// Correct/incorrect judgement for one confirmed observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub target: Symbol,
    pub label: Symbol,
    pub confidence: f32,
    pub correct: bool,
}

/// Snapshot of one symbol's bookkeeping after it changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub symbol: Symbol,
    pub record: AttemptRecord,
    pub streak: u32,
    pub mastered: bool,
    /// True only for the observation that completed the round.
    pub newly_mastered: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub verdict: Verdict,
    pub update: ProgressUpdate,
}

/// What to do when moving past the last symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOfCatalog {
    /// The learner confirmed starting over.
    Wrap,
    /// The learner declined; stay on the last symbol.
    Clamp,
}

/// Navigation requests coming from the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// Next symbol; only allowed once the current round is mastered.
    Advance(EndOfCatalog),
    /// Next symbol regardless of mastery.
    Skip(EndOfCatalog),
    Jump(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    Moved,
    Wrapped,
    Clamped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationOutcome {
    pub index: usize,
    pub symbol: Symbol,
    pub kind: MoveKind,
}

//
// ─── TRACKER ───────────────────────────────────────────────────────────────────
//

/// Per-symbol practice state machine.
///
/// A symbol is *practicing* while its round has fewer than `required_attempts`
/// correct matches, and *mastered* once it reaches that count. Mastered rounds
/// ignore confirmed observations until the learner navigates.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    catalog: SymbolCatalog,
    settings: ProgressSettings,
    state: SessionState,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(catalog: SymbolCatalog, settings: ProgressSettings) -> Self {
        Self {
            catalog,
            settings,
            state: SessionState::new(),
        }
    }

    /// Resume from a previously saved state.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::IndexOutOfRange` if the state points past the catalog.
    pub fn with_state(
        catalog: SymbolCatalog,
        settings: ProgressSettings,
        state: SessionState,
    ) -> Result<Self, SessionStateError> {
        if state.current_index() >= catalog.len() {
            return Err(SessionStateError::IndexOutOfRange {
                index: state.current_index(),
                len: catalog.len(),
            });
        }
        Ok(Self {
            catalog,
            settings,
            state,
        })
    }

    #[must_use]
    pub fn catalog(&self) -> &SymbolCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn settings(&self) -> ProgressSettings {
        self.settings
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.state.current_index()
    }

    #[must_use]
    pub fn current_symbol(&self) -> &Symbol {
        self.catalog.clamped(self.state.current_index())
    }

    #[must_use]
    pub fn current_record(&self) -> AttemptRecord {
        self.state
            .record(self.current_symbol())
            .cloned()
            .unwrap_or_default()
    }

    /// True while the current round has reached the required correct count.
    #[must_use]
    pub fn is_round_mastered(&self) -> bool {
        self.current_record()
            .is_round_complete(self.settings.required_attempts)
    }

    /// Applies one confirmed observation against the current symbol.
    ///
    /// Returns `None` when the current round is already mastered.
    pub fn apply_confirmed(&mut self, observation: &Observation, at: DateTime<Utc>) -> Option<Applied> {
        if self.is_round_mastered() {
            return None;
        }

        let target = self.current_symbol().clone();
        let required = self.settings.required_attempts;
        let correct = observation.label() == &target;

        let mut newly_mastered = false;
        if correct {
            let completed = self.state.record_mut(&target).record_correct(required, at);
            self.state.bump_streak();
            if completed {
                newly_mastered = self.state.mark_mastered(&target);
            }
        } else {
            self.state.record_mut(&target).record_incorrect();
            self.state.reset_streak();
        }

        let record = self.current_record();
        Some(Applied {
            verdict: Verdict {
                target: target.clone(),
                label: observation.label().clone(),
                confidence: observation.confidence(),
                correct,
            },
            update: ProgressUpdate {
                mastered: record.is_round_complete(required),
                symbol: target,
                record,
                streak: self.state.streak(),
                newly_mastered,
            },
        })
    }

    /// # Errors
    ///
    /// Returns `NavigationError::RoundIncomplete` when advancing an unmastered
    /// symbol, or `NavigationError::OutOfRange` for a bad jump target.
    pub fn navigate(&mut self, navigation: Navigation) -> Result<NavigationOutcome, NavigationError> {
        match navigation {
            Navigation::Advance(at_end) => {
                if !self.is_round_mastered() {
                    return Err(NavigationError::RoundIncomplete {
                        symbol: self.current_symbol().clone(),
                    });
                }
                Ok(self.step_forward(at_end))
            }
            Navigation::Skip(at_end) => Ok(self.step_forward(at_end)),
            Navigation::Jump(index) => {
                if index >= self.catalog.len() {
                    return Err(NavigationError::OutOfRange {
                        index,
                        len: self.catalog.len(),
                    });
                }
                Ok(self.select(index, MoveKind::Moved))
            }
        }
    }

    fn step_forward(&mut self, at_end: EndOfCatalog) -> NavigationOutcome {
        let current = self.current_index();
        if current < self.catalog.last_index() {
            return self.select(current + 1, MoveKind::Moved);
        }
        match at_end {
            EndOfCatalog::Wrap => self.select(0, MoveKind::Wrapped),
            EndOfCatalog::Clamp => NavigationOutcome {
                index: current,
                symbol: self.current_symbol().clone(),
                kind: MoveKind::Clamped,
            },
        }
    }

    fn select(&mut self, index: usize, kind: MoveKind) -> NavigationOutcome {
        self.state.set_current_index(index);
        let symbol = self.current_symbol().clone();
        self.state.record_mut(&symbol).reset_round();
        NavigationOutcome {
            index,
            symbol,
            kind,
        }
    }
}
