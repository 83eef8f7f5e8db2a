//! Debounce for the classifier stream.
//!
//! The service answers every frame, and single frames are often wrong. The gate
//! only promotes an observation once the same label has been seen for
//! `window` consecutive finalized responses and the latest confidence clears
//! `threshold`. After a promotion the run starts over, so a held pose yields
//! one confirmation per run rather than one per frame.

use thiserror::Error;

use crate::model::{Observation, Symbol};

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("stability window must be > 0")]
    InvalidWindow,

    #[error("confidence threshold must be in [0, 1], got {0}")]
    InvalidThreshold(f32),

    #[error("required attempts must be > 0")]
    InvalidRequiredAttempts,
}

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilitySettings {
    window: u32,
    threshold: f32,
}

impl StabilitySettings {
    pub const DEFAULT_WINDOW: u32 = 3;
    pub const DEFAULT_THRESHOLD: f32 = 0.6;

    /// # Errors
    ///
    /// Returns `SettingsError` if `window` is zero or `threshold` is outside `[0, 1]`.
    pub fn new(window: u32, threshold: f32) -> Result<Self, SettingsError> {
        if window == 0 {
            return Err(SettingsError::InvalidWindow);
        }
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(SettingsError::InvalidThreshold(threshold));
        }
        Ok(Self { window, threshold })
    }

    #[must_use]
    pub fn window(&self) -> u32 {
        self.window
    }

    #[must_use]
    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Default for StabilitySettings {
    fn default() -> Self {
        Self {
            window: Self::DEFAULT_WINDOW,
            threshold: Self::DEFAULT_THRESHOLD,
        }
    }
}

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

/// Current run of identical labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StabilityState {
    pub last_label: Option<Symbol>,
    pub run_length: u32,
}

/// A classifier response as seen by the gate.
#[derive(Debug, Clone, PartialEq)]
pub enum GateInput {
    /// The service has no verdict yet (not enough temporal context).
    Pending,
    Ready(Observation),
}

/// What the gate made of one input.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Not finalized upstream; state untouched.
    Discarded,
    /// Accepted into the run but not (yet) promoted.
    Candidate(Observation),
    /// Promoted; the run has been reset.
    Confirmed(Observation),
}

impl GateDecision {
    /// The observation to show as the live candidate, if any.
    #[must_use]
    pub fn candidate(&self) -> Option<&Observation> {
        match self {
            GateDecision::Discarded => None,
            GateDecision::Candidate(obs) | GateDecision::Confirmed(obs) => Some(obs),
        }
    }

    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        matches!(self, GateDecision::Confirmed(_))
    }
}

//
// ─── GATE ──────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Default)]
pub struct StabilityGate {
    settings: StabilitySettings,
    state: StabilityState,
}

impl StabilityGate {
    #[must_use]
    pub fn new(settings: StabilitySettings) -> Self {
        Self {
            settings,
            state: StabilityState::default(),
        }
    }

    #[must_use]
    pub fn settings(&self) -> StabilitySettings {
        self.settings
    }

    #[must_use]
    pub fn state(&self) -> &StabilityState {
        &self.state
    }

    pub fn observe(&mut self, input: GateInput) -> GateDecision {
        let GateInput::Ready(observation) = input else {
            return GateDecision::Discarded;
        };

        if self.state.last_label.as_ref() == Some(observation.label()) {
            self.state.run_length = self.state.run_length.saturating_add(1);
        } else {
            self.state.last_label = Some(observation.label().clone());
            self.state.run_length = 1;
        }

        // Low-confidence frames still extend the run; only promotion checks the threshold.
        if self.state.run_length >= self.settings.window
            && observation.confidence() >= self.settings.threshold
        {
            self.reset();
            GateDecision::Confirmed(observation)
        } else {
            GateDecision::Candidate(observation)
        }
    }

    pub fn reset(&mut self) {
        self.state = StabilityState::default();
    }
}
