use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::model::{AttemptRecord, Symbol, SymbolCatalog};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("current index {index} is outside a catalog of {len} symbols")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("symbol `{0}` is not part of the catalog")]
    UnknownSymbol(Symbol),

    #[error("best streak ({best}) is below the current streak ({streak})")]
    StreakMismatch { streak: u32, best: u32 },
}

/// Learner progress for one practice session.
///
/// Only `ProgressTracker` mutates this; everything else reads it through the
/// accessors below.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    current_index: usize,
    streak: u32,
    best_streak: u32,
    mastered: BTreeSet<Symbol>,
    records: BTreeMap<Symbol, AttemptRecord>,
}

impl SessionState {
    /// Cold-start state: first symbol, no history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rehydrate a session state from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError` if the index or any symbol does not fit
    /// `catalog`, or if the streak counters disagree.
    pub fn from_persisted(
        catalog: &SymbolCatalog,
        current_index: usize,
        streak: u32,
        best_streak: u32,
        mastered: BTreeSet<Symbol>,
        records: BTreeMap<Symbol, AttemptRecord>,
    ) -> Result<Self, SessionStateError> {
        if current_index >= catalog.len() {
            return Err(SessionStateError::IndexOutOfRange {
                index: current_index,
                len: catalog.len(),
            });
        }
        if best_streak < streak {
            return Err(SessionStateError::StreakMismatch {
                streak,
                best: best_streak,
            });
        }
        if let Some(unknown) = mastered
            .iter()
            .chain(records.keys())
            .find(|symbol| !catalog.contains(symbol))
        {
            return Err(SessionStateError::UnknownSymbol(unknown.clone()));
        }

        Ok(Self {
            current_index,
            streak,
            best_streak,
            mastered,
            records,
        })
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub fn streak(&self) -> u32 {
        self.streak
    }

    #[must_use]
    pub fn best_streak(&self) -> u32 {
        self.best_streak
    }

    #[must_use]
    pub fn mastered(&self) -> &BTreeSet<Symbol> {
        &self.mastered
    }

    #[must_use]
    pub fn is_mastered(&self, symbol: &Symbol) -> bool {
        self.mastered.contains(symbol)
    }

    #[must_use]
    pub fn records(&self) -> &BTreeMap<Symbol, AttemptRecord> {
        &self.records
    }

    #[must_use]
    pub fn record(&self, symbol: &Symbol) -> Option<&AttemptRecord> {
        self.records.get(symbol)
    }

    pub(crate) fn set_current_index(&mut self, index: usize) {
        self.current_index = index;
    }

    pub(crate) fn record_mut(&mut self, symbol: &Symbol) -> &mut AttemptRecord {
        self.records.entry(symbol.clone()).or_default()
    }

    pub(crate) fn bump_streak(&mut self) {
        self.streak = self.streak.saturating_add(1);
        self.best_streak = self.best_streak.max(self.streak);
    }

    pub(crate) fn reset_streak(&mut self) {
        self.streak = 0;
    }

    /// Returns true if the symbol was newly added.
    pub(crate) fn mark_mastered(&mut self, symbol: &Symbol) -> bool {
        self.mastered.insert(symbol.clone())
    }
}
