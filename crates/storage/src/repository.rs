use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sign_core::model::{AttemptRecord, SessionState, SessionStateError, Symbol, SymbolCatalog};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Persisted shape of one symbol's progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolProgressRecord {
    pub symbol: Symbol,
    pub record: AttemptRecord,
    pub mastered: bool,
}

/// Persisted shape of a learner's session state.
///
/// The current symbol is stored by name rather than index so a reordered
/// catalog still resumes on the same symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub current_symbol: Symbol,
    pub streak: u32,
    pub best_streak: u32,
    pub symbols: Vec<SymbolProgressRecord>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    #[must_use]
    pub fn from_state(
        state: &SessionState,
        catalog: &SymbolCatalog,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let mut symbols: Vec<SymbolProgressRecord> = state
            .records()
            .iter()
            .map(|(symbol, record)| SymbolProgressRecord {
                symbol: symbol.clone(),
                record: record.clone(),
                mastered: state.is_mastered(symbol),
            })
            .collect();

        // A mastered symbol always gets a row, even without attempts.
        for symbol in state.mastered() {
            if !state.records().contains_key(symbol) {
                symbols.push(SymbolProgressRecord {
                    symbol: symbol.clone(),
                    record: AttemptRecord::new(),
                    mastered: true,
                });
            }
        }

        Self {
            current_symbol: catalog.clamped(state.current_index()).clone(),
            streak: state.streak(),
            best_streak: state.best_streak(),
            symbols,
            updated_at,
        }
    }

    /// Convert the record back into a domain `SessionState`.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError` if the record references symbols outside
    /// `catalog` or its counters are inconsistent.
    pub fn into_state(self, catalog: &SymbolCatalog) -> Result<SessionState, SessionStateError> {
        let current_index = catalog
            .position(&self.current_symbol)
            .ok_or_else(|| SessionStateError::UnknownSymbol(self.current_symbol.clone()))?;

        let mut mastered = BTreeSet::new();
        let mut records = BTreeMap::new();
        for row in self.symbols {
            if row.mastered {
                mastered.insert(row.symbol.clone());
            }
            records.insert(row.symbol, row.record);
        }

        SessionState::from_persisted(
            catalog,
            current_index,
            self.streak,
            self.best_streak,
            mastered,
            records,
        )
    }
}

/// Key-value contract for learner progress, keyed by profile name.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch the saved progress for a profile.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend fails. A missing profile is `Ok(None)`.
    async fn load_progress(&self, profile: &str) -> Result<Option<ProgressRecord>, StorageError>;

    /// Replace the saved progress for a profile.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn save_progress(&self, profile: &str, record: &ProgressRecord)
    -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    progress: Arc<Mutex<HashMap<String, ProgressRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn load_progress(&self, profile: &str) -> Result<Option<ProgressRecord>, StorageError> {
        let guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(profile).cloned())
    }

    async fn save_progress(
        &self,
        profile: &str,
        record: &ProgressRecord,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(profile.to_owned(), record.clone());
        Ok(())
    }
}

/// Repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let progress: Arc<dyn ProgressRepository> = Arc::new(InMemoryRepository::new());
        Self { progress }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sign_core::model::Observation;
    use sign_core::time::fixed_now;
    use sign_core::{Navigation, ProgressSettings, ProgressTracker};

    fn catalog() -> SymbolCatalog {
        SymbolCatalog::from_names(["hello", "thanks", "yes"]).unwrap()
    }

    fn practiced_state() -> SessionState {
        let mut tracker = ProgressTracker::new(catalog(), ProgressSettings::new(1).unwrap());
        let hello = Observation::new(Symbol::new("hello").unwrap(), 0.9).unwrap();
        tracker.apply_confirmed(&hello, fixed_now()).unwrap();
        tracker.navigate(Navigation::Jump(2)).unwrap();
        tracker.state().clone()
    }

    #[tokio::test]
    async fn round_trips_progress_through_memory() {
        let repo = InMemoryRepository::new();
        assert!(repo.load_progress("ada").await.unwrap().is_none());

        let state = practiced_state();
        let record = ProgressRecord::from_state(&state, &catalog(), fixed_now());
        repo.save_progress("ada", &record).await.unwrap();

        let loaded = repo.load_progress("ada").await.unwrap().unwrap();
        assert_eq!(loaded.current_symbol.as_str(), "yes");
        let restored = loaded.into_state(&catalog()).unwrap();
        assert_eq!(restored, state);
        assert!(repo.load_progress("someone-else").await.unwrap().is_none());
    }

    #[test]
    fn record_follows_symbol_when_catalog_is_reordered() {
        let state = practiced_state();
        let record = ProgressRecord::from_state(&state, &catalog(), fixed_now());

        let reordered = SymbolCatalog::from_names(["yes", "hello", "thanks"]).unwrap();
        let restored = record.into_state(&reordered).unwrap();
        assert_eq!(restored.current_index(), 0);
        assert!(restored.is_mastered(&Symbol::new("hello").unwrap()));
    }

    #[test]
    fn record_for_a_different_catalog_is_rejected() {
        let record = ProgressRecord::from_state(&practiced_state(), &catalog(), fixed_now());
        let other = SymbolCatalog::from_names(["no", "please"]).unwrap();
        assert!(matches!(
            record.into_state(&other),
            Err(SessionStateError::UnknownSymbol(_))
        ));
    }
}
