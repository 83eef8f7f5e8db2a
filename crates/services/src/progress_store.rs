//! Best-effort persistence of learner progress.
//!
//! Storage problems never reach the session: a failed load starts fresh and a
//! failed save is logged and forgotten.

use std::sync::Arc;

use tracing::{debug, info, warn};

use sign_core::Clock;
use sign_core::model::{SessionState, SymbolCatalog};
use storage::repository::{ProgressRecord, ProgressRepository};

#[derive(Clone)]
pub struct ProgressStore {
    repo: Arc<dyn ProgressRepository>,
    profile: String,
    clock: Clock,
}

impl ProgressStore {
    #[must_use]
    pub fn new(repo: Arc<dyn ProgressRepository>, profile: impl Into<String>) -> Self {
        Self {
            repo,
            profile: profile.into(),
            clock: Clock::default(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Saved state for this profile, or a fresh state.
    pub async fn load(&self, catalog: &SymbolCatalog) -> SessionState {
        match self.repo.load_progress(&self.profile).await {
            Ok(Some(record)) => match record.into_state(catalog) {
                Ok(state) => {
                    info!(profile = %self.profile, mastered = state.mastered().len(), "progress restored");
                    state
                }
                Err(err) => {
                    warn!(profile = %self.profile, error = %err, "saved progress does not fit the catalog, starting fresh");
                    SessionState::new()
                }
            },
            Ok(None) => {
                info!(profile = %self.profile, "no saved progress, starting fresh");
                SessionState::new()
            }
            Err(err) => {
                warn!(profile = %self.profile, error = %err, "failed to load progress, starting fresh");
                SessionState::new()
            }
        }
    }

    /// Persist `state`. Returns whether the write succeeded.
    pub async fn save(&self, state: &SessionState, catalog: &SymbolCatalog) -> bool {
        let record = ProgressRecord::from_state(state, catalog, self.clock.now());
        match self.repo.save_progress(&self.profile, &record).await {
            Ok(()) => {
                debug!(profile = %self.profile, "progress saved");
                true
            }
            Err(err) => {
                warn!(profile = %self.profile, error = %err, "failed to save progress");
                false
            }
        }
    }
}

impl std::fmt::Debug for ProgressStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressStore")
            .field("profile", &self.profile)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sign_core::model::{Observation, Symbol};
    use sign_core::time::fixed_now;
    use sign_core::{ProgressSettings, ProgressTracker};
    use storage::repository::{InMemoryRepository, StorageError};

    struct BrokenRepository;

    #[async_trait]
    impl ProgressRepository for BrokenRepository {
        async fn load_progress(
            &self,
            _profile: &str,
        ) -> Result<Option<ProgressRecord>, StorageError> {
            Err(StorageError::Connection("disk on fire".into()))
        }

        async fn save_progress(
            &self,
            _profile: &str,
            _record: &ProgressRecord,
        ) -> Result<(), StorageError> {
            Err(StorageError::Connection("disk on fire".into()))
        }
    }

    fn catalog() -> SymbolCatalog {
        SymbolCatalog::from_names(["S1", "S2"]).unwrap()
    }

    fn practiced() -> SessionState {
        let mut tracker = ProgressTracker::new(catalog(), ProgressSettings::default());
        let s1 = Observation::new(Symbol::new("S1").unwrap(), 0.9).unwrap();
        tracker.apply_confirmed(&s1, fixed_now()).unwrap();
        tracker.state().clone()
    }

    #[tokio::test]
    async fn saves_and_restores_by_profile() {
        let repo = Arc::new(InMemoryRepository::new());
        let store = ProgressStore::new(repo.clone(), "ada").with_clock(Clock::fixed(fixed_now()));

        assert_eq!(store.load(&catalog()).await, SessionState::new());
        assert!(store.save(&practiced(), &catalog()).await);
        assert_eq!(store.load(&catalog()).await, practiced());

        let saved = repo.load_progress("ada").await.unwrap().unwrap();
        assert_eq!(saved.updated_at, fixed_now());
    }

    #[tokio::test]
    async fn storage_failures_are_swallowed() {
        let store = ProgressStore::new(Arc::new(BrokenRepository), "ada");
        assert_eq!(store.load(&catalog()).await, SessionState::new());
        assert!(!store.save(&practiced(), &catalog()).await);
    }

    #[tokio::test]
    async fn progress_for_another_catalog_starts_fresh() {
        let store = ProgressStore::new(Arc::new(InMemoryRepository::new()), "ada");
        assert!(store.save(&practiced(), &catalog()).await);

        let other = SymbolCatalog::from_names(["X", "Y"]).unwrap();
        assert_eq!(store.load(&other).await, SessionState::new());
    }
}
