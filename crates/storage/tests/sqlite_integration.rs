use chrono::Duration;
use sign_core::model::{Observation, Symbol, SymbolCatalog};
use sign_core::time::fixed_now;
use sign_core::{EndOfCatalog, Navigation, ProgressSettings, ProgressTracker};
use storage::repository::{ProgressRecord, ProgressRepository, Storage};
use storage::sqlite::SqliteRepository;

fn catalog() -> SymbolCatalog {
    SymbolCatalog::from_names(["hello", "thanks", "yes"]).unwrap()
}

fn observation(label: &str) -> Observation {
    Observation::new(Symbol::new(label).unwrap(), 0.9).unwrap()
}

#[tokio::test]
async fn sqlite_roundtrip_persists_session_state() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_progress_roundtrip?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let mut tracker = ProgressTracker::new(catalog(), ProgressSettings::default());
    for _ in 0..3 {
        tracker.apply_confirmed(&observation("hello"), fixed_now()).unwrap();
    }
    tracker
        .navigate(Navigation::Advance(EndOfCatalog::Wrap))
        .unwrap();
    tracker.apply_confirmed(&observation("yes"), fixed_now()).unwrap();

    let record = ProgressRecord::from_state(tracker.state(), &catalog(), fixed_now());
    repo.save_progress("default", &record).await.unwrap();

    let loaded = repo
        .load_progress("default")
        .await
        .unwrap()
        .expect("profile saved");
    assert_eq!(loaded.current_symbol.as_str(), "thanks");
    assert_eq!(loaded.updated_at, fixed_now());

    let restored = loaded.into_state(&catalog()).unwrap();
    assert_eq!(&restored, tracker.state());

    let hello = restored.record(&Symbol::new("hello").unwrap()).unwrap();
    assert_eq!(hello.total_successes, 3);
    assert_eq!(hello.last_completed_at, Some(fixed_now()));
    assert_eq!(restored.best_streak(), 3);
    assert_eq!(restored.streak(), 0);
}

#[tokio::test]
async fn sqlite_save_replaces_previous_rows() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_progress_replace?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    // Running migrations twice is a no-op.
    repo.migrate().await.expect("migrate again");

    let mut tracker = ProgressTracker::new(catalog(), ProgressSettings::default());
    tracker.apply_confirmed(&observation("hello"), fixed_now()).unwrap();
    let first = ProgressRecord::from_state(tracker.state(), &catalog(), fixed_now());
    repo.save_progress("ada", &first).await.unwrap();

    let fresh = ProgressTracker::new(catalog(), ProgressSettings::default());
    let later = fixed_now() + Duration::minutes(5);
    let second = ProgressRecord::from_state(fresh.state(), &catalog(), later);
    repo.save_progress("ada", &second).await.unwrap();

    let loaded = repo.load_progress("ada").await.unwrap().unwrap();
    assert!(loaded.symbols.is_empty());
    assert_eq!(loaded.updated_at, later);
}

#[tokio::test]
async fn sqlite_missing_profile_is_a_cold_start() {
    let storage = Storage::sqlite("sqlite:file:memdb_progress_cold?mode=memory&cache=shared")
        .await
        .expect("storage");
    assert!(storage.progress.load_progress("nobody").await.unwrap().is_none());
}
