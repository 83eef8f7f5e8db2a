#![forbid(unsafe_code)]

pub mod model;
pub mod practice;
pub mod progress;
pub mod stability;
pub mod time;

pub use practice::{PracticeEvent, PracticeSession};
pub use progress::{
    Applied, EndOfCatalog, MoveKind, Navigation, NavigationError, NavigationOutcome,
    ProgressSettings, ProgressTracker, ProgressUpdate, Verdict,
};
pub use stability::{
    GateDecision, GateInput, SettingsError, StabilityGate, StabilitySettings, StabilityState,
};
pub use time::Clock;
