mod attempt;
mod labels;
mod observation;
mod session;
mod symbol;

pub use attempt::AttemptRecord;
pub use labels::{LabelLookup, LabelMap};
pub use observation::{Observation, ObservationError};
pub use session::{SessionState, SessionStateError};
pub use symbol::{CatalogError, Symbol, SymbolCatalog, SymbolError};
