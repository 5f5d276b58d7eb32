pub mod admission;
pub mod error;
pub mod history;
pub mod models;
pub mod reconciler;
pub mod relocator;

pub use admission::AdmissionGate;
pub use error::{AdmissionError, HistoryError, RelocateError};
pub use history::HistoryStore;
pub use models::{HistoryEntry, HistoryState};
pub use reconciler::{CycleReport, Reconciler};
pub use relocator::{Relocate, RelocationPlan, Relocator};
