//! Conflict detection: independent rules evaluated against the schedule store.

mod detector;
mod error;
pub mod rules;

pub use detector::ConflictDetector;
pub(crate) use detector::validate_proposal;
pub use error::ResolveError;
pub use rules::ConflictRule;
