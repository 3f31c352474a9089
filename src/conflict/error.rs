use crate::model::TimeError;
use crate::repository::RepositoryError;

/// Failure of a conflict check or alternative search.
///
/// Finding conflicts is not an error; neither is an auto-resolve that finds nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    InvalidProposal(TimeError),
    Repository(RepositoryError),
    LimitExceeded(&'static str),
    Cancelled,
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::InvalidProposal(e) => write!(f, "invalid proposal: {e}"),
            ResolveError::Repository(e) => write!(f, "could not determine conflicts: {e}"),
            ResolveError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            ResolveError::Cancelled => write!(f, "search cancelled"),
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResolveError::InvalidProposal(e) => Some(e),
            ResolveError::Repository(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RepositoryError> for ResolveError {
    fn from(e: RepositoryError) -> Self {
        ResolveError::Repository(e)
    }
}

impl From<TimeError> for ResolveError {
    fn from(e: TimeError) -> Self {
        ResolveError::InvalidProposal(e)
    }
}
