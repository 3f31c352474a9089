use crate::conflict::ResolveError;
use crate::model::{Conflict, RecordId, RoomId};

#[derive(Debug)]
pub enum EngineError {
    NotFound { kind: &'static str, id: i64 },
    AlreadyExists { kind: &'static str, id: i64 },
    /// The write was refused; every violation is listed.
    Conflicts(Vec<Conflict>),
    RoomInUse { room_id: RoomId, schedule_id: RecordId },
    Resolve(ResolveError),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound { kind, id } => write!(f, "{kind} not found: {id}"),
            EngineError::AlreadyExists { kind, id } => write!(f, "{kind} already exists: {id}"),
            EngineError::Conflicts(list) => {
                write!(f, "schedule conflicts detected ({})", list.len())?;
                for (i, c) in list.iter().enumerate() {
                    let sep = if i == 0 { ": " } else { "; " };
                    write!(f, "{sep}{c}")?;
                }
                Ok(())
            }
            EngineError::RoomInUse { room_id, schedule_id } => {
                write!(f, "cannot delete room {room_id}: used by schedule {schedule_id}")
            }
            EngineError::Resolve(e) => write!(f, "{e}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Resolve(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ResolveError> for EngineError {
    fn from(e: ResolveError) -> Self {
        EngineError::Resolve(e)
    }
}
