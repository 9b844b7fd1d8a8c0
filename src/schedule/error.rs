use crate::catalog::CatalogError;
use crate::model::SessionId;
use crate::storage::StorageError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// No current user, or an empty user id.
    Unauthenticated,
    /// The referenced session does not exist in the catalog.
    NotFound(SessionId),
    Storage(StorageError),
    LimitExceeded(&'static str),
}

impl std::fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleError::Unauthenticated => write!(f, "no user session found"),
            ScheduleError::NotFound(id) => write!(f, "session not found: {id}"),
            ScheduleError::Storage(e) => write!(f, "storage error: {e}"),
            ScheduleError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for ScheduleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScheduleError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for ScheduleError {
    fn from(e: StorageError) -> Self {
        ScheduleError::Storage(e)
    }
}

impl From<CatalogError> for ScheduleError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::NotFound(id) => ScheduleError::NotFound(id),
            other => ScheduleError::Storage(StorageError::Unavailable(other.to_string())),
        }
    }
}
