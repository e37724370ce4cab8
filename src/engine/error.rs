use ulid::Ulid;

use crate::model::{Ms, ResourceId, Span};
use crate::repository::RepositoryError;

#[derive(Debug)]
pub enum EngineError {
    /// A required field is missing or empty.
    InvalidInput(&'static str),
    InvalidRange { start: Ms, end: Ms },
    /// Overlap with an existing booking on the same resource.
    Conflict { id: Ulid, span: Span },
    NotFound(Ulid),
    LimitExceeded(&'static str),
    /// The persistence collaborator failed; nothing was applied.
    Storage(String),
    /// More than one booking covers one instant on a resource.
    InvariantViolation { resource_id: ResourceId, ids: Vec<Ulid> },
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::InvalidRange { start, end } => {
                write!(f, "invalid range: end {end} must be after start {start}")
            }
            EngineError::Conflict { id, span } => {
                write!(f, "conflict with booking {id} {span}")
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Storage(e) => write!(f, "storage error: {e}"),
            EngineError::InvariantViolation { resource_id, ids } => write!(
                f,
                "invariant violation on resource {resource_id}: overlapping bookings {ids:?}"
            ),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<RepositoryError> for EngineError {
    fn from(e: RepositoryError) -> Self {
        EngineError::Storage(e.to_string())
    }
}
