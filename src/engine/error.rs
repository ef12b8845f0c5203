use ulid::Ulid;

use crate::model::ReservationStatus;

#[derive(Debug)]
pub enum EngineError {
    /// Malformed range, count or name. Raised before any lock is taken.
    Validation(&'static str),
    NotFound(Ulid),
    AlreadyExists(Ulid),
    CapacityExceeded {
        campground_id: Ulid,
        peak: u32,
        requested: u32,
        capacity: u32,
    },
    InvalidTransition {
        id: Ulid,
        from: ReservationStatus,
        to: ReservationStatus,
    },
    /// The campground lock could not be taken within the admission timeout.
    AdmissionTimeout(Ulid),
    Conflict(String),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    /// SQLSTATE reported over the wire.
    pub fn sqlstate(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "22023",
            EngineError::NotFound(_) => "P0002",
            EngineError::AlreadyExists(_) | EngineError::Conflict(_) => "23505",
            EngineError::CapacityExceeded { .. } => "23P01",
            EngineError::InvalidTransition { .. } => "55000",
            EngineError::AdmissionTimeout(_) => "55P03",
            EngineError::LimitExceeded(_) => "54000",
            EngineError::WalError(_) => "58030",
        }
    }

    /// Status code for the HTTP routing layer.
    pub fn http_status(&self) -> u16 {
        match self {
            EngineError::Validation(_)
            | EngineError::CapacityExceeded { .. }
            | EngineError::LimitExceeded(_) => 400,
            EngineError::NotFound(_) => 404,
            EngineError::AlreadyExists(_)
            | EngineError::Conflict(_)
            | EngineError::InvalidTransition { .. } => 409,
            EngineError::AdmissionTimeout(_) => 503,
            EngineError::WalError(_) => 500,
        }
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "ValidationError",
            EngineError::NotFound(_) => "NotFound",
            EngineError::AlreadyExists(_) | EngineError::Conflict(_) => "Conflict",
            EngineError::CapacityExceeded { .. } => "CapacityExceeded",
            EngineError::InvalidTransition { .. } => "InvalidTransition",
            EngineError::AdmissionTimeout(_) => "AdmissionTimeout",
            EngineError::LimitExceeded(_) => "LimitExceeded",
            EngineError::WalError(_) => "InternalError",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "invalid request: {msg}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::CapacityExceeded {
                campground_id,
                peak,
                requested,
                capacity,
            } => write!(
                f,
                "capacity exceeded on {campground_id}: {peak} reserved + {requested} requested > {capacity}"
            ),
            EngineError::InvalidTransition { id, from, to } => {
                write!(f, "reservation {id} cannot move from {from} to {to}")
            }
            EngineError::AdmissionTimeout(id) => {
                write!(f, "timed out waiting for admission lock on {id}")
            }
            EngineError::Conflict(msg) => write!(f, "conflict: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
