use thiserror::Error;

/// Failure of a lifecycle operation, surfaced verbatim to the caller.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A required field is missing or malformed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The operation is not legal from the work order's current state.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// The caller is known but not allowed to perform the operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// No usable caller identity was supplied.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Another writer changed the record between read and write.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

impl LifecycleError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::PreconditionFailed(_) => "precondition_failed",
            Self::Unauthorized(_) => "unauthorized",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::NotFound { .. } => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Storage(_) => "storage_error",
        }
    }
}

// Postgres unique_violation
const UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for LifecycleError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Self::Conflict(db.message().to_string())
            }
            _ => Self::Storage(err.to_string()),
        }
    }
}
