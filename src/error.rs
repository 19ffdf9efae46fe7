use uuid::Uuid;

/// The error taxonomy from spec.md §7. Each variant is a distinct `kind`
/// the caller can match on; `reason()` gives the stable string used in
/// structured logs and audit events, the way the teacher's `Error::reason`
/// feeds CRD status conditions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("downstream unavailable: {0}")]
    Unavailable(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("internal error (id={id}): {message}")]
    Internal { id: Uuid, message: String },

    #[error("partial rollback failed: {0}")]
    PartialRollbackFailed(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn reason(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NotFound",
            Error::AlreadyExists(_) => "AlreadyExists",
            Error::InvalidInput(_) => "InvalidInput",
            Error::PreconditionFailed(_) => "PreconditionFailed",
            Error::Conflict(_) => "Conflict",
            Error::Timeout(_) => "Timeout",
            Error::DeadlineExceeded => "DeadlineExceeded",
            Error::Unavailable(_) => "Unavailable",
            Error::NotSupported(_) => "NotSupported",
            Error::Internal { .. } => "Internal",
            Error::PartialRollbackFailed(_) => "PartialRollbackFailed",
            Error::Store(_) => "Internal",
            Error::Serialization(_) => "Internal",
        }
    }

    /// Construct an `internal` error, logging full context under a
    /// correlation id and returning only that id to the caller (spec.md §7).
    pub fn internal(context: impl Into<String>) -> Self {
        let id = Uuid::new_v4();
        let message = context.into();
        tracing::error!(error_id = %id, %message, "internal invariant violation");
        Error::Internal { id, message }
    }
}
