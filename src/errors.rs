use thiserror::Error;

/// Failures surfaced by the store facade.
///
/// Missing rows are never an error: lookups return `Ok(None)` or an empty
/// vector and callers must check presence.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The call was rejected before any statement was issued.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Constraint violations, transient I/O failures and driver errors,
    /// propagated unmodified. Retry policy belongs to the caller or the
    /// connection pool.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Whether the underlying driver reported a uniqueness or foreign-key
    /// violation, so callers can branch without matching error codes.
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(e)) => {
                e.is_unique_violation() || e.is_foreign_key_violation()
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
