//! Errors surfaced by the holiday and guest services.

/// Failure of a holiday or guest operation.
///
/// Either way the operation's transaction has been rolled back before the
/// error reaches the caller.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A holiday referenced mid-operation does not exist.
    #[error("holiday {0} not found")]
    HolidayNotFound(i32),

    /// The database rejected a statement or the commit.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
