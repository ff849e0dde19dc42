use thiserror::Error;

/// Failures from the persistence gateway (`spec.md` C4).
///
/// Handlers need to tell a connection hiccup (retry, or answer the client
/// with a "warn" and move on) apart from a request that is wrong on its
/// face (reject it, do not retry). [`DbError::is_transient`] is that
/// split.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database pool unavailable: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("database query failed: {0}")]
    Query(#[from] tokio_postgres::Error),

    #[error("user_id must be >= 1000, got {0}")]
    UserIdTooLow(i64),

    #[error("invalid database configuration: {0}")]
    Config(String),
}

impl DbError {
    /// Whether the failure is plausibly transient (connection reset, pool
    /// exhaustion, deadlock) and so worth retrying at the dispatcher's
    /// discretion, as opposed to a fatal, request-is-wrong failure.
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::Pool(_) => true,
            DbError::Query(e) => e.is_closed() || e.code().is_none(),
            DbError::UserIdTooLow(_) | DbError::Config(_) => false,
        }
    }
}
