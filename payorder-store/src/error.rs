use payorder_core::OrderError;

/// Sort a driver error into the connection or transaction kind. Pool and
/// socket level failures mean the database could not be reached; anything
/// else happened inside a statement.
pub fn classify(err: sqlx::Error) -> OrderError {
    match err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => OrderError::Connection(Box::new(err)),
        other => OrderError::Transaction(Box::new(other)),
    }
}
