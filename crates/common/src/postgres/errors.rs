use crate::domain::DomainError;
use deadpool_postgres::PoolError;

/// Map a driver error onto the domain taxonomy.
///
/// SQLSTATE class `23` (integrity constraint violation) covers foreign key
/// failures and rows with no matching partition. Class `08` and admin
/// shutdowns mean the connection went away under us.
pub fn classify_pg_error(error: tokio_postgres::Error) -> DomainError {
    if let Some(db_error) = error.as_db_error() {
        let code = db_error.code().code();
        if code.starts_with("23") {
            return DomainError::IntegrityViolation {
                code: code.to_string(),
                message: db_error.message().to_string(),
            };
        }
        if code.starts_with("08") || code == "57P01" {
            return DomainError::ConnectionLost(db_error.message().to_string());
        }
        return DomainError::RepositoryError(error.into());
    }

    if error.is_closed() || is_io_error(&error) {
        return DomainError::ConnectionLost(error.to_string());
    }

    DomainError::RepositoryError(error.into())
}

/// Pool checkout failures are always treated as a lost connection.
pub fn classify_pool_error(error: PoolError) -> DomainError {
    match error {
        PoolError::Backend(e) => classify_pg_error(e),
        other => DomainError::ConnectionLost(other.to_string()),
    }
}

fn is_io_error(error: &tokio_postgres::Error) -> bool {
    std::error::Error::source(error)
        .map(|source| source.downcast_ref::<std::io::Error>().is_some())
        .unwrap_or(false)
}
