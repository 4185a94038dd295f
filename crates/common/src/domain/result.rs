use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Storage connection lost: {0}")]
    ConnectionLost(String),

    #[error("Integrity violation ({code}): {message}")]
    IntegrityViolation { code: String, message: String },

    #[error("Sensor not registered: {0}")]
    SensorNotRegistered(String),

    #[error("No partition of {table} found for month {month}")]
    PartitionMissing { table: String, month: String },

    #[error("Invalid partition month: {0}")]
    InvalidPartition(String),

    #[error("Unknown sensor type: {0}")]
    UnknownSensorType(String),

    #[error("Reading source failure: {0}")]
    SourceFailure(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}

impl DomainError {
    /// Errors worth one reconnect-and-retry: the connection dropped underneath us.
    pub fn is_transient(&self) -> bool {
        matches!(self, DomainError::ConnectionLost(_))
    }

    /// Errors that will fail the same way on every retry.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            DomainError::IntegrityViolation { .. }
                | DomainError::SensorNotRegistered(_)
                | DomainError::PartitionMissing { .. }
        )
    }
}
