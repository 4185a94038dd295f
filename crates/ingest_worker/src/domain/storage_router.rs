use common::domain::{DomainResult, Reading, ReadingRepository};
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

/// Routes validated readings to the store, reconnecting at most once per
/// reading when the connection has dropped.
pub struct StorageRouter {
    repository: Arc<dyn ReadingRepository>,
}

impl StorageRouter {
    pub fn new(repository: Arc<dyn ReadingRepository>) -> Self {
        Self { repository }
    }

    /// Persist one reading and return its row id.
    ///
    /// A transient failure, whether seen by the liveness check or by the
    /// insert itself, triggers a single reconnect. After that the insert is
    /// attempted once more and any error is returned. Integrity failures are
    /// returned immediately.
    #[instrument(skip(self, reading), fields(sensor_id = %reading.sensor_id, table = reading.sensor_type.table_name()))]
    pub async fn store(&self, reading: &Reading) -> DomainResult<i64> {
        let mut reconnected = false;

        if let Err(e) = self.repository.ensure_connection().await {
            if !e.is_transient() {
                return Err(e);
            }
            warn!(error = %e, "storage connection lost, reconnecting");
            self.repository.reconnect().await?;
            reconnected = true;
        }

        match self.repository.insert_reading(reading).await {
            Err(e) if e.is_transient() && !reconnected => {
                warn!(error = %e, "insert hit a dropped connection, reconnecting once");
                self.repository.reconnect().await?;
                self.repository.insert_reading(reading).await
            }
            result => result,
        }
    }

    /// Store each reading independently; returns how many were persisted.
    /// A failed reading is logged and skipped.
    pub async fn store_batch(&self, readings: &[Reading]) -> usize {
        let mut stored = 0;
        for reading in readings {
            match self.store(reading).await {
                Ok(id) => {
                    debug!(id, sensor_id = %reading.sensor_id, "reading persisted");
                    stored += 1;
                }
                Err(e) => {
                    error!(
                        sensor_id = %reading.sensor_id,
                        sensor_type = %reading.sensor_type,
                        timestamp = %reading.timestamp,
                        partition = %reading.partition(),
                        transient = e.is_transient(),
                        error = %e,
                        "failed to store reading"
                    );
                }
            }
        }
        stored
    }

    pub async fn close(&self) -> DomainResult<()> {
        self.repository.close().await
    }
}
