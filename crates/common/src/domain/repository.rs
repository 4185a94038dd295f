use crate::domain::{
    AnalyticsRecord, DomainResult, PartitionMonth, PartitionSize, Reading, SensorRegistration,
    SensorType, StoredReading,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Repository trait for raw reading persistence
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ReadingRepository: Send + Sync {
    /// Verify the store is reachable. Returns `ConnectionLost` when it is not.
    async fn ensure_connection(&self) -> DomainResult<()>;

    /// Drop any pooled connections and establish a fresh one.
    async fn reconnect(&self) -> DomainResult<()>;

    /// Persist a validated reading into the table for its sensor type and
    /// return the assigned row id. Each call commits or fails on its own.
    async fn insert_reading(&self, reading: &Reading) -> DomainResult<i64>;

    /// Readings of one sensor type with `start <= timestamp < end`, oldest first.
    async fn query_window(
        &self,
        sensor_type: SensorType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Vec<StoredReading>>;

    /// Create the monthly partition if it does not exist yet.
    async fn ensure_partition(
        &self,
        sensor_type: SensorType,
        month: PartitionMonth,
    ) -> DomainResult<()>;

    async fn partition_sizes(&self) -> DomainResult<Vec<PartitionSize>>;

    /// Release the underlying connections. Safe to call more than once.
    async fn close(&self) -> DomainResult<()>;
}

/// Repository trait for derived analytics records
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    async fn insert_record(&self, record: &AnalyticsRecord) -> DomainResult<i64>;

    async fn close(&self) -> DomainResult<()>;
}

/// Registry of known sensors. Readings may only reference registered ids.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SensorRegistry: Send + Sync {
    async fn sensor_exists(&self, sensor_id: &str) -> DomainResult<bool>;

    /// Insert or refresh a registry entry.
    async fn register_sensor(&self, registration: &SensorRegistration) -> DomainResult<()>;

    async fn list_sensors(&self) -> DomainResult<Vec<SensorRegistration>>;
}
