use crate::domain::{
    AnalyticsRecord, AnalyticsRepository, DomainError, DomainResult, PartitionMonth,
    PartitionSize, Reading, ReadingRepository, SensorRegistration, SensorRegistry, SensorType,
    StoredReading,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct StoreState {
    sensors: BTreeMap<String, SensorRegistration>,
    partitions: BTreeSet<(SensorType, PartitionMonth)>,
    readings: HashMap<SensorType, Vec<StoredReading>>,
    analytics: Vec<AnalyticsRecord>,
    next_reading_id: i64,
    next_analytics_id: i64,
    disconnected: bool,
    closed: bool,
}

impl StoreState {
    fn check_connected(&self) -> DomainResult<()> {
        if self.closed {
            return Err(DomainError::ConnectionLost("store is closed".to_string()));
        }
        if self.disconnected {
            return Err(DomainError::ConnectionLost("connection dropped".to_string()));
        }
        Ok(())
    }

    fn check_registered(&self, sensor_id: &str) -> DomainResult<()> {
        if self.sensors.contains_key(sensor_id) {
            Ok(())
        } else {
            Err(DomainError::SensorNotRegistered(sensor_id.to_string()))
        }
    }
}

/// In-memory storage backend with the same integrity rules as the
/// relational store: readings must reference a registered sensor and land in
/// an existing monthly partition.
///
/// Clones share state, so one store can back the router, the aggregator and
/// the health reporter at once.
#[derive(Clone, Default)]
pub struct InMemorySensorStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemorySensorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the connection dropping. Calls fail with `ConnectionLost`
    /// until `reconnect` succeeds.
    pub async fn disconnect(&self) {
        self.state.write().await.disconnected = true;
    }

    pub async fn is_closed(&self) -> bool {
        self.state.read().await.closed
    }

    /// Stored rows of one sensor type in insertion order.
    pub async fn readings(&self, sensor_type: SensorType) -> Vec<StoredReading> {
        self.state
            .read()
            .await
            .readings
            .get(&sensor_type)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn analytics_records(&self) -> Vec<AnalyticsRecord> {
        self.state.read().await.analytics.clone()
    }
}

#[async_trait]
impl ReadingRepository for InMemorySensorStore {
    async fn ensure_connection(&self) -> DomainResult<()> {
        self.state.read().await.check_connected()
    }

    async fn reconnect(&self) -> DomainResult<()> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(DomainError::ConnectionLost("store is closed".to_string()));
        }
        state.disconnected = false;
        Ok(())
    }

    async fn insert_reading(&self, reading: &Reading) -> DomainResult<i64> {
        let mut state = self.state.write().await;
        state.check_connected()?;
        state.check_registered(&reading.sensor_id)?;

        let month = reading.partition();
        if !state.partitions.contains(&(reading.sensor_type, month)) {
            return Err(DomainError::PartitionMissing {
                table: reading.sensor_type.table_name().to_string(),
                month: month.to_string(),
            });
        }

        let kind_matches = reading.sensor_type.is_numeric() == reading.value.as_f64().is_some();
        if !kind_matches {
            return Err(DomainError::IntegrityViolation {
                code: "23502".to_string(),
                message: format!(
                    "value kind does not match {} table",
                    reading.sensor_type.table_name()
                ),
            });
        }

        state.next_reading_id += 1;
        let id = state.next_reading_id;
        state
            .readings
            .entry(reading.sensor_type)
            .or_default()
            .push(StoredReading {
                id,
                sensor_id: reading.sensor_id.clone(),
                value: reading.value,
                timestamp: reading.timestamp,
                created_at: Utc::now(),
            });
        Ok(id)
    }

    async fn query_window(
        &self,
        sensor_type: SensorType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Vec<StoredReading>> {
        let state = self.state.read().await;
        state.check_connected()?;

        let mut rows: Vec<StoredReading> = state
            .readings
            .get(&sensor_type)
            .map(|rows| {
                rows.iter()
                    .filter(|row| row.timestamp >= start && row.timestamp < end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn ensure_partition(
        &self,
        sensor_type: SensorType,
        month: PartitionMonth,
    ) -> DomainResult<()> {
        let mut state = self.state.write().await;
        state.check_connected()?;
        state.partitions.insert((sensor_type, month));
        Ok(())
    }

    async fn partition_sizes(&self) -> DomainResult<Vec<PartitionSize>> {
        let state = self.state.read().await;
        state.check_connected()?;

        Ok(state
            .partitions
            .iter()
            .map(|(sensor_type, month)| {
                let row_count = state
                    .readings
                    .get(sensor_type)
                    .map(|rows| rows.iter().filter(|r| month.contains(r.timestamp)).count())
                    .unwrap_or(0);
                PartitionSize {
                    table_name: sensor_type.table_name().to_string(),
                    partition_name: month.partition_name(sensor_type.table_name()),
                    size: format!("{} rows", row_count),
                    row_count: row_count as i64,
                }
            })
            .collect())
    }

    async fn close(&self) -> DomainResult<()> {
        self.state.write().await.closed = true;
        Ok(())
    }
}

#[async_trait]
impl AnalyticsRepository for InMemorySensorStore {
    async fn insert_record(&self, record: &AnalyticsRecord) -> DomainResult<i64> {
        let mut state = self.state.write().await;
        state.check_connected()?;
        state.check_registered(&record.sensor_id)?;

        state.next_analytics_id += 1;
        state.analytics.push(record.clone());
        Ok(state.next_analytics_id)
    }

    async fn close(&self) -> DomainResult<()> {
        self.state.write().await.closed = true;
        Ok(())
    }
}

#[async_trait]
impl SensorRegistry for InMemorySensorStore {
    async fn sensor_exists(&self, sensor_id: &str) -> DomainResult<bool> {
        Ok(self.state.read().await.sensors.contains_key(sensor_id))
    }

    async fn register_sensor(&self, registration: &SensorRegistration) -> DomainResult<()> {
        let mut state = self.state.write().await;
        state
            .sensors
            .insert(registration.sensor_id.clone(), registration.clone());
        Ok(())
    }

    async fn list_sensors(&self) -> DomainResult<Vec<SensorRegistration>> {
        Ok(self.state.read().await.sensors.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SensorValue;
    use chrono::TimeZone;

    fn temperature_reading(sensor_id: &str, value: f64, timestamp: DateTime<Utc>) -> Reading {
        Reading {
            sensor_id: sensor_id.to_string(),
            sensor_type: SensorType::Temperature,
            value: SensorValue::Numeric(value),
            timestamp,
            location: Some("room_1".to_string()),
        }
    }

    async fn prepared_store(timestamp: DateTime<Utc>) -> InMemorySensorStore {
        let store = InMemorySensorStore::new();
        store
            .register_sensor(&SensorRegistration::active(
                "temp_sensor_1",
                SensorType::Temperature,
                "room_1",
            ))
            .await
            .unwrap();
        store
            .ensure_partition(SensorType::Temperature, PartitionMonth::from_timestamp(timestamp))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_insert_and_query_window() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        let store = prepared_store(ts).await;

        let id = store
            .insert_reading(&temperature_reading("temp_sensor_1", 21.5, ts))
            .await
            .unwrap();
        assert_eq!(id, 1);

        let rows = store
            .query_window(SensorType::Temperature, ts, ts + chrono::Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, SensorValue::Numeric(21.5));

        // window end is exclusive
        let rows = store
            .query_window(SensorType::Temperature, ts - chrono::Duration::minutes(1), ts)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_sensor_is_rejected() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        let store = prepared_store(ts).await;

        let result = store
            .insert_reading(&temperature_reading("temp_sensor_99", 21.5, ts))
            .await;
        assert!(matches!(result, Err(DomainError::SensorNotRegistered(_))));
        assert!(store.readings(SensorType::Temperature).await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_partition_is_rejected() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        let store = prepared_store(ts).await;

        let next_month = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        let result = store
            .insert_reading(&temperature_reading("temp_sensor_1", 21.5, next_month))
            .await;
        match result {
            Err(DomainError::PartitionMissing { table, month }) => {
                assert_eq!(table, "temperature_readings");
                assert_eq!(month, "2025-02");
            }
            other => panic!("expected PartitionMissing, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disconnect_and_reconnect() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        let store = prepared_store(ts).await;

        store.disconnect().await;
        let err = store.ensure_connection().await.unwrap_err();
        assert!(err.is_transient());

        store.reconnect().await.unwrap();
        store.ensure_connection().await.unwrap();
        store
            .insert_reading(&temperature_reading("temp_sensor_1", 21.5, ts))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_blocks_reconnect() {
        let store = InMemorySensorStore::new();
        ReadingRepository::close(&store).await.unwrap();
        ReadingRepository::close(&store).await.unwrap();
        assert!(store.is_closed().await);
        assert!(store.reconnect().await.is_err());
    }

    #[tokio::test]
    async fn test_partition_sizes_count_rows_per_month() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        let store = prepared_store(ts).await;
        store
            .insert_reading(&temperature_reading("temp_sensor_1", 20.0, ts))
            .await
            .unwrap();
        store
            .insert_reading(&temperature_reading("temp_sensor_1", 20.5, ts))
            .await
            .unwrap();

        let sizes = store.partition_sizes().await.unwrap();
        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes[0].partition_name, "temperature_readings_p2025_01");
        assert_eq!(sizes[0].row_count, 2);
    }
}
