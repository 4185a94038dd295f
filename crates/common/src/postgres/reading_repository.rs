use crate::domain::{
    DomainError, DomainResult, PartitionMonth, PartitionSize, Reading, ReadingRepository,
    SensorType, SensorValue, StoredReading,
};
use crate::postgres::{PostgresClient, classify_pg_error};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::{debug, instrument, warn};

const PARTITION_SIZES_SQL: &str = "
    SELECT
        parent.relname AS table_name,
        child.relname AS partition_name,
        pg_size_pretty(pg_relation_size(child.oid)) AS size,
        pg_stat_get_live_tuples(child.oid) AS row_count
    FROM pg_inherits
    JOIN pg_class parent ON pg_inherits.inhparent = parent.oid
    JOIN pg_class child ON pg_inherits.inhrelid = child.oid
    WHERE parent.relname = $1
    ORDER BY child.relname";

/// Readings stored in the three monthly-partitioned tables.
#[derive(Clone)]
pub struct PostgresReadingRepository {
    client: PostgresClient,
}

impl PostgresReadingRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }

    fn insert_sql(sensor_type: SensorType) -> String {
        let column = value_column(sensor_type);
        let cast = if sensor_type.is_numeric() { "::float8" } else { "" };
        format!(
            "INSERT INTO {} (sensor_id, {}, timestamp) VALUES ($1, $2{}, $3) RETURNING id",
            sensor_type.table_name(),
            column,
            cast
        )
    }
}

fn value_column(sensor_type: SensorType) -> &'static str {
    if sensor_type.is_numeric() {
        "value"
    } else {
        "detected"
    }
}

fn stored_reading_from_row(sensor_type: SensorType, row: &Row) -> StoredReading {
    let value = if sensor_type.is_numeric() {
        SensorValue::Numeric(row.get("value"))
    } else {
        SensorValue::Detected(row.get("detected"))
    };

    StoredReading {
        id: row.get("id"),
        sensor_id: row.get("sensor_id"),
        value,
        timestamp: row.get("timestamp"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl ReadingRepository for PostgresReadingRepository {
    async fn ensure_connection(&self) -> DomainResult<()> {
        self.client.ping().await
    }

    async fn reconnect(&self) -> DomainResult<()> {
        self.client.reset().await
    }

    #[instrument(skip(self, reading), fields(sensor_id = %reading.sensor_id))]
    async fn insert_reading(&self, reading: &Reading) -> DomainResult<i64> {
        let sql = Self::insert_sql(reading.sensor_type);
        let mut conn = self.client.get_connection().await?;

        // One transaction per reading: a failed insert leaves nothing behind.
        let tx = conn.transaction().await.map_err(classify_pg_error)?;

        let row = match (reading.sensor_type.is_numeric(), reading.value) {
            (true, SensorValue::Numeric(value)) => {
                tx.query_one(sql.as_str(), &[&reading.sensor_id, &value, &reading.timestamp])
                    .await
            }
            (false, SensorValue::Detected(detected)) => {
                tx.query_one(sql.as_str(), &[&reading.sensor_id, &detected, &reading.timestamp])
                    .await
            }
            _ => {
                return Err(DomainError::RepositoryError(anyhow::anyhow!(
                    "value kind does not match {} table",
                    reading.sensor_type.table_name()
                )));
            }
        };

        let row = match row {
            Ok(row) => row,
            Err(e) => {
                let error = classify_pg_error(e);
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback after failed insert did not complete");
                }
                return Err(error);
            }
        };

        tx.commit().await.map_err(classify_pg_error)?;

        let id: i64 = row.get("id");
        debug!(id, table = reading.sensor_type.table_name(), "reading stored");
        Ok(id)
    }

    async fn query_window(
        &self,
        sensor_type: SensorType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Vec<StoredReading>> {
        let value_select = if sensor_type.is_numeric() {
            "value::float8 AS value"
        } else {
            "detected"
        };
        let sql = format!(
            "SELECT id, sensor_id, {}, timestamp, created_at FROM {}
             WHERE timestamp >= $1 AND timestamp < $2
             ORDER BY timestamp, id",
            value_select,
            sensor_type.table_name()
        );

        let conn = self.client.get_connection().await?;
        let rows = conn
            .query(sql.as_str(), &[&start, &end])
            .await
            .map_err(classify_pg_error)?;

        Ok(rows
            .iter()
            .map(|row| stored_reading_from_row(sensor_type, row))
            .collect())
    }

    async fn ensure_partition(
        &self,
        sensor_type: SensorType,
        month: PartitionMonth,
    ) -> DomainResult<()> {
        let table = sensor_type.table_name();
        let partition = month.partition_name(table);
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} PARTITION OF {} FOR VALUES FROM ('{}') TO ('{}')",
            partition,
            table,
            month.start().format("%Y-%m-%d %H:%M:%S+00"),
            month.end().format("%Y-%m-%d %H:%M:%S+00"),
        );

        let conn = self.client.get_connection().await?;
        conn.batch_execute(&sql).await.map_err(classify_pg_error)?;

        debug!(partition = %partition, "partition ensured");
        Ok(())
    }

    async fn partition_sizes(&self) -> DomainResult<Vec<PartitionSize>> {
        let conn = self.client.get_connection().await?;
        let mut sizes = Vec::new();

        for sensor_type in SensorType::ALL {
            let rows = conn
                .query(PARTITION_SIZES_SQL, &[&sensor_type.table_name()])
                .await
                .map_err(classify_pg_error)?;

            sizes.extend(rows.iter().map(|row| PartitionSize {
                table_name: row.get("table_name"),
                partition_name: row.get("partition_name"),
                size: row.get("size"),
                row_count: row.get("row_count"),
            }));
        }

        Ok(sizes)
    }

    async fn close(&self) -> DomainResult<()> {
        self.client.close();
        Ok(())
    }
}
