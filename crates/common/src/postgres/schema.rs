use crate::domain::{
    DomainResult, PartitionMonth, ReadingRepository, SensorRegistration, SensorRegistry,
    SensorType,
};
use crate::postgres::{
    PostgresClient, PostgresReadingRepository, PostgresSensorRegistry, classify_pg_error,
};
use tracing::{info, instrument};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS sensors (
    sensor_id VARCHAR(50) PRIMARY KEY,
    type VARCHAR(20) NOT NULL,
    location VARCHAR(100),
    status VARCHAR(20) DEFAULT 'active',
    last_reading TIMESTAMPTZ,
    created_at TIMESTAMPTZ DEFAULT now(),
    updated_at TIMESTAMPTZ DEFAULT now()
);

CREATE TABLE IF NOT EXISTS temperature_readings (
    id BIGSERIAL,
    sensor_id VARCHAR(50) REFERENCES sensors(sensor_id),
    value DECIMAL(5,2) NOT NULL,
    timestamp TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ DEFAULT now(),
    PRIMARY KEY (id, timestamp)
) PARTITION BY RANGE (timestamp);

CREATE TABLE IF NOT EXISTS humidity_readings (
    id BIGSERIAL,
    sensor_id VARCHAR(50) REFERENCES sensors(sensor_id),
    value DECIMAL(5,2) NOT NULL,
    timestamp TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ DEFAULT now(),
    PRIMARY KEY (id, timestamp)
) PARTITION BY RANGE (timestamp);

CREATE TABLE IF NOT EXISTS motion_events (
    id BIGSERIAL,
    sensor_id VARCHAR(50) REFERENCES sensors(sensor_id),
    detected BOOLEAN NOT NULL,
    timestamp TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ DEFAULT now(),
    PRIMARY KEY (id, timestamp)
) PARTITION BY RANGE (timestamp);

CREATE TABLE IF NOT EXISTS sensor_analytics (
    id BIGSERIAL PRIMARY KEY,
    sensor_id VARCHAR(50) REFERENCES sensors(sensor_id),
    metric_name VARCHAR(50) NOT NULL,
    value DECIMAL(10,2) NOT NULL,
    window_start TIMESTAMPTZ NOT NULL,
    window_end TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_temp_sensor_timestamp ON temperature_readings(sensor_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_humidity_sensor_timestamp ON humidity_readings(sensor_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_motion_sensor_timestamp ON motion_events(sensor_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_analytics_sensor_metric ON sensor_analytics(sensor_id, metric_name, window_start);
";

/// Setup-time storage preparation: tables, monthly partitions and the
/// sensor registry. The pipeline itself never runs any of this.
pub struct SchemaManager {
    client: PostgresClient,
}

impl SchemaManager {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }

    /// Create every table and index that does not exist yet.
    pub async fn apply_schema(&self) -> DomainResult<()> {
        let conn = self.client.get_connection().await?;
        conn.batch_execute(SCHEMA_SQL)
            .await
            .map_err(classify_pg_error)?;
        info!("storage schema applied");
        Ok(())
    }

    /// Ensure the partition for `from` and the following `months_ahead`
    /// months exists for every readings table.
    #[instrument(skip_all, fields(from = %from, months_ahead))]
    pub async fn ensure_partitions_ahead(
        &self,
        from: PartitionMonth,
        months_ahead: u32,
    ) -> DomainResult<Vec<String>> {
        let repository = PostgresReadingRepository::new(self.client.clone());
        let mut ensured = Vec::new();

        for month in from.with_following(months_ahead) {
            for sensor_type in SensorType::ALL {
                repository.ensure_partition(sensor_type, month).await?;
                ensured.push(month.partition_name(sensor_type.table_name()));
            }
        }

        info!(count = ensured.len(), first_month = %from, "partitions ensured");
        Ok(ensured)
    }

    pub async fn seed_sensors(&self, registrations: &[SensorRegistration]) -> DomainResult<()> {
        let registry = PostgresSensorRegistry::new(self.client.clone());
        for registration in registrations {
            registry.register_sensor(registration).await?;
        }
        info!(count = registrations.len(), "sensor registry seeded");
        Ok(())
    }
}
