use crate::domain::{DomainResult, SensorRegistration, SensorRegistry};
use crate::postgres::{PostgresClient, classify_pg_error};
use async_trait::async_trait;
use tracing::{debug, instrument};

#[derive(Clone)]
pub struct PostgresSensorRegistry {
    client: PostgresClient,
}

impl PostgresSensorRegistry {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SensorRegistry for PostgresSensorRegistry {
    async fn sensor_exists(&self, sensor_id: &str) -> DomainResult<bool> {
        let conn = self.client.get_connection().await?;
        let row = conn
            .query_opt("SELECT 1 FROM sensors WHERE sensor_id = $1", &[&sensor_id])
            .await
            .map_err(classify_pg_error)?;
        Ok(row.is_some())
    }

    #[instrument(skip(self, registration), fields(sensor_id = %registration.sensor_id))]
    async fn register_sensor(&self, registration: &SensorRegistration) -> DomainResult<()> {
        let conn = self.client.get_connection().await?;
        conn.execute(
            "INSERT INTO sensors (sensor_id, type, location, status)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (sensor_id) DO UPDATE
             SET type = EXCLUDED.type,
                 location = EXCLUDED.location,
                 status = EXCLUDED.status,
                 updated_at = now()",
            &[
                &registration.sensor_id,
                &registration.sensor_type.as_str(),
                &registration.location,
                &registration.status.as_str(),
            ],
        )
        .await
        .map_err(classify_pg_error)?;

        debug!(sensor_id = %registration.sensor_id, "sensor registered");
        Ok(())
    }

    async fn list_sensors(&self) -> DomainResult<Vec<SensorRegistration>> {
        let conn = self.client.get_connection().await?;
        let rows = conn
            .query(
                "SELECT sensor_id, type, COALESCE(location, '') AS location,
                        COALESCE(status, 'active') AS status
                 FROM sensors ORDER BY sensor_id",
                &[],
            )
            .await
            .map_err(classify_pg_error)?;

        rows.iter()
            .map(|row| {
                let sensor_type: String = row.get("type");
                let status: String = row.get("status");
                Ok(SensorRegistration {
                    sensor_id: row.get("sensor_id"),
                    sensor_type: sensor_type.parse()?,
                    location: row.get("location"),
                    status: status.parse()?,
                })
            })
            .collect()
    }
}
