use crate::domain::{AnalyticsRecord, AnalyticsRepository, DomainResult};
use crate::postgres::{PostgresClient, classify_pg_error};
use async_trait::async_trait;
use tracing::{debug, instrument};

#[derive(Clone)]
pub struct PostgresAnalyticsRepository {
    client: PostgresClient,
}

impl PostgresAnalyticsRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AnalyticsRepository for PostgresAnalyticsRepository {
    #[instrument(skip(self, record), fields(sensor_id = %record.sensor_id, metric = %record.metric_name))]
    async fn insert_record(&self, record: &AnalyticsRecord) -> DomainResult<i64> {
        let conn = self.client.get_connection().await?;

        // Autocommit: every record lands on its own.
        let row = conn
            .query_one(
                "INSERT INTO sensor_analytics (sensor_id, metric_name, value, window_start, window_end)
                 VALUES ($1, $2, $3::float8, $4, $5)
                 RETURNING id",
                &[
                    &record.sensor_id,
                    &record.metric_name,
                    &record.value,
                    &record.window_start,
                    &record.window_end,
                ],
            )
            .await
            .map_err(classify_pg_error)?;

        let id: i64 = row.get("id");
        debug!(id, sensor_id = %record.sensor_id, metric = %record.metric_name, "analytics record stored");
        Ok(id)
    }

    async fn close(&self) -> DomainResult<()> {
        self.client.close();
        Ok(())
    }
}
