use crate::domain::{
    IngestPipeline, MetricsRecorder, PipelineConfig, PipelineHandle, PipelineStorage,
    ReadingSource,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Wires a reading source and storage into an ingest pipeline and exposes it
/// as a runner process.
pub struct IngestWorker {
    pipeline: IngestPipeline,
}

impl IngestWorker {
    pub fn new(
        source: Box<dyn ReadingSource>,
        storage: PipelineStorage,
        config: PipelineConfig,
    ) -> Self {
        info!("Initializing ingest worker");
        Self {
            pipeline: IngestPipeline::new(source, storage, config),
        }
    }

    pub fn handle(&self) -> PipelineHandle {
        self.pipeline.handle()
    }

    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        self.pipeline.metrics()
    }

    #[allow(clippy::type_complexity)]
    pub fn into_runner_process(
        self,
    ) -> Box<
        dyn FnOnce(
                CancellationToken,
            ) -> std::pin::Pin<
                Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
            > + Send,
    > {
        let pipeline = self.pipeline;
        Box::new(move |ctx| Box::pin(async move { pipeline.run(ctx).await }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SensorSimulator, SimulatorConfig};
    use chrono::Utc;
    use common::domain::{PartitionMonth, ReadingRepository, SensorRegistry, SensorType};
    use common::in_memory::InMemorySensorStore;
    use std::time::Duration;

    #[tokio::test]
    async fn test_runner_process_stops_on_cancellation() {
        let simulator = SensorSimulator::new(SimulatorConfig {
            num_sensors: 2,
            batch_size: None,
            seed: Some(3),
        });
        let store = InMemorySensorStore::new();
        for registration in simulator.registrations() {
            store.register_sensor(&registration).await.unwrap();
        }
        for sensor_type in SensorType::ALL {
            for month in PartitionMonth::from_timestamp(Utc::now()).with_following(1) {
                store.ensure_partition(sensor_type, month).await.unwrap();
            }
        }

        let storage = PipelineStorage {
            router: Arc::new(store.clone()),
            aggregator_readings: Arc::new(store.clone()),
            aggregator_analytics: Arc::new(store.clone()),
            monitor: Arc::new(store.clone()),
        };
        let worker = IngestWorker::new(
            Box::new(simulator),
            storage,
            PipelineConfig {
                sampling_interval: Duration::from_millis(5),
                ..PipelineConfig::default()
            },
        );
        let handle = worker.handle();
        let metrics = worker.metrics();

        let ctx = CancellationToken::new();
        let task = tokio::spawn((worker.into_runner_process())(ctx.clone()));
        tokio::time::sleep(Duration::from_millis(40)).await;
        ctx.cancel();
        task.await.unwrap().unwrap();

        assert!(!handle.is_running());
        assert!(metrics.total_stored() >= 6);
        assert!(store.is_closed().await);
    }
}
