use crate::domain::{
    AnalyticsAggregator, HealthReport, MetricsRecorder, QualityMetrics, ReadingSource,
    ReadingValidator, StorageRouter, ValidRanges,
};
use anyhow::Context;
use common::domain::{AnalyticsRepository, ReadingRepository};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub sampling_interval: Duration,
    pub analytics_interval: Duration,
    pub analytics_window_minutes: u32,
    pub metrics_window_size: usize,
    /// Emit a health report each time the stored total crosses a multiple of
    /// this. Zero disables reporting.
    pub health_report_every: u64,
    pub valid_ranges: ValidRanges,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sampling_interval: Duration::from_secs(1),
            analytics_interval: Duration::from_secs(300),
            analytics_window_minutes: 5,
            metrics_window_size: 100,
            health_report_every: 100,
            valid_ranges: ValidRanges::default(),
        }
    }
}

/// Storage handles for each pipeline component. Every component gets its own
/// handle so no two of them share a connection.
#[derive(Clone)]
pub struct PipelineStorage {
    pub router: Arc<dyn ReadingRepository>,
    pub aggregator_readings: Arc<dyn ReadingRepository>,
    pub aggregator_analytics: Arc<dyn AnalyticsRepository>,
    pub monitor: Arc<dyn ReadingRepository>,
}

/// Control surface of a pipeline. Cheap to clone and safe to use from any task.
#[derive(Clone, Debug, Default)]
pub struct PipelineHandle {
    running: Arc<AtomicBool>,
    stop: CancellationToken,
}

impl PipelineHandle {
    /// Ask the loop to stop before its next iteration. Idempotent.
    pub fn stop(&self) {
        if !self.stop.is_cancelled() {
            info!("pipeline stop requested");
        }
        self.stop.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// What one loop iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationSummary {
    pub fetched: usize,
    pub valid: usize,
    pub stored: usize,
}

/// Sequential ingest loop: fetch, validate, store, record, then periodic
/// analytics and health reporting.
pub struct IngestPipeline {
    source: Box<dyn ReadingSource>,
    validator: ReadingValidator,
    router: StorageRouter,
    aggregator: AnalyticsAggregator,
    monitor: Arc<dyn ReadingRepository>,
    recorder: Arc<MetricsRecorder>,
    config: PipelineConfig,
    handle: PipelineHandle,
    last_analytics: Instant,
    next_report_at: u64,
}

impl IngestPipeline {
    pub fn new(
        source: Box<dyn ReadingSource>,
        storage: PipelineStorage,
        config: PipelineConfig,
    ) -> Self {
        let quality = Arc::new(QualityMetrics::new());
        let validator = ReadingValidator::new(config.valid_ranges, quality.clone());
        let recorder = Arc::new(MetricsRecorder::new(config.metrics_window_size, quality));

        Self {
            source,
            validator,
            router: StorageRouter::new(storage.router),
            aggregator: AnalyticsAggregator::new(
                storage.aggregator_readings,
                storage.aggregator_analytics,
            ),
            monitor: storage.monitor,
            recorder,
            next_report_at: config.health_report_every,
            config,
            handle: PipelineHandle::default(),
            last_analytics: Instant::now(),
        }
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        self.recorder.clone()
    }

    /// Spawn the loop on the runtime. The returned handle stops it.
    pub fn start(self) -> (PipelineHandle, JoinHandle<anyhow::Result<()>>) {
        let handle = self.handle();
        handle.running.store(true, Ordering::SeqCst);
        let task = tokio::spawn(self.run(CancellationToken::new()));
        (handle, task)
    }

    /// Run until `ctx` is cancelled, `stop` is called or the source fails.
    /// Connections are released on every exit path.
    pub async fn run(mut self, ctx: CancellationToken) -> anyhow::Result<()> {
        self.handle.running.store(true, Ordering::SeqCst);
        info!(
            sampling_interval_ms = self.config.sampling_interval.as_millis() as u64,
            analytics_interval_secs = self.config.analytics_interval.as_secs(),
            "ingest pipeline started"
        );

        let result = self.run_loop(&ctx).await;
        self.handle.running.store(false, Ordering::SeqCst);

        if let Err(e) = &result {
            error!(error = %e, "ingest pipeline failed");
        }
        self.release().await;
        result
    }

    async fn run_loop(&mut self, ctx: &CancellationToken) -> anyhow::Result<()> {
        loop {
            if ctx.is_cancelled() || self.handle.stop.is_cancelled() {
                info!("ingest pipeline stopping");
                return Ok(());
            }

            self.run_iteration().await?;

            tokio::select! {
                _ = ctx.cancelled() => {}
                _ = self.handle.stop.cancelled() => {}
                _ = tokio::time::sleep(self.config.sampling_interval) => {}
            }
        }
    }

    /// One pass of the loop body, without the trailing sleep.
    pub async fn run_iteration(&mut self) -> anyhow::Result<IterationSummary> {
        let started = Instant::now();

        let batch = self
            .source
            .next_batch()
            .await
            .context("reading source failed")?;

        let mut valid = Vec::with_capacity(batch.len());
        for raw in &batch {
            match self.validator.validate(raw) {
                Ok(reading) => valid.push(reading),
                Err(reason) => warn!(sensor_id = %raw.sensor_id, reason = %reason, "invalid reading"),
            }
        }

        let stored = self.router.store_batch(&valid).await;
        let processing_time = started.elapsed();
        self.recorder
            .record_batch(batch.len(), processing_time, batch.len() - stored);

        debug!(
            fetched = batch.len(),
            valid = valid.len(),
            stored,
            processing_time_ms = processing_time.as_millis() as u64,
            "batch processed"
        );

        self.maybe_run_analytics().await;
        self.maybe_report_health().await;

        Ok(IterationSummary {
            fetched: batch.len(),
            valid: valid.len(),
            stored,
        })
    }

    async fn maybe_run_analytics(&mut self) {
        if self.last_analytics.elapsed() < self.config.analytics_interval {
            return;
        }

        info!("running analytics aggregation");
        if let Err(e) = self.aggregator.run(self.config.analytics_window_minutes).await {
            error!(error = %e, "analytics aggregation failed, skipping this cycle");
        }
        // reset even on failure
        self.last_analytics = Instant::now();
    }

    async fn maybe_report_health(&mut self) {
        let every = self.config.health_report_every;
        let total = self.recorder.total_stored();
        if every == 0 || total < self.next_report_at {
            return;
        }

        HealthReport::collect(&self.recorder, self.monitor.as_ref())
            .await
            .log();

        while self.next_report_at <= total {
            self.next_report_at += every;
        }
    }

    async fn release(&mut self) {
        // reverse of acquisition: monitor, aggregator, router
        if let Err(e) = self.monitor.close().await {
            warn!(error = %e, "failed to close monitor storage");
        }
        if let Err(e) = self.aggregator.close().await {
            warn!(error = %e, "failed to close analytics storage");
        }
        if let Err(e) = self.router.close().await {
            warn!(error = %e, "failed to close reading storage");
        }
        info!("ingest pipeline resources released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MockReadingSource, SensorSimulator, SimulatorConfig};
    use chrono::Utc;
    use common::domain::{
        DomainError, PartitionMonth, RawReading, RawValue, SensorRegistry, SensorType,
    };
    use common::in_memory::InMemorySensorStore;
    use common::{MockAnalyticsRepository, MockReadingRepository};
    use mockall::Sequence;
    use std::sync::Mutex;

    fn memory_storage(store: &InMemorySensorStore) -> PipelineStorage {
        PipelineStorage {
            router: Arc::new(store.clone()),
            aggregator_readings: Arc::new(store.clone()),
            aggregator_analytics: Arc::new(store.clone()),
            monitor: Arc::new(store.clone()),
        }
    }

    async fn prepared_store(simulator: &SensorSimulator) -> InMemorySensorStore {
        let store = InMemorySensorStore::new();
        for registration in simulator.registrations() {
            store.register_sensor(&registration).await.unwrap();
        }
        let month = PartitionMonth::from_timestamp(Utc::now());
        for month in month.with_following(1) {
            for sensor_type in SensorType::ALL {
                store.ensure_partition(sensor_type, month).await.unwrap();
            }
        }
        store
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            sampling_interval: Duration::from_millis(5),
            ..PipelineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_end_to_end_single_sweep() {
        let simulator = SensorSimulator::new(SimulatorConfig {
            num_sensors: 1,
            batch_size: None,
            seed: Some(1234),
        });
        let store = prepared_store(&simulator).await;

        let mut pipeline =
            IngestPipeline::new(Box::new(simulator), memory_storage(&store), fast_config());
        let metrics = pipeline.metrics();

        let summary = pipeline.run_iteration().await.unwrap();
        assert_eq!(
            summary,
            IterationSummary {
                fetched: 3,
                valid: 3,
                stored: 3
            }
        );

        for sensor_type in SensorType::ALL {
            assert_eq!(store.readings(sensor_type).await.len(), 1);
        }

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(metrics.performance_snapshot().readings_per_second > 0.0);
        assert_eq!(metrics.total_stored(), 3);
    }

    #[tokio::test]
    async fn test_invalid_and_unstorable_readings_count_as_errors() {
        let store = InMemorySensorStore::new();
        store
            .register_sensor(&common::domain::SensorRegistration::active(
                "temp_sensor_1",
                SensorType::Temperature,
                "room_1",
            ))
            .await
            .unwrap();
        store
            .ensure_partition(SensorType::Temperature, PartitionMonth::from_timestamp(Utc::now()))
            .await
            .unwrap();

        let raw = |sensor_id: &str, value: f64| RawReading {
            sensor_id: sensor_id.to_string(),
            timestamp: Some(Utc::now()),
            value: Some(RawValue::Number(value)),
            location: None,
            unit: None,
        };
        let batch = vec![
            raw("temp_sensor_1", 21.0),
            raw("temp_sensor_1", 45.0),
            raw("pressure_sensor_1", 1013.0),
            raw("temp_sensor_2", 22.0),
        ];

        let mut source = MockReadingSource::new();
        source.expect_next_batch().times(1).return_once(move || Ok(batch));

        let mut pipeline =
            IngestPipeline::new(Box::new(source), memory_storage(&store), fast_config());
        let metrics = pipeline.metrics();

        let summary = pipeline.run_iteration().await.unwrap();
        assert_eq!(summary.fetched, 4);
        assert_eq!(summary.valid, 2);
        assert_eq!(summary.stored, 1);

        let snapshot = metrics.performance_snapshot();
        assert_eq!(snapshot.total_errors, 3);
        assert_eq!(metrics.total_stored(), 1);
    }

    #[tokio::test]
    async fn test_stop_ends_loop_and_releases_once() {
        let simulator = SensorSimulator::new(SimulatorConfig {
            num_sensors: 2,
            batch_size: Some(3),
            seed: Some(9),
        });
        let store = prepared_store(&simulator).await;
        let pipeline =
            IngestPipeline::new(Box::new(simulator), memory_storage(&store), fast_config());

        let (handle, task) = pipeline.start();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(handle.is_running());

        handle.stop();
        handle.stop();
        task.await.unwrap().unwrap();

        assert!(!handle.is_running());
        assert!(store.is_closed().await);
        assert!(!store.readings(SensorType::Temperature).await.is_empty()
            || !store.readings(SensorType::Humidity).await.is_empty()
            || !store.readings(SensorType::Motion).await.is_empty());
    }

    #[tokio::test]
    async fn test_running_as_soon_as_started() {
        let simulator = SensorSimulator::new(SimulatorConfig {
            num_sensors: 1,
            seed: Some(5),
            ..SimulatorConfig::default()
        });
        let store = prepared_store(&simulator).await;
        let pipeline =
            IngestPipeline::new(Box::new(simulator), memory_storage(&store), fast_config());
        assert!(!pipeline.handle().is_running());

        let (handle, task) = pipeline.start();
        assert!(handle.is_running());

        handle.stop();
        task.await.unwrap().unwrap();
        assert!(!handle.is_running());
    }

    #[test]
    fn test_run_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}

        let simulator = SensorSimulator::new(SimulatorConfig::default());
        let store = InMemorySensorStore::new();
        let pipeline =
            IngestPipeline::new(Box::new(simulator), memory_storage(&store), fast_config());
        let run = pipeline.run(CancellationToken::new());
        assert_send(&run);
    }

    #[tokio::test]
    async fn test_context_cancellation_stops_loop() {
        let simulator = SensorSimulator::new(SimulatorConfig {
            num_sensors: 1,
            ..SimulatorConfig::default()
        });
        let store = prepared_store(&simulator).await;
        let pipeline =
            IngestPipeline::new(Box::new(simulator), memory_storage(&store), fast_config());
        let handle = pipeline.handle();

        let ctx = CancellationToken::new();
        let task = tokio::spawn(pipeline.run(ctx.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.cancel();

        task.await.unwrap().unwrap();
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_source_failure_is_fatal_and_still_releases() {
        let mut source = MockReadingSource::new();
        source
            .expect_next_batch()
            .times(1)
            .returning(|| Err(DomainError::SourceFailure("corrupt frame".to_string())));

        let closes = Arc::new(Mutex::new(Vec::new()));
        let mut seq = Sequence::new();

        let mut monitor = MockReadingRepository::new();
        let log = closes.clone();
        monitor
            .expect_close()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move || {
                log.lock().unwrap().push("monitor");
                Ok(())
            });

        let mut analytics = MockAnalyticsRepository::new();
        let log = closes.clone();
        analytics
            .expect_close()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move || {
                log.lock().unwrap().push("analytics");
                Ok(())
            });

        let mut aggregator_readings = MockReadingRepository::new();
        let log = closes.clone();
        aggregator_readings
            .expect_close()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move || {
                log.lock().unwrap().push("aggregator_readings");
                Ok(())
            });

        let mut router = MockReadingRepository::new();
        let log = closes.clone();
        router
            .expect_close()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move || {
                log.lock().unwrap().push("router");
                Ok(())
            });

        let storage = PipelineStorage {
            router: Arc::new(router),
            aggregator_readings: Arc::new(aggregator_readings),
            aggregator_analytics: Arc::new(analytics),
            monitor: Arc::new(monitor),
        };
        let pipeline = IngestPipeline::new(Box::new(source), storage, fast_config());
        let handle = pipeline.handle();

        let err = pipeline.run(CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("reading source failed"));
        assert!(!handle.is_running());
        assert_eq!(
            *closes.lock().unwrap(),
            vec!["monitor", "analytics", "aggregator_readings", "router"]
        );
    }

    #[tokio::test]
    async fn test_analytics_failure_is_logged_and_timer_resets() {
        let simulator = SensorSimulator::new(SimulatorConfig {
            num_sensors: 1,
            ..SimulatorConfig::default()
        });
        let store = prepared_store(&simulator).await;

        let mut failing_readings = MockReadingRepository::new();
        failing_readings
            .expect_query_window()
            .times(1)
            .returning(|_, _, _| Err(DomainError::ConnectionLost("analytics down".to_string())));

        let storage = PipelineStorage {
            aggregator_readings: Arc::new(failing_readings),
            ..memory_storage(&store)
        };
        let config = PipelineConfig {
            analytics_interval: Duration::from_millis(0),
            ..fast_config()
        };
        let mut pipeline = IngestPipeline::new(Box::new(simulator), storage, config);

        // first iteration runs analytics and fails without failing the loop
        let summary = pipeline.run_iteration().await.unwrap();
        assert_eq!(summary.stored, 3);

        // with a long interval the freshly reset timer keeps analytics idle
        pipeline.config.analytics_interval = Duration::from_secs(3600);
        pipeline.run_iteration().await.unwrap();
    }

    #[tokio::test]
    async fn test_health_report_milestones() {
        let simulator = SensorSimulator::new(SimulatorConfig {
            num_sensors: 1,
            ..SimulatorConfig::default()
        });
        let store = prepared_store(&simulator).await;

        let mut monitor = MockReadingRepository::new();
        // 3 readings per iteration, milestones at 4 and 8: iterations 2 and 3
        monitor
            .expect_partition_sizes()
            .times(2)
            .returning(|| Ok(Vec::new()));

        let storage = PipelineStorage {
            monitor: Arc::new(monitor),
            ..memory_storage(&store)
        };
        let config = PipelineConfig {
            health_report_every: 4,
            ..fast_config()
        };
        let mut pipeline = IngestPipeline::new(Box::new(simulator), storage, config);

        for _ in 0..3 {
            pipeline.run_iteration().await.unwrap();
        }
        assert_eq!(pipeline.next_report_at, 12);
    }
}
