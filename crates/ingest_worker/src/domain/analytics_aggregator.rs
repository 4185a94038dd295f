use chrono::{DateTime, Duration, Utc};
use common::domain::{
    AnalyticsRecord, AnalyticsRepository, DomainResult, ReadingRepository, SensorType,
    StoredReading,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Summary statistics of one sensor's numeric readings in a window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    pub count: usize,
}

/// Per-sensor min/max/avg/stddev of numeric rows. Non-numeric rows are ignored.
pub fn compute_window_stats(rows: &[StoredReading]) -> BTreeMap<String, WindowStats> {
    let mut values: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for row in rows {
        if let Some(v) = row.value.as_f64() {
            values.entry(row.sensor_id.clone()).or_default().push(v);
        }
    }

    values
        .into_iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(sensor_id, values)| {
            let count = values.len();
            let n = count as f64;
            let avg = values.iter().sum::<f64>() / n;
            let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / n;
            let stats = WindowStats {
                min: values.iter().copied().fold(f64::INFINITY, f64::min),
                max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                avg,
                std_dev: variance.sqrt(),
                count,
            };
            (sensor_id, stats)
        })
        .collect()
}

/// Percentage of active motion events per sensor. Sensors without events are absent.
pub fn motion_activity_rates(rows: &[StoredReading]) -> BTreeMap<String, f64> {
    let mut counts: BTreeMap<String, (u64, u64)> = BTreeMap::new();
    for row in rows {
        if let Some(detected) = row.value.as_bool() {
            let (active, total) = counts.entry(row.sensor_id.clone()).or_default();
            *total += 1;
            if detected {
                *active += 1;
            }
        }
    }

    counts
        .into_iter()
        .filter(|(_, (_, total))| *total > 0)
        .map(|(sensor_id, (active, total))| (sensor_id, active as f64 / total as f64 * 100.0))
        .collect()
}

/// Hourly aggregate of one numeric sensor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericTrend {
    pub sensor_id: String,
    pub hour: DateTime<Utc>,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

/// Hourly aggregate of one motion sensor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotionTrend {
    pub sensor_id: String,
    pub hour: DateTime<Utc>,
    pub total_events: usize,
    pub activity_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SensorTrends {
    pub temperature: Vec<NumericTrend>,
    pub humidity: Vec<NumericTrend>,
    pub motion: Vec<MotionTrend>,
}

fn hour_of(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    let secs = timestamp.timestamp().div_euclid(3600) * 3600;
    DateTime::from_timestamp(secs, 0).unwrap_or(timestamp)
}

fn bucket_by_hour(rows: Vec<StoredReading>) -> BTreeMap<DateTime<Utc>, Vec<StoredReading>> {
    let mut buckets: BTreeMap<DateTime<Utc>, Vec<StoredReading>> = BTreeMap::new();
    for row in rows {
        buckets.entry(hour_of(row.timestamp)).or_default().push(row);
    }
    buckets
}

/// Computes windowed statistics from raw readings and appends them to the
/// analytics log.
///
/// Reads and writes are not isolated from concurrent inserts; a run sees
/// whatever rows were committed when its window query executed.
pub struct AnalyticsAggregator {
    readings: Arc<dyn ReadingRepository>,
    analytics: Arc<dyn AnalyticsRepository>,
}

impl AnalyticsAggregator {
    pub fn new(
        readings: Arc<dyn ReadingRepository>,
        analytics: Arc<dyn AnalyticsRepository>,
    ) -> Self {
        Self {
            readings,
            analytics,
        }
    }

    /// Aggregate the trailing `[now - window_minutes, now)` window.
    /// Returns the number of records written.
    pub async fn run(&self, window_minutes: u32) -> DomainResult<usize> {
        let end = Utc::now();
        let start = end - Duration::minutes(i64::from(window_minutes));
        self.run_window(start, end).await
    }

    /// Aggregate an explicit `[start, end)` window. A failed read aborts the
    /// run; a failed record write is logged and the run continues.
    #[instrument(skip(self))]
    pub async fn run_window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> DomainResult<usize> {
        let mut written = 0;

        for sensor_type in [SensorType::Temperature, SensorType::Humidity] {
            let rows = self.readings.query_window(sensor_type, start, end).await?;
            let prefix = sensor_type.metric_prefix();

            for (sensor_id, stats) in compute_window_stats(&rows) {
                let metrics = [
                    ("min", stats.min),
                    ("max", stats.max),
                    ("avg", stats.avg),
                    ("std", stats.std_dev),
                ];
                for (suffix, value) in metrics {
                    let metric_name = format!("{}_{}", prefix, suffix);
                    written += self.write(&sensor_id, metric_name, value, start, end).await;
                }
            }
        }

        let motion_rows = self
            .readings
            .query_window(SensorType::Motion, start, end)
            .await?;
        for (sensor_id, rate) in motion_activity_rates(&motion_rows) {
            written += self
                .write(&sensor_id, "motion_rate".to_string(), rate, start, end)
                .await;
        }

        info!(records = written, window_start = %start, window_end = %end, "analytics run complete");
        Ok(written)
    }

    async fn write(
        &self,
        sensor_id: &str,
        metric_name: String,
        value: f64,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> usize {
        let record = AnalyticsRecord {
            sensor_id: sensor_id.to_string(),
            metric_name,
            value,
            window_start,
            window_end,
        };
        match self.analytics.insert_record(&record).await {
            Ok(_) => 1,
            Err(e) => {
                error!(
                    sensor_id = %record.sensor_id,
                    metric = %record.metric_name,
                    error = %e,
                    "failed to store analytics record"
                );
                0
            }
        }
    }

    /// Hourly avg/min/max per numeric sensor and hourly activity per motion
    /// sensor over the last `hours` hours, ordered by hour then sensor.
    pub async fn sensor_trends(&self, hours: u32) -> DomainResult<SensorTrends> {
        let end = Utc::now();
        let start = end - Duration::hours(i64::from(hours));
        let mut trends = SensorTrends::default();

        for sensor_type in [SensorType::Temperature, SensorType::Humidity] {
            let rows = self.readings.query_window(sensor_type, start, end).await?;
            let mut series = Vec::new();
            for (hour, bucket) in bucket_by_hour(rows) {
                for (sensor_id, stats) in compute_window_stats(&bucket) {
                    series.push(NumericTrend {
                        sensor_id,
                        hour,
                        avg: stats.avg,
                        min: stats.min,
                        max: stats.max,
                    });
                }
            }
            match sensor_type {
                SensorType::Temperature => trends.temperature = series,
                _ => trends.humidity = series,
            }
        }

        let rows = self
            .readings
            .query_window(SensorType::Motion, start, end)
            .await?;
        for (hour, bucket) in bucket_by_hour(rows) {
            for (sensor_id, activity_rate) in motion_activity_rates(&bucket) {
                let total_events = bucket.iter().filter(|r| r.sensor_id == sensor_id).count();
                trends.motion.push(MotionTrend {
                    sensor_id,
                    hour,
                    total_events,
                    activity_rate,
                });
            }
        }

        Ok(trends)
    }

    /// Close the analytics writer, then the reader. Both are attempted; the
    /// first error is returned.
    pub async fn close(&self) -> DomainResult<()> {
        let analytics = self.analytics.close().await;
        let readings = self.readings.close().await;
        analytics.and(readings)
    }
}
