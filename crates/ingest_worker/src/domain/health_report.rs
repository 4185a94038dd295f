use crate::domain::{MetricsRecorder, PerformanceSnapshot, QualityReport};
use chrono::{DateTime, Utc};
use common::domain::{PartitionSize, ReadingRepository, SensorType};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Snapshot of pipeline health for an external observability sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub generated_at: DateTime<Utc>,
    pub total_stored: u64,
    pub performance: PerformanceSnapshot,
    pub quality: BTreeMap<SensorType, QualityReport>,
    pub partitions: Vec<PartitionSize>,
}

impl HealthReport {
    /// Gather metrics and partition sizes. A failed partition query is
    /// logged and reported as an empty list.
    pub async fn collect(recorder: &MetricsRecorder, storage: &dyn ReadingRepository) -> Self {
        let partitions = match storage.partition_sizes().await {
            Ok(partitions) => partitions,
            Err(e) => {
                warn!(error = %e, "could not read partition sizes");
                Vec::new()
            }
        };

        Self {
            generated_at: Utc::now(),
            total_stored: recorder.total_stored(),
            performance: recorder.performance_snapshot(),
            quality: recorder.quality_report(),
            partitions,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Emit the report as structured log events: one summary, one per sensor
    /// type, one per partition and the whole report as a JSON document.
    pub fn log(&self) {
        info!(
            total_stored = self.total_stored,
            readings_per_second = %format!("{:.2}", self.performance.readings_per_second),
            avg_processing_time_secs = %format!("{:.3}", self.performance.avg_processing_time),
            avg_batch_size = %format!("{:.1}", self.performance.avg_batch_size),
            total_errors = self.performance.total_errors,
            "pipeline health"
        );

        for (sensor_type, quality) in &self.quality {
            info!(
                sensor_type = %sensor_type,
                total_readings = quality.total,
                error_rate = %format!("{:.2}%", quality.error_rate),
                missing_rate = %format!("{:.2}%", quality.missing_rate),
                out_of_range_rate = %format!("{:.2}%", quality.out_of_range_rate),
                "data quality"
            );
        }

        for partition in &self.partitions {
            info!(
                table = %partition.table_name,
                partition = %partition.partition_name,
                size = %partition.size,
                rows = partition.row_count,
                "partition size"
            );
        }

        match self.to_json() {
            Ok(json) => info!(report = %json, "health report"),
            Err(e) => warn!(error = %e, "could not serialize health report"),
        }
    }
}
