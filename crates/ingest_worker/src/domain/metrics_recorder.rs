use crate::domain::{QualityMetrics, SlidingWindow};
use common::domain::SensorType;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct PerformanceWindow {
    processing_times: SlidingWindow<Duration>,
    error_counts: SlidingWindow<u64>,
    batch_sizes: SlidingWindow<u64>,
}

impl PerformanceWindow {
    fn new(capacity: usize) -> Self {
        Self {
            processing_times: SlidingWindow::new(capacity),
            error_counts: SlidingWindow::new(capacity),
            batch_sizes: SlidingWindow::new(capacity),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PerformanceSnapshot {
    /// Mean batch processing time over the window, in seconds.
    pub avg_processing_time: f64,
    /// Stored readings since start divided by elapsed wall-clock seconds.
    pub readings_per_second: f64,
    pub total_errors: u64,
    pub avg_batch_size: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityReport {
    pub total: u64,
    pub error_rate: f64,
    pub missing_rate: f64,
    pub out_of_range_rate: f64,
}

/// Batch-level performance counters over a sliding window plus the shared
/// data-quality counters.
///
/// All three windows are updated under one lock so they always hold the same
/// number of samples.
pub struct MetricsRecorder {
    window: Mutex<PerformanceWindow>,
    quality: Arc<QualityMetrics>,
    started_at: Instant,
    stored_total: AtomicU64,
}

impl MetricsRecorder {
    pub fn new(window_size: usize, quality: Arc<QualityMetrics>) -> Self {
        Self {
            window: Mutex::new(PerformanceWindow::new(window_size)),
            quality,
            started_at: Instant::now(),
            stored_total: AtomicU64::new(0),
        }
    }

    fn lock_window(&self) -> MutexGuard<'_, PerformanceWindow> {
        // a panicked writer cannot leave the windows mismatched, push is infallible
        self.window.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record_batch(&self, batch_size: usize, processing_time: Duration, error_count: usize) {
        let batch_size = batch_size as u64;
        let error_count = error_count as u64;

        {
            let mut window = self.lock_window();
            window.processing_times.push(processing_time);
            window.error_counts.push(error_count);
            window.batch_sizes.push(batch_size);
        }

        self.stored_total
            .fetch_add(batch_size.saturating_sub(error_count), Ordering::Relaxed);
    }

    /// Readings persisted since the recorder was created.
    pub fn total_stored(&self) -> u64 {
        self.stored_total.load(Ordering::Relaxed)
    }

    pub fn sample_count(&self) -> usize {
        self.lock_window().batch_sizes.len()
    }

    pub fn performance_snapshot(&self) -> PerformanceSnapshot {
        let window = self.lock_window();
        let samples = window.batch_sizes.len();
        if samples == 0 {
            return PerformanceSnapshot::default();
        }

        let total_time: f64 = window
            .processing_times
            .iter()
            .map(Duration::as_secs_f64)
            .sum();
        let total_batch: u64 = window.batch_sizes.iter().sum();
        let total_errors: u64 = window.error_counts.iter().sum();
        drop(window);

        let elapsed = self.started_at.elapsed().as_secs_f64();
        let readings_per_second = if elapsed > 0.0 {
            self.total_stored() as f64 / elapsed
        } else {
            0.0
        };

        PerformanceSnapshot {
            avg_processing_time: total_time / samples as f64,
            readings_per_second,
            total_errors,
            avg_batch_size: total_batch as f64 / samples as f64,
        }
    }

    /// Rates are percentages of accepted readings. Types with no accepted
    /// readings are left out.
    pub fn quality_report(&self) -> BTreeMap<SensorType, QualityReport> {
        SensorType::ALL
            .into_iter()
            .filter_map(|sensor_type| {
                let snapshot = self.quality.snapshot(sensor_type);
                if snapshot.total == 0 {
                    return None;
                }
                let total = snapshot.total as f64;
                let rate = |count: u64| count as f64 / total * 100.0;
                Some((
                    sensor_type,
                    QualityReport {
                        total: snapshot.total,
                        error_rate: rate(snapshot.invalid + snapshot.missing + snapshot.out_of_range),
                        missing_rate: rate(snapshot.missing),
                        out_of_range_rate: rate(snapshot.out_of_range),
                    },
                ))
            })
            .collect()
    }
}
