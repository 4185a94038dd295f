use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Derived metric row. Written once per aggregation run and never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsRecord {
    pub sensor_id: String,
    pub metric_name: String,
    pub value: f64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}
