use common::domain::{RawReading, RawValue, Reading, SensorType, SensorValue};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Closed interval `[min, max]` of acceptable values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Acceptable values per numeric sensor type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValidRanges {
    pub temperature: ValueRange,
    pub humidity: ValueRange,
}

impl ValidRanges {
    /// Motion readings are boolean and carry no range.
    pub fn range_for(&self, sensor_type: SensorType) -> Option<ValueRange> {
        match sensor_type {
            SensorType::Temperature => Some(self.temperature),
            SensorType::Humidity => Some(self.humidity),
            SensorType::Motion => None,
        }
    }
}

impl Default for ValidRanges {
    fn default() -> Self {
        Self {
            temperature: ValueRange::new(15.0, 30.0),
            humidity: ValueRange::new(30.0, 70.0),
        }
    }
}

/// Why a reading was turned away.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RejectionReason {
    InvalidSensorType,
    MissingRequiredFields,
    InvalidValueType,
    OutOfRange(ValueRange),
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::InvalidSensorType => f.write_str("Invalid sensor type"),
            RejectionReason::MissingRequiredFields => f.write_str("Missing required fields"),
            RejectionReason::InvalidValueType => f.write_str("Invalid value type"),
            RejectionReason::OutOfRange(range) => {
                write!(f, "Value out of range [{:?}, {:?}]", range.min, range.max)
            }
        }
    }
}

pub type ValidationOutcome = Result<Reading, RejectionReason>;

#[derive(Debug, Default)]
struct TypeCounters {
    total: AtomicU64,
    invalid: AtomicU64,
    missing: AtomicU64,
    out_of_range: AtomicU64,
}

/// Point-in-time copy of one sensor type's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QualitySnapshot {
    pub total: u64,
    pub invalid: u64,
    pub missing: u64,
    pub out_of_range: u64,
}

/// Cumulative validation outcome counters, one bucket per sensor type.
/// Counters only ever grow for the lifetime of the instance.
#[derive(Debug, Default)]
pub struct QualityMetrics {
    temperature: TypeCounters,
    humidity: TypeCounters,
    motion: TypeCounters,
}

impl QualityMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, sensor_type: SensorType) -> &TypeCounters {
        match sensor_type {
            SensorType::Temperature => &self.temperature,
            SensorType::Humidity => &self.humidity,
            SensorType::Motion => &self.motion,
        }
    }

    pub fn snapshot(&self, sensor_type: SensorType) -> QualitySnapshot {
        let counters = self.counters(sensor_type);
        QualitySnapshot {
            total: counters.total.load(Ordering::Relaxed),
            invalid: counters.invalid.load(Ordering::Relaxed),
            missing: counters.missing.load(Ordering::Relaxed),
            out_of_range: counters.out_of_range.load(Ordering::Relaxed),
        }
    }
}

/// Applies per-type semantic rules to raw readings.
///
/// Checks run in a fixed order and the first failing check decides both the
/// rejection reason and which counter is charged:
/// 1. sensor type from the id (unknown type charges nothing)
/// 2. timestamp and value present
/// 3. value kind matches the type
/// 4. numeric value inside the type's range
pub struct ReadingValidator {
    ranges: ValidRanges,
    metrics: Arc<QualityMetrics>,
}

impl ReadingValidator {
    pub fn new(ranges: ValidRanges, metrics: Arc<QualityMetrics>) -> Self {
        Self { ranges, metrics }
    }

    pub fn quality_metrics(&self) -> Arc<QualityMetrics> {
        self.metrics.clone()
    }

    pub fn validate(&self, raw: &RawReading) -> ValidationOutcome {
        let Some(sensor_type) = SensorType::from_sensor_id(&raw.sensor_id) else {
            return Err(RejectionReason::InvalidSensorType);
        };
        let counters = self.metrics.counters(sensor_type);

        let (Some(timestamp), Some(raw_value)) = (raw.timestamp, raw.value.as_ref()) else {
            counters.missing.fetch_add(1, Ordering::Relaxed);
            return Err(RejectionReason::MissingRequiredFields);
        };

        let value = match (sensor_type.is_numeric(), raw_value) {
            (true, RawValue::Number(v)) => SensorValue::Numeric(*v),
            (false, RawValue::Bool(b)) => SensorValue::Detected(*b),
            _ => {
                counters.invalid.fetch_add(1, Ordering::Relaxed);
                return Err(RejectionReason::InvalidValueType);
            }
        };

        if let (Some(range), Some(v)) = (self.ranges.range_for(sensor_type), value.as_f64()) {
            if !range.contains(v) {
                counters.out_of_range.fetch_add(1, Ordering::Relaxed);
                return Err(RejectionReason::OutOfRange(range));
            }
        }

        counters.total.fetch_add(1, Ordering::Relaxed);
        debug!(sensor_id = %raw.sensor_id, sensor_type = %sensor_type, "reading accepted");

        Ok(Reading {
            sensor_id: raw.sensor_id.clone(),
            sensor_type,
            value,
            timestamp,
            location: raw.location.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn validator() -> ReadingValidator {
        ReadingValidator::new(ValidRanges::default(), Arc::new(QualityMetrics::new()))
    }

    fn raw(sensor_id: &str, value: Option<RawValue>) -> RawReading {
        RawReading {
            sensor_id: sensor_id.to_string(),
            timestamp: Some(Utc::now()),
            value,
            location: Some("x".to_string()),
            unit: None,
        }
    }

    fn all_snapshots(metrics: &QualityMetrics) -> Vec<QualitySnapshot> {
        SensorType::ALL.iter().map(|t| metrics.snapshot(*t)).collect()
    }

    #[test]
    fn test_unknown_sensor_type_leaves_metrics_unchanged() {
        let validator = validator();
        let metrics = validator.quality_metrics();
        let before = all_snapshots(&metrics);

        for id in ["pressure_sensor_1", "", "TEMP_SENSOR_1", "sensor_temp"] {
            let outcome = validator.validate(&raw(id, Some(RawValue::Number(20.0))));
            assert_eq!(outcome, Err(RejectionReason::InvalidSensorType));
            assert_eq!(outcome.unwrap_err().to_string(), "Invalid sensor type");
        }

        assert_eq!(all_snapshots(&metrics), before);
    }

    #[test]
    fn test_accepted_temperature_counts_only_total() {
        let validator = validator();
        let reading = validator
            .validate(&raw("temp_sensor_1", Some(RawValue::Number(23.5))))
            .unwrap();

        assert_eq!(reading.sensor_type, SensorType::Temperature);
        assert_eq!(reading.value, SensorValue::Numeric(23.5));
        assert_eq!(reading.location.as_deref(), Some("x"));

        let metrics = validator.quality_metrics();
        assert_eq!(
            metrics.snapshot(SensorType::Temperature),
            QualitySnapshot {
                total: 1,
                ..Default::default()
            }
        );
        assert_eq!(metrics.snapshot(SensorType::Humidity), QualitySnapshot::default());
        assert_eq!(metrics.snapshot(SensorType::Motion), QualitySnapshot::default());
    }

    #[test]
    fn test_range_boundaries_are_inclusive() {
        let validator = validator();
        for v in [15.0, 30.0] {
            assert!(
                validator
                    .validate(&raw("temp_sensor_1", Some(RawValue::Number(v))))
                    .is_ok()
            );
        }
        for v in [14.99, 30.01] {
            let outcome = validator.validate(&raw("temp_sensor_1", Some(RawValue::Number(v))));
            assert_eq!(
                outcome.unwrap_err().to_string(),
                "Value out of range [15.0, 30.0]"
            );
        }

        let snapshot = validator.quality_metrics().snapshot(SensorType::Temperature);
        assert_eq!(snapshot.total, 2);
        assert_eq!(snapshot.out_of_range, 2);
    }

    #[test]
    fn test_missing_fields_charge_missing_bucket() {
        let validator = validator();

        let mut no_timestamp = raw("humidity_sensor_2", Some(RawValue::Number(40.0)));
        no_timestamp.timestamp = None;
        assert_eq!(
            validator.validate(&no_timestamp),
            Err(RejectionReason::MissingRequiredFields)
        );
        assert_eq!(
            validator.validate(&raw("humidity_sensor_2", None)),
            Err(RejectionReason::MissingRequiredFields)
        );

        let snapshot = validator.quality_metrics().snapshot(SensorType::Humidity);
        assert_eq!(snapshot.missing, 2);
        assert_eq!(snapshot.total, 0);
    }

    #[test]
    fn test_first_failing_check_wins() {
        let validator = validator();

        // missing timestamp and wrong kind: only the missing bucket is charged
        let mut reading = raw("motion_sensor_1", Some(RawValue::Number(3.0)));
        reading.timestamp = None;
        assert_eq!(
            validator.validate(&reading),
            Err(RejectionReason::MissingRequiredFields)
        );

        let snapshot = validator.quality_metrics().snapshot(SensorType::Motion);
        assert_eq!(snapshot.missing, 1);
        assert_eq!(snapshot.invalid, 0);
    }

    #[test]
    fn test_value_kind_mismatch() {
        let validator = validator();
        let cases = [
            ("temp_sensor_1", RawValue::Bool(true)),
            ("temp_sensor_1", RawValue::Text("21.0".to_string())),
            ("motion_sensor_1", RawValue::Number(1.0)),
        ];
        for (id, value) in cases {
            assert_eq!(
                validator.validate(&raw(id, Some(value))),
                Err(RejectionReason::InvalidValueType)
            );
        }

        let metrics = validator.quality_metrics();
        assert_eq!(metrics.snapshot(SensorType::Temperature).invalid, 2);
        assert_eq!(metrics.snapshot(SensorType::Motion).invalid, 1);
    }

    #[test]
    fn test_motion_has_no_range_check() {
        let validator = validator();
        for detected in [true, false] {
            let reading = validator
                .validate(&raw("motion_sensor_4", Some(RawValue::Bool(detected))))
                .unwrap();
            assert_eq!(reading.value, SensorValue::Detected(detected));
        }
        assert!(ValidRanges::default().range_for(SensorType::Motion).is_none());
    }

    #[test]
    fn test_custom_ranges_show_in_reason() {
        let ranges = ValidRanges {
            temperature: ValueRange::new(15.0, 30.0),
            humidity: ValueRange::new(35.5, 60.0),
        };
        let validator = ReadingValidator::new(ranges, Arc::new(QualityMetrics::new()));
        let outcome = validator.validate(&raw("humidity_sensor_1", Some(RawValue::Number(61.0))));
        assert_eq!(
            outcome.unwrap_err().to_string(),
            "Value out of range [35.5, 60.0]"
        );
    }
}
