use crate::domain::{PartitionMonth, SensorType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Value as it arrives from a source, before its kind has been checked
/// against the sensor type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

/// Reading as produced by a source. Fields a feed may omit are optional;
/// the validator decides whether the reading is usable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub sensor_id: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub value: Option<RawValue>,
    pub location: Option<String>,
    pub unit: Option<String>,
}

/// Typed value of a validated reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorValue {
    Numeric(f64),
    Detected(bool),
}

impl SensorValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SensorValue::Numeric(value) => Some(*value),
            SensorValue::Detected(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SensorValue::Detected(detected) => Some(*detected),
            SensorValue::Numeric(_) => None,
        }
    }
}

/// A reading that passed validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_id: String,
    pub sensor_type: SensorType,
    pub value: SensorValue,
    pub timestamp: DateTime<Utc>,
    pub location: Option<String>,
}

impl Reading {
    /// Monthly partition this reading lands in.
    pub fn partition(&self) -> PartitionMonth {
        PartitionMonth::from_timestamp(self.timestamp)
    }
}

/// Persisted reading with its assigned identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReading {
    pub id: i64,
    pub sensor_id: String,
    pub value: SensorValue,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
