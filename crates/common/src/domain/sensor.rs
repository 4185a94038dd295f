use crate::domain::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of environmental sensor. Attached to a reading once, at the
/// boundary where its raw sensor id is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorType {
    Temperature,
    Humidity,
    Motion,
}

impl SensorType {
    pub const ALL: [SensorType; 3] = [
        SensorType::Temperature,
        SensorType::Humidity,
        SensorType::Motion,
    ];

    /// Classify a raw sensor id by the category marker it carries
    /// (`temp_sensor`, `humidity_sensor`, `motion_sensor`).
    pub fn from_sensor_id(sensor_id: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|sensor_type| sensor_id.contains(sensor_type.id_marker()))
    }

    pub fn id_marker(&self) -> &'static str {
        match self {
            SensorType::Temperature => "temp_sensor",
            SensorType::Humidity => "humidity_sensor",
            SensorType::Motion => "motion_sensor",
        }
    }

    /// Builds the canonical id of the `index`-th sensor of this type.
    pub fn sensor_id(&self, index: usize) -> String {
        format!("{}_{}", self.id_marker(), index)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorType::Temperature => "temperature",
            SensorType::Humidity => "humidity",
            SensorType::Motion => "motion",
        }
    }

    /// Relation holding raw rows for this sensor type.
    pub fn table_name(&self) -> &'static str {
        match self {
            SensorType::Temperature => "temperature_readings",
            SensorType::Humidity => "humidity_readings",
            SensorType::Motion => "motion_events",
        }
    }

    /// Prefix of derived analytics metric names (`temp_avg`, `humidity_std`, ...).
    pub fn metric_prefix(&self) -> &'static str {
        match self {
            SensorType::Temperature => "temp",
            SensorType::Humidity => "humidity",
            SensorType::Motion => "motion",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            SensorType::Temperature => "celsius",
            SensorType::Humidity => "percent",
            SensorType::Motion => "boolean",
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, SensorType::Motion)
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "temperature" => Ok(SensorType::Temperature),
            "humidity" => Ok(SensorType::Humidity),
            "motion" => Ok(SensorType::Motion),
            other => Err(DomainError::UnknownSensorType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorStatus {
    Active,
    Inactive,
}

impl SensorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorStatus::Active => "active",
            SensorStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for SensorStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SensorStatus::Active),
            "inactive" => Ok(SensorStatus::Inactive),
            other => Err(DomainError::RepositoryError(anyhow::anyhow!(
                "unknown sensor status: {}",
                other
            ))),
        }
    }
}

/// Sensor registry entry, created at setup time and only read by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRegistration {
    pub sensor_id: String,
    pub sensor_type: SensorType,
    pub location: String,
    pub status: SensorStatus,
}

impl SensorRegistration {
    pub fn active(
        sensor_id: impl Into<String>,
        sensor_type: SensorType,
        location: impl Into<String>,
    ) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            sensor_type,
            location: location.into(),
            status: SensorStatus::Active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_sensor_ids() {
        assert_eq!(
            SensorType::from_sensor_id("temp_sensor_1"),
            Some(SensorType::Temperature)
        );
        assert_eq!(
            SensorType::from_sensor_id("humidity_sensor_12"),
            Some(SensorType::Humidity)
        );
        assert_eq!(
            SensorType::from_sensor_id("motion_sensor_3"),
            Some(SensorType::Motion)
        );
        assert_eq!(SensorType::from_sensor_id("pressure_sensor_1"), None);
        assert_eq!(SensorType::from_sensor_id(""), None);
    }

    #[test]
    fn test_sensor_id_round_trips_through_classification() {
        for sensor_type in SensorType::ALL {
            let id = sensor_type.sensor_id(7);
            assert_eq!(SensorType::from_sensor_id(&id), Some(sensor_type));
        }
    }

    #[test]
    fn test_table_and_metric_names() {
        assert_eq!(SensorType::Temperature.table_name(), "temperature_readings");
        assert_eq!(SensorType::Humidity.table_name(), "humidity_readings");
        assert_eq!(SensorType::Motion.table_name(), "motion_events");
        assert_eq!(SensorType::Temperature.metric_prefix(), "temp");
        assert_eq!(SensorType::Humidity.metric_prefix(), "humidity");
    }

    #[test]
    fn test_parse_sensor_type() {
        assert_eq!("motion".parse::<SensorType>().unwrap(), SensorType::Motion);
        assert!(matches!(
            "pressure".parse::<SensorType>(),
            Err(DomainError::UnknownSensorType(_))
        ));
    }
}
