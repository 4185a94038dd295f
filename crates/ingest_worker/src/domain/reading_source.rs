use async_trait::async_trait;
use chrono::Utc;
use common::domain::{DomainResult, RawReading, RawValue, SensorRegistration, SensorType};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

const TEMPERATURE_START: f64 = 20.0;
const HUMIDITY_START: f64 = 50.0;

/// Producer of raw reading batches, polled once per pipeline iteration.
///
/// An error returned here is treated as source corruption and stops the
/// pipeline.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReadingSource: Send {
    async fn next_batch(&mut self) -> DomainResult<Vec<RawReading>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    /// Sensors per type.
    pub num_sensors: usize,
    /// Readings per batch. `None` sweeps every sensor once.
    pub batch_size: Option<usize>,
    /// Fixed seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            num_sensors: 5,
            batch_size: None,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SensorState {
    Level(f64),
    Active(bool),
}

#[derive(Debug, Clone)]
struct SimulatedSensor {
    sensor_id: String,
    sensor_type: SensorType,
    location: String,
    state: SensorState,
}

/// Synthetic source: one bounded random walk per numeric sensor and a
/// two-state Markov chain per motion sensor.
pub struct SensorSimulator {
    sensors: Vec<SimulatedSensor>,
    batch_size: Option<usize>,
    rng: StdRng,
}

impl SensorSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut sensors = Vec::with_capacity(config.num_sensors * SensorType::ALL.len());
        for sensor_type in SensorType::ALL {
            let state = match sensor_type {
                SensorType::Temperature => SensorState::Level(TEMPERATURE_START),
                SensorType::Humidity => SensorState::Level(HUMIDITY_START),
                SensorType::Motion => SensorState::Active(false),
            };
            for index in 1..=config.num_sensors {
                sensors.push(SimulatedSensor {
                    sensor_id: sensor_type.sensor_id(index),
                    sensor_type,
                    location: format!("room_{}", index),
                    state,
                });
            }
        }

        info!(sensors = sensors.len(), "sensor simulator initialized");

        Self {
            sensors,
            batch_size: config.batch_size,
            rng,
        }
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    /// Registry entries for every simulated sensor.
    pub fn registrations(&self) -> Vec<SensorRegistration> {
        self.sensors
            .iter()
            .map(|s| SensorRegistration::active(s.sensor_id.clone(), s.sensor_type, s.location.clone()))
            .collect()
    }

    /// One reading per sensor when `batch_size` is `None`, otherwise a random
    /// sample of distinct sensors.
    pub fn generate_batch(&mut self, batch_size: Option<usize>) -> Vec<RawReading> {
        let indices: Vec<usize> = match batch_size {
            None => (0..self.sensors.len()).collect(),
            Some(size) => {
                let amount = size.min(self.sensors.len());
                rand::seq::index::sample(&mut self.rng, self.sensors.len(), amount).into_vec()
            }
        };

        indices
            .into_iter()
            .map(|index| self.generate_reading(index))
            .collect()
    }

    fn generate_reading(&mut self, index: usize) -> RawReading {
        let rng = &mut self.rng;
        let sensor = &mut self.sensors[index];

        let value = match sensor.state {
            SensorState::Level(last) => {
                let (step, lo, hi) = match sensor.sensor_type {
                    SensorType::Humidity => (2.0, 30.0, 70.0),
                    _ => (0.5, 15.0, 30.0),
                };
                let next = (last + rng.gen_range(-step..=step)).clamp(lo, hi);
                // the walk keeps full precision, only the emitted value is rounded
                sensor.state = SensorState::Level(next);
                RawValue::Number(round2(next))
            }
            SensorState::Active(was_active) => {
                let active = if was_active {
                    rng.gen_bool(0.7)
                } else {
                    rng.gen_bool(0.1)
                };
                sensor.state = SensorState::Active(active);
                RawValue::Bool(active)
            }
        };

        RawReading {
            sensor_id: sensor.sensor_id.clone(),
            timestamp: Some(Utc::now()),
            value: Some(value),
            location: Some(sensor.location.clone()),
            unit: Some(sensor.sensor_type.unit().to_string()),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[async_trait]
impl ReadingSource for SensorSimulator {
    async fn next_batch(&mut self) -> DomainResult<Vec<RawReading>> {
        Ok(self.generate_batch(self.batch_size))
    }
}
