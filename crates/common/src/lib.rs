pub mod domain;
pub mod in_memory;
pub mod postgres;
pub mod telemetry;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockAnalyticsRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockReadingRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockSensorRegistry;
