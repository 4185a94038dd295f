mod sensor_store;

pub use sensor_store::*;
