mod analytics_repository;
mod client;
mod config;
mod errors;
mod reading_repository;
mod schema;
mod sensor_registry;

pub use analytics_repository::*;
pub use client::*;
pub use config::*;
pub use errors::*;
pub use reading_repository::*;
pub use schema::*;
pub use sensor_registry::*;
