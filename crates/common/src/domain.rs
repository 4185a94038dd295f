mod analytics;
mod partition;
mod reading;
mod repository;
mod result;
mod sensor;

pub use analytics::*;
pub use partition::*;
pub use reading::*;
pub use repository::*;
pub use result::*;
pub use sensor::*;
