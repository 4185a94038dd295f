mod analytics_aggregator;
mod channel_source;
mod health_report;
mod metrics_recorder;
mod pipeline;
mod reading_source;
mod reading_validator;
mod sliding_window;
mod storage_router;

pub use analytics_aggregator::*;
pub use channel_source::*;
pub use health_report::*;
pub use metrics_recorder::*;
pub use pipeline::*;
pub use reading_source::*;
pub use reading_validator::*;
pub use sliding_window::*;
pub use storage_router::*;
