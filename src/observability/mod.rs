pub mod health;
pub mod instrument;
pub mod metrics;
pub mod route_label;
pub mod tracing;

pub use health::{LivenessStatus, ProcessClock};
pub use instrument::{track_requests, Instrumentation, ReportsStatus};
pub use metrics::{MetricSample, MetricsRegistry};
pub use route_label::normalize;
pub use self::tracing::init_tracing;
