//! Readiness aggregation.
//!
//! # Data Flow
//! ```text
//! ServiceCheckConfig (static, validated once)
//!     → probe.rs (one timed, cancellable check → CheckResult)
//!     → aggregator.rs (fan out, join under the overall deadline)
//!     → report.rs (OpsStatusReport served to the dashboard)
//! ```
//!
//! Individual dependency failures are data in the report, never errors.

pub mod aggregator;
pub mod check;
pub mod probe;
pub mod report;

pub use aggregator::{OpsAggregator, SelfInfo};
pub use check::{check_fn, CheckContext, CheckError, CheckSuccess, HealthCheck, HttpCheck};
pub use probe::{CheckResult, ServiceCheckConfig};
pub use report::{DependencyStatus, OpsStatusReport, SelfStatus};
