//! Concurrent readiness aggregation.
//!
//! ```text
//! run(overall_deadline)
//!     → probe each configured service   ┐
//!     → probe the primary dependency    ├ concurrently
//!     → read self facts                 ┘
//!     → join (bounded by the overall deadline)
//!     → OpsStatusReport, services in configuration order
//! ```

use crate::errors::{AppError, Result};
use crate::observability::health::ProcessClock;
use crate::ops::probe::{self, CheckResult, ServiceCheckConfig};
use crate::ops::report::{DependencyStatus, OpsStatusReport, SelfStatus};
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

/// Static identity of the answering process
#[derive(Debug, Clone)]
pub struct SelfInfo {
    pub host_label: String,
    pub build_identifier: Option<String>,
    pub clock: ProcessClock,
}

impl SelfInfo {
    fn snapshot(&self) -> SelfStatus {
        SelfStatus {
            ok: true,
            uptime_seconds: self.clock.uptime().as_secs(),
            process_id: std::process::id(),
            host_label: self.host_label.clone(),
            timestamp: Utc::now(),
            build_identifier: self.build_identifier.clone(),
        }
    }
}

/// Probes the primary dependency and every configured service.
///
/// Holds only immutable configuration, so concurrent `run` calls are
/// independent of each other.
pub struct OpsAggregator {
    dependency: ServiceCheckConfig,
    services: Vec<ServiceCheckConfig>,
    self_info: SelfInfo,
}

impl OpsAggregator {
    /// Build an aggregator, rejecting malformed check configuration
    pub fn new(
        dependency: ServiceCheckConfig,
        services: Vec<ServiceCheckConfig>,
        self_info: SelfInfo,
    ) -> Result<Self> {
        let mut names = HashSet::new();
        for config in std::iter::once(&dependency).chain(services.iter()) {
            if config.name.trim().is_empty() {
                return Err(AppError::InvalidCheckConfig(
                    "check name must not be empty".to_string(),
                ));
            }
            if config.timeout.is_zero() {
                return Err(AppError::InvalidCheckConfig(format!(
                    "check '{}' must have a positive timeout",
                    config.name
                )));
            }
            if !names.insert(config.name.as_str()) {
                return Err(AppError::InvalidCheckConfig(format!(
                    "duplicate check name '{}'",
                    config.name
                )));
            }
        }

        tracing::info!(
            dependency = %dependency.name,
            services = services.len(),
            "Ops aggregator configured"
        );

        Ok(Self {
            dependency,
            services,
            self_info,
        })
    }

    pub fn services(&self) -> &[ServiceCheckConfig] {
        &self.services
    }

    /// Probe everything and assemble a report. Never fails.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self, overall_deadline: Duration) -> OpsStatusReport {
        let started = Instant::now();
        let deadline = started + overall_deadline;

        let service_probes = join_all(
            self.services
                .iter()
                .map(|config| probe::run_until(config, Some(deadline))),
        );
        let dependency_probe = probe::run_until(&self.dependency, Some(deadline));
        let self_facts = async { self.self_info.snapshot() };

        let (services, dependency, self_status) =
            tokio::join!(service_probes, dependency_probe, self_facts);

        let ok = dependency.ok && self.required_services_ok(&services);
        let degraded = services.iter().any(|result| !result.ok);

        tracing::info!(
            ok,
            degraded,
            dependency_ok = dependency.ok,
            failing = services.iter().filter(|result| !result.ok).count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Ops status collected"
        );

        OpsStatusReport {
            ok,
            degraded,
            self_status,
            dependency: DependencyStatus::from(dependency),
            services,
        }
    }

    fn required_services_ok(&self, results: &[CheckResult]) -> bool {
        self.services
            .iter()
            .zip(results)
            .all(|(config, result)| result.ok || !config.required)
    }
}
