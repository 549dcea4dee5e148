//! A single timed, cancellable dependency check.

use crate::ops::check::{CheckContext, CheckError, CheckSuccess, HealthCheck};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Error text for a probe that hit its deadline
pub const TIMEOUT_ERROR: &str = "timeout";

/// One configured dependency check
#[derive(Clone)]
pub struct ServiceCheckConfig {
    pub name: String,
    pub check: Arc<dyn HealthCheck>,
    pub timeout: Duration,
    /// Whether a failure of this check flips the readiness flag
    pub required: bool,
}

impl ServiceCheckConfig {
    pub fn new(name: impl Into<String>, check: Arc<dyn HealthCheck>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            check,
            timeout,
            required: true,
        }
    }

    /// Failures of this check degrade the report without flipping readiness
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

impl fmt::Debug for ServiceCheckConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCheckConfig")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

/// Outcome of one probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub name: String,
    pub ok: bool,
    pub status_or_code: Option<i64>,
    pub latency_ms: Option<f64>,
    pub error: Option<String>,
}

impl CheckResult {
    fn succeeded(name: &str, success: CheckSuccess, latency_ms: f64) -> Self {
        Self {
            name: name.to_string(),
            ok: true,
            status_or_code: success.code,
            latency_ms: Some(latency_ms),
            error: None,
        }
    }

    fn failed(name: &str, error: String, status_or_code: Option<i64>, latency_ms: f64) -> Self {
        Self {
            name: name.to_string(),
            ok: false,
            status_or_code,
            latency_ms: Some(latency_ms),
            error: Some(error),
        }
    }

    fn timed_out(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ok: false,
            status_or_code: None,
            latency_ms: None,
            error: Some(TIMEOUT_ERROR.to_string()),
        }
    }

    pub fn is_timeout(&self) -> bool {
        !self.ok && self.error.as_deref() == Some(TIMEOUT_ERROR)
    }
}

/// Run a check under its own timeout
pub async fn run(config: &ServiceCheckConfig) -> CheckResult {
    run_until(config, None).await
}

/// Run a check under the tighter of its own timeout and `outer_deadline`.
///
/// Never fails: errors, panics and timeouts all come back as a
/// [`CheckResult`] with `ok == false`.
pub async fn run_until(config: &ServiceCheckConfig, outer_deadline: Option<Instant>) -> CheckResult {
    let started = Instant::now();
    let deadline = effective_deadline(started, config.timeout, outer_deadline);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let ctx = CheckContext::new(deadline, cancel_rx);
    let check = config.check.clone();
    // Own task so a panicking check cannot take the caller down with it
    let mut task = tokio::spawn(async move { check.check(ctx).await });

    let outcome = tokio::time::timeout_at(deadline, &mut task).await;
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

    match outcome {
        Ok(Ok(Ok(success))) => {
            tracing::debug!(check = %config.name, latency_ms, "Dependency check passed");
            CheckResult::succeeded(&config.name, success, latency_ms)
        }
        Ok(Ok(Err(e))) => {
            tracing::warn!(check = %config.name, error = %e, latency_ms, "Dependency check failed");
            let status_or_code = e.status_code();
            CheckResult::failed(&config.name, describe(&e), status_or_code, latency_ms)
        }
        Ok(Err(join_error)) => {
            let reason = if join_error.is_panic() {
                "check panicked"
            } else {
                "check cancelled"
            };
            tracing::error!(check = %config.name, error = %join_error, "Dependency check aborted");
            CheckResult::failed(&config.name, reason.to_string(), None, latency_ms)
        }
        Err(_) => {
            let _ = cancel_tx.send(true);
            task.abort();
            tracing::warn!(
                check = %config.name,
                budget_ms = deadline.saturating_duration_since(started).as_millis() as u64,
                timeout_ms = config.timeout.as_millis() as u64,
                "Dependency check timed out"
            );
            CheckResult::timed_out(&config.name)
        }
    }
}

/// The tighter of the check's own timeout and the caller's deadline
fn effective_deadline(started: Instant, timeout: Duration, outer_deadline: Option<Instant>) -> Instant {
    let own_deadline = started + timeout;
    match outer_deadline {
        Some(outer) => own_deadline.min(outer),
        None => own_deadline,
    }
}

fn describe(error: &CheckError) -> String {
    let text = error.to_string();
    if text.is_empty() {
        "check failed".to_string()
    } else {
        text
    }
}
