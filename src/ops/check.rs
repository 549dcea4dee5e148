use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Successful outcome of a dependency check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CheckSuccess {
    /// Status or result code reported by the dependency, if it has one
    pub code: Option<i64>,
}

impl CheckSuccess {
    pub fn ok() -> Self {
        Self { code: None }
    }

    pub fn with_code(code: impl Into<i64>) -> Self {
        Self {
            code: Some(code.into()),
        }
    }
}

/// Why a dependency check failed
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("HTTP {0}")]
    UnhealthyStatus(u16),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl CheckError {
    /// Status code carried by the failure, if any
    pub fn status_code(&self) -> Option<i64> {
        match self {
            CheckError::UnhealthyStatus(status) => Some(i64::from(*status)),
            CheckError::Http(e) => e.status().map(|s| i64::from(s.as_u16())),
            _ => None,
        }
    }
}

/// Deadline and cancellation signal handed to each check invocation.
///
/// The probe stops waiting at the deadline regardless of what the check
/// does; checks that start detached work should watch [`cancelled`](Self::cancelled).
#[derive(Debug, Clone)]
pub struct CheckContext {
    deadline: Instant,
    cancelled: watch::Receiver<bool>,
}

impl CheckContext {
    pub(crate) fn new(deadline: Instant, cancelled: watch::Receiver<bool>) -> Self {
        Self {
            deadline,
            cancelled,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the probe gives up
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Whether the probe has stopped waiting for this check.
    ///
    /// True after a timeout, and also once the probe has returned for any
    /// other reason (including a successful check), since nobody is left to
    /// read the result of work started from this context.
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow() || self.cancelled.has_changed().is_err()
    }

    /// Resolves once [`is_cancelled`](Self::is_cancelled) would return true
    pub async fn cancelled(&mut self) {
        // Err means the probe dropped its sender
        let _ = self.cancelled.wait_for(|cancelled| *cancelled).await;
    }
}

/// One dependency health check, supplied by the embedding application
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self, ctx: CheckContext) -> std::result::Result<CheckSuccess, CheckError>;
}

/// Adapts an async closure into a [`HealthCheck`]
pub struct FnCheck<F>(F);

#[async_trait]
impl<F, Fut> HealthCheck for FnCheck<F>
where
    F: Fn(CheckContext) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<CheckSuccess, CheckError>> + Send + 'static,
{
    async fn check(&self, ctx: CheckContext) -> std::result::Result<CheckSuccess, CheckError> {
        (self.0)(ctx).await
    }
}

pub fn check_fn<F, Fut>(f: F) -> FnCheck<F>
where
    F: Fn(CheckContext) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<CheckSuccess, CheckError>> + Send + 'static,
{
    FnCheck(f)
}

/// GET a peer service's liveness endpoint; any 2xx is healthy
pub struct HttpCheck {
    client: reqwest::Client,
    url: reqwest::Url,
}

impl HttpCheck {
    pub fn new(client: reqwest::Client, url: &str) -> Result<Self> {
        let url = reqwest::Url::parse(url)
            .map_err(|e| AppError::InvalidCheckConfig(format!("invalid check URL '{}': {}", url, e)))?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &reqwest::Url {
        &self.url
    }
}

#[async_trait]
impl HealthCheck for HttpCheck {
    async fn check(&self, ctx: CheckContext) -> std::result::Result<CheckSuccess, CheckError> {
        let response = self
            .client
            .get(self.url.clone())
            .header("user-agent", "fleet-ops-probe")
            .timeout(ctx.remaining())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(CheckSuccess::with_code(status.as_u16()))
        } else {
            Err(CheckError::UnhealthyStatus(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_text_is_verbatim() {
        let err = CheckError::Failed("connection refused".to_string());
        assert_eq!(err.to_string(), "connection refused");
        assert_eq!(err.status_code(), None);
        assert_eq!(CheckError::UnhealthyStatus(503).to_string(), "HTTP 503");
        assert_eq!(CheckError::UnhealthyStatus(503).status_code(), Some(503));
    }

    #[test]
    fn test_http_check_rejects_bad_url() {
        assert!(HttpCheck::new(reqwest::Client::new(), "not a url").is_err());
        let check = HttpCheck::new(reqwest::Client::new(), "http://chat.internal/health/live").unwrap();
        assert_eq!(check.url().path(), "/health/live");
    }

    #[tokio::test]
    async fn test_context_cancellation() {
        let (tx, rx) = watch::channel(false);
        let mut ctx = CheckContext::new(Instant::now() + Duration::from_secs(1), rx);
        assert!(!ctx.is_cancelled());
        assert!(ctx.remaining() <= Duration::from_secs(1));

        tx.send(true).unwrap();
        ctx.cancelled().await;
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_finished_probe_counts_as_cancelled() {
        let (tx, rx) = watch::channel(false);
        let mut ctx = CheckContext::new(Instant::now() + Duration::from_secs(1), rx);
        assert!(!ctx.is_cancelled());

        drop(tx);
        assert!(ctx.is_cancelled());
        ctx.cancelled().await;
    }

    #[tokio::test]
    async fn test_fn_check_runs_closure() {
        let check = check_fn(|_ctx| async { Ok::<_, CheckError>(CheckSuccess::with_code(7)) });
        let (_tx, rx) = watch::channel(false);
        let ctx = CheckContext::new(Instant::now() + Duration::from_secs(1), rx);
        let success = tokio_test::assert_ok!(check.check(ctx).await);
        assert_eq!(success, CheckSuccess::with_code(7));
    }

    #[tokio::test]
    async fn test_http_check_unreachable_peer_fails() {
        // Port 9 (discard) on localhost is closed in test environments
        let check = HttpCheck::new(reqwest::Client::new(), "http://127.0.0.1:9/health/live").unwrap();
        let (_tx, rx) = watch::channel(false);
        let ctx = CheckContext::new(Instant::now() + Duration::from_secs(2), rx);
        tokio_test::assert_err!(check.check(ctx).await);
    }
}
