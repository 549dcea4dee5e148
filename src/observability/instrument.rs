//! Request instrumentation.
//!
//! Two entry points feed the [`MetricsRegistry`]:
//! - [`Instrumentation::wrap`] decorates a single handler
//! - [`track_requests`] plugs into an axum middleware chain
//!
//! Both record exactly one sample per invocation, whether the handler
//! returns, fails, panics, or is dropped by its caller before settling.

use crate::observability::metrics::{MetricSample, MetricsRegistry};
use crate::observability::route_label::normalize;
use axum::{
    extract::{MatchedPath, Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
    Json,
};
use futures::future::{BoxFuture, FutureExt};
use std::convert::Infallible;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::Instant;

/// Status recorded when the caller stops waiting before the handler settles
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

const DEFAULT_SUCCESS_STATUS: u16 = 200;
const FAILURE_STATUS: u16 = 500;

/// A handler result that may carry an HTTP status code
pub trait ReportsStatus {
    fn status_code(&self) -> Option<u16>;
}

impl<B> ReportsStatus for axum::http::Response<B> {
    fn status_code(&self) -> Option<u16> {
        Some(self.status().as_u16())
    }
}

impl ReportsStatus for StatusCode {
    fn status_code(&self) -> Option<u16> {
        Some(self.as_u16())
    }
}

impl<T> ReportsStatus for (StatusCode, T) {
    fn status_code(&self) -> Option<u16> {
        Some(self.0.as_u16())
    }
}

impl<T> ReportsStatus for Json<T> {
    fn status_code(&self) -> Option<u16> {
        None
    }
}

impl ReportsStatus for String {
    fn status_code(&self) -> Option<u16> {
        None
    }
}

impl ReportsStatus for &'static str {
    fn status_code(&self) -> Option<u16> {
        None
    }
}

impl ReportsStatus for () {
    fn status_code(&self) -> Option<u16> {
        None
    }
}

/// Handle to the metrics registry bound to one deployed service name
#[derive(Clone)]
pub struct Instrumentation {
    registry: Arc<MetricsRegistry>,
    service: Arc<str>,
}

impl Instrumentation {
    pub fn new(registry: Arc<MetricsRegistry>, service: impl Into<Arc<str>>) -> Self {
        Self {
            registry,
            service: service.into(),
        }
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Decorate a handler so every invocation is measured.
    ///
    /// The returned handler passes the request through untouched and hands
    /// back the inner handler's `Ok` or `Err` value unchanged. The route
    /// label is `route_override` when given, otherwise the normalized path.
    pub fn wrap<H, Fut, R, E>(
        &self,
        handler: H,
        route_override: Option<&str>,
    ) -> impl Fn(Request) -> BoxFuture<'static, Result<R, E>> + Clone + Send + Sync + 'static
    where
        H: Fn(Request) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: ReportsStatus + Send + 'static,
        E: Send + 'static,
    {
        let instrumentation = self.clone();
        let route_override: Option<Arc<str>> = route_override.map(Arc::from);

        move |request: Request| {
            let route = match &route_override {
                Some(route) => route.to_string(),
                None => normalize(request.uri().path()),
            };
            // Started before the future is first polled, so a caller that
            // drops it unpolled is still counted.
            let in_flight = instrumentation.start(request.method().to_string(), route);
            let future = handler(request);

            async move { settle(in_flight, future).await }.boxed()
        }
    }

    /// Measure an arbitrary future under an explicit method and route label
    pub async fn observe<Fut, R, E>(&self, method: &str, route: &str, future: Fut) -> Result<R, E>
    where
        Fut: Future<Output = Result<R, E>>,
        R: ReportsStatus,
    {
        let in_flight = self.start(method.to_string(), route.to_string());
        settle(in_flight, future).await
    }

    fn start(&self, method: String, route: String) -> InFlight {
        InFlight {
            registry: self.registry.clone(),
            service: self.service.clone(),
            method,
            route,
            started: Instant::now(),
            status: None,
        }
    }
}

/// Await the handler and close out its measurement
async fn settle<Fut, R, E>(mut in_flight: InFlight, future: Fut) -> Result<R, E>
where
    Fut: Future<Output = Result<R, E>>,
    R: ReportsStatus,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => {
            let status = match &result {
                Ok(value) => value.status_code().unwrap_or(DEFAULT_SUCCESS_STATUS),
                Err(_) => FAILURE_STATUS,
            };
            in_flight.status = Some(status);
            result
        }
        Err(panic) => {
            in_flight.status = Some(FAILURE_STATUS);
            drop(in_flight);
            std::panic::resume_unwind(panic)
        }
    }
}

/// Axum middleware recording every request that passes through it.
///
/// Install with `route_layer` so the matched route template is available as
/// the label; without it the normalized request path is used.
pub async fn track_requests(
    State(instrumentation): State<Instrumentation>,
    request: Request,
    next: Next,
) -> Response {
    let route = match request.extensions().get::<MatchedPath>() {
        Some(matched) => matched.as_str().to_string(),
        None => normalize(request.uri().path()),
    };
    let in_flight = instrumentation.start(request.method().to_string(), route);

    let result = settle(in_flight, async move {
        Ok::<_, Infallible>(next.run(request).await)
    })
    .await;

    match result {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

/// A measurement in progress. Records its sample when dropped.
struct InFlight {
    registry: Arc<MetricsRegistry>,
    service: Arc<str>,
    method: String,
    route: String,
    started: Instant,
    status: Option<u16>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let status = match self.status {
            Some(status) => status,
            None => {
                tracing::debug!(
                    method = %self.method,
                    route = %self.route,
                    "Request dropped before the handler settled"
                );
                CLIENT_CLOSED_REQUEST
            }
        };

        self.registry.record_request(&MetricSample {
            service: self.service.to_string(),
            method: std::mem::take(&mut self.method),
            route: std::mem::take(&mut self.route),
            status,
            duration_ms: self.started.elapsed().as_secs_f64() * 1000.0,
        });
    }
}
