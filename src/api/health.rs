use crate::api::routes::AppState;
use crate::errors::Result;
use crate::observability::LivenessStatus;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};

/// GET /health/live - Liveness probe, no dependency checks
#[tracing::instrument(skip(state))]
pub async fn liveness(State(state): State<AppState>) -> impl IntoResponse {
    Json(LivenessStatus::current(&state.clock))
}

/// GET /health/ready - Readiness probe, 503 unless the report is ok
#[tracing::instrument(skip(state))]
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.aggregator.run(state.ops_deadline).await;

    let status = if report.ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, [(header::CACHE_CONTROL, "no-store")], Json(report))
}

/// GET /metrics - Prometheus metrics
pub async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let registry = state.instrumentation.registry();
    let body = registry.snapshot()?;

    Ok((
        [
            (header::CONTENT_TYPE, registry.content_type()),
            (header::CACHE_CONTROL, "no-store"),
        ],
        body,
    ))
}
