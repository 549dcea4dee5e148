// Ops dashboard data source

use crate::api::routes::AppState;
use crate::ops::OpsStatusReport;
use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Serialize;

/// Query parameters as sent, repeats included
pub type OpsStatusQuery = Vec<(String, String)>;

/// The `range` hint is opaque to the service and echoed back for the
/// dashboard's history view; when repeated, the first one wins.
fn range_hint(query: OpsStatusQuery) -> Option<String> {
    query
        .into_iter()
        .find(|(key, _)| key == "range")
        .map(|(_, value)| value)
}

#[derive(Debug, Serialize)]
pub struct OpsStatusResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(flatten)]
    pub report: OpsStatusReport,
}

/// GET /ops/status - Live probe of every dependency.
///
/// Always 200: dependency health is carried in the body, not the status.
#[tracing::instrument(skip(state))]
pub async fn ops_status(
    State(state): State<AppState>,
    Query(query): Query<OpsStatusQuery>,
) -> impl IntoResponse {
    let report = state.aggregator.run(state.ops_deadline).await;

    (
        [(header::CACHE_CONTROL, "no-store")],
        Json(OpsStatusResponse {
            range: range_hint(query),
            report,
        }),
    )
}
