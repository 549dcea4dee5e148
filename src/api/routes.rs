use crate::{
    api::{health, ops},
    observability::{track_requests, Instrumentation, ProcessClock},
    ops::OpsAggregator,
};
use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

#[derive(Clone)]
pub struct AppState {
    pub instrumentation: Instrumentation,
    pub aggregator: Arc<OpsAggregator>,
    pub clock: ProcessClock,
    /// Overall deadline applied to every ops/readiness run
    pub ops_deadline: Duration,
}

pub fn create_router(state: AppState) -> Router {
    // Dashboards poll from the browser
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let instrumented = middleware::from_fn_with_state(state.instrumentation.clone(), track_requests);

    Router::new()
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/ops/status", get(ops::ops_status))
        .route_layer(instrumented)
        // Scrapes are not counted as traffic
        .route("/metrics", get(health::metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MetricsRegistry;
    use crate::ops::{check_fn, CheckContext, CheckError, CheckSuccess, SelfInfo, ServiceCheckConfig};
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    fn healthy(name: &str) -> ServiceCheckConfig {
        let check = check_fn(|_ctx: CheckContext| async { Ok(CheckSuccess::with_code(200)) });
        ServiceCheckConfig::new(name, Arc::new(check), Duration::from_millis(200))
    }

    fn broken(name: &str) -> ServiceCheckConfig {
        let check = check_fn(|_ctx: CheckContext| async {
            Err(CheckError::Failed("connection refused".to_string()))
        });
        ServiceCheckConfig::new(name, Arc::new(check), Duration::from_millis(200))
    }

    fn state(dependency: ServiceCheckConfig, services: Vec<ServiceCheckConfig>) -> AppState {
        let registry = Arc::new(MetricsRegistry::new(vec![1.0, 10.0, 100.0]).unwrap());
        let self_info = SelfInfo {
            host_label: "web-1".to_string(),
            build_identifier: None,
            clock: ProcessClock::starting_now(),
        };

        AppState {
            instrumentation: Instrumentation::new(registry, "web"),
            aggregator: Arc::new(OpsAggregator::new(dependency, services, self_info).unwrap()),
            clock: ProcessClock::starting_now(),
            ops_deadline: Duration::from_secs(1),
        }
    }

    async fn send_get(app: &Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, body.to_vec())
    }

    #[tokio::test]
    async fn test_ops_status_echoes_range_and_disables_caching() {
        let app = create_router(state(healthy("postgres"), vec![healthy("chat"), broken("uploads")]));

        let (status, headers, body) = send_get(&app, "/ops/status?range=24h").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CACHE_CONTROL], "no-store");

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["range"], "24h");
        assert_eq!(json["ok"], false);
        assert_eq!(json["degraded"], true);
        assert_eq!(json["self"]["ok"], true);
        assert_eq!(json["services"][0]["name"], "chat");
        assert_eq!(json["services"][1]["error"], "connection refused");
    }

    #[tokio::test]
    async fn test_ops_status_is_200_even_when_everything_is_down() {
        let app = create_router(state(broken("postgres"), vec![broken("chat")]));

        let (status, _, body) = send_get(&app, "/ops/status").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json.get("range").is_none());
        assert_eq!(json["dependency"]["ok"], false);
    }

    #[tokio::test]
    async fn test_ops_status_tolerates_repeated_range() {
        let app = create_router(state(healthy("postgres"), Vec::new()));

        let (status, _, body) = send_get(&app, "/ops/status?range=1h&range=24h&view=compact").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["range"], "1h");
        assert_eq!(json["ok"], true);
    }

    #[tokio::test]
    async fn test_readiness_reflects_dependency() {
        let ready = create_router(state(healthy("postgres"), Vec::new()));
        let (status, _, _) = send_get(&ready, "/health/ready").await;
        assert_eq!(status, StatusCode::OK);

        let unready = create_router(state(broken("postgres"), Vec::new()));
        let (status, _, _) = send_get(&unready, "/health/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_liveness_skips_dependencies() {
        let app = create_router(state(broken("postgres"), Vec::new()));

        let (status, _, body) = send_get(&app, "/health/live").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["ok"], true);
    }

    #[tokio::test]
    async fn test_metrics_exposes_instrumented_routes_only() {
        let app = create_router(state(healthy("postgres"), Vec::new()));

        send_get(&app, "/health/live").await;
        send_get(&app, "/health/live").await;
        send_get(&app, "/metrics").await;

        let (status, headers, body) = send_get(&app, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], prometheus::TEXT_FORMAT);
        assert_eq!(headers[header::CACHE_CONTROL], "no-store");

        let text = String::from_utf8(body).unwrap();
        assert!(text.contains(
            r#"http_requests_total{method="GET",route="/health/live",service="web",status="200"} 2"#
        ));
        assert!(!text.contains(r#"route="/metrics""#));
    }
}
