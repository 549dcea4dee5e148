use fleet_ops::{
    api::{create_router, AppState},
    config::Config,
    db::{create_pool, PostgresCheck},
    observability::{init_tracing, Instrumentation, MetricsRegistry, ProcessClock},
    ops::{HttpCheck, OpsAggregator, SelfInfo, ServiceCheckConfig},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let clock = ProcessClock::process();

    // Load configuration
    let config = Config::load()?;
    config.validate()?;

    init_tracing(&config.observability)?;

    tracing::info!("Starting fleet-ops service");
    tracing::info!("Configuration loaded: {:?}", config.server);

    let db_pool = create_pool(&config.database)?;

    let registry = Arc::new(MetricsRegistry::new(
        config.observability.latency_buckets_ms.clone(),
    )?);
    let instrumentation = Instrumentation::new(registry, config.observability.service_name.as_str());

    let aggregator = build_aggregator(&config, db_pool, clock)?;

    let state = AppState {
        instrumentation,
        aggregator: Arc::new(aggregator),
        clock,
        ops_deadline: config.ops.overall_deadline(),
    };
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn build_aggregator(
    config: &Config,
    db_pool: sqlx::PgPool,
    clock: ProcessClock,
) -> fleet_ops::Result<OpsAggregator> {
    let dependency = ServiceCheckConfig::new(
        "postgres",
        Arc::new(PostgresCheck::new(db_pool)),
        config.ops.dependency_timeout(),
    );

    let client = reqwest::Client::new();
    let mut services = Vec::with_capacity(config.ops.services.len());
    for peer in &config.ops.services {
        let check = HttpCheck::new(client.clone(), &peer.url)?;
        let mut service = ServiceCheckConfig::new(
            peer.name.clone(),
            Arc::new(check),
            Duration::from_millis(peer.timeout_ms),
        );
        if !peer.required {
            service = service.optional();
        }
        services.push(service);
    }

    let self_info = SelfInfo {
        host_label: config.ops.host_label(),
        build_identifier: config.ops.build_id.clone(),
        clock,
    };

    OpsAggregator::new(dependency, services, self_info)
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
