use api_rest::{bootstrap, router, AppState};
use api_shared::HealthService;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the patient flow service
///
/// Serves the REST API, the per-tenant SSE event streams and Swagger UI on one address, and
/// stops accepting connections on Ctrl-C.
///
/// # Environment Variables
/// - `FLOW_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `FLOW_DATA_DIR`: Snapshot root; unset keeps state in memory only
/// - `FLOW_UTC_OFFSET_MINUTES`: Practice-local offset used for "today" (default: 0)
/// - `FLOW_EVENT_HISTORY` / `FLOW_BROADCAST_CAPACITY`: Per-tenant event buffer sizes
/// - `FLOW_TENANTS`: Comma-separated tenant ids to open at startup
/// - `FLOW_PATIENT_DIRECTORY`: JSON file of known patients per tenant
/// - `API_KEY`: Key required in `x-api-key` on tenant routes
///
/// # Returns
/// * `Ok(())` - If the server starts and shuts down cleanly
/// * `Err(anyhow::Error)` - If configuration, startup or the server itself fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("flow=info".parse()?)
                .add_directive("flow_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = bootstrap::rest_addr_from_env();
    tracing::info!("++ Starting patient flow REST on {}", rest_addr);

    let registry = bootstrap::registry_from_env()?;
    tracing::info!(
        "{} ({} tenants open)",
        HealthService::check_health().message,
        registry.tenant_ids().len()
    );

    let app = router(AppState::new(registry, bootstrap::api_key_from_env()));
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("-- Patient flow stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
}
