//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the patient flow REST API (with SSE event streams and Swagger UI) on its own.
//!
//! ## Intended use
//! Useful in development when only the HTTP surface is needed. The workspace's main `flow-run`
//! binary serves the same router with workspace-level logging defaults.

use api_rest::{bootstrap, router, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the patient flow REST API server.
///
/// # Environment Variables
/// - `FLOW_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `FLOW_DATA_DIR`: Snapshot root; unset keeps state in memory only
/// - `FLOW_TENANTS`: Comma-separated tenant ids to open at startup
/// - `FLOW_PATIENT_DIRECTORY`: JSON file of known patients per tenant
/// - `API_KEY`: Key required in `x-api-key` on tenant routes
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - any `FLOW_*` variable is invalid or a tenant snapshot cannot be restored,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("flow_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = bootstrap::rest_addr_from_env();
    tracing::info!("-- Starting patient flow REST API on {}", addr);

    let registry = bootstrap::registry_from_env()?;
    let app = router(AppState::new(registry, bootstrap::api_key_from_env()));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
