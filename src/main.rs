// Main entry point - Dependency injection and server setup
use std::sync::Arc;

use anyhow::Context;
use hospital_dashboards::application::controller::DashboardController;
use hospital_dashboards::application::ports::ActionRouter;
use hospital_dashboards::application::query_service::RemoteQueryService;
use hospital_dashboards::application::scheduler::{Scheduler, TokioScheduler};
use hospital_dashboards::infrastructure::action_router::TracingActionRouter;
use hospital_dashboards::infrastructure::config::{
    build_definitions, load_backend_config, load_dashboards_config,
};
use hospital_dashboards::infrastructure::jsonrpc_service::JsonRpcQueryService;
use hospital_dashboards::presentation::app_state::AppState;
use hospital_dashboards::presentation::handlers::router;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let backend_config = load_backend_config().context("Failed to load config/backend")?;
    let dashboards_config = load_dashboards_config().context("Failed to load config/dashboards")?;
    let definitions = build_definitions(&dashboards_config)?;

    // Remote query service (infrastructure layer)
    let service: Arc<dyn RemoteQueryService> =
        Arc::new(JsonRpcQueryService::from_settings(&backend_config.backend)?);
    let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler);
    let action_router: Arc<dyn ActionRouter> = Arc::new(TracingActionRouter);

    // One controller per dashboard (application layer)
    let controllers = definitions.into_iter().map(|definition| {
        DashboardController::new(
            definition,
            service.clone(),
            scheduler.clone(),
            action_router.clone(),
            None,
        )
    });
    let state = Arc::new(AppState::new(controllers));
    state.activate_all().await;

    // Start server (presentation layer)
    let listener = tokio::net::TcpListener::bind(&backend_config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", backend_config.server.bind))?;
    tracing::info!(
        addr = %backend_config.server.bind,
        dashboards = ?state.names(),
        "Starting hospital-dashboards service"
    );

    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.deactivate_all();
    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
