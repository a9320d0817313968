// HTTP request handlers bridging browser code to dashboard controllers
use crate::application::controller::DashboardController;
use crate::domain::action::ListAction;
use crate::domain::refresh::View;
use crate::domain::state::DashboardState;
use crate::presentation::app_state::AppState;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
};
use futures::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/dashboards", get(list_dashboards))
        .route("/dashboards/:name", get(get_dashboard))
        .route("/dashboards/:name/stream", get(stream_dashboard))
        .route("/dashboards/:name/views/:view", post(switch_view))
        .route("/dashboards/:name/refresh", post(refresh_dashboard))
        .route("/dashboards/:name/sections/:section", post(open_section))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn controller(state: &AppState, name: &str) -> Result<DashboardController, StatusCode> {
    state.dashboard(name).cloned().ok_or_else(|| {
        tracing::debug!(dashboard = %name, "unknown dashboard");
        StatusCode::NOT_FOUND
    })
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_dashboards(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.names())
}

pub async fn get_dashboard(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<DashboardState>, StatusCode> {
    Ok(Json(controller(&state, &name)?.snapshot()))
}

/// One event with the full state now, then one per merge.
pub async fn stream_dashboard(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let rx = controller(&state, &name)?.subscribe();
    let stream = WatchStream::new(rx).filter_map(|snapshot| match Event::default().json_data(&snapshot) {
        Ok(event) => Some(Ok(event)),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize dashboard state");
            None
        }
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub async fn switch_view(
    Path((name, view)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<DashboardState>, StatusCode> {
    let controller = controller(&state, &name)?;
    controller.switch_view(View::new(view)).await;
    Ok(Json(controller.snapshot()))
}

pub async fn refresh_dashboard(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<DashboardState>, StatusCode> {
    let controller = controller(&state, &name)?;
    controller.refresh_all().await;
    Ok(Json(controller.snapshot()))
}

pub async fn open_section(
    Path((name, section)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListAction>, StatusCode> {
    controller(&state, &name)?
        .open_section(&section)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
