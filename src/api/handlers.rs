use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::warn;

use super::server::AppState;
use crate::types::UnhealthyReport;

const HEALTH_UI: &str = include_str!("../../assets/health_ui.html");

pub async fn health_check(State(state): State<AppState>) -> Response {
    match state.health.snapshot().await {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => {
            warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(UnhealthyReport::new(e.to_string())),
            )
                .into_response()
        }
    }
}

pub async fn health_ui() -> Html<&'static str> {
    Html(HEALTH_UI)
}

/// Served at `/` when the frontend directory has no `index.html`.
pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Welcome to InnoCore Research API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}
