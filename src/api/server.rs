use anyhow::{Context, Result};
use axum::{middleware, routing::get, Router};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::error::panic_response;
use crate::api::handlers;
use crate::api::middleware::error_boundary;
use crate::config::Config;
use crate::health::HealthAggregator;

#[derive(Clone)]
pub struct AppState {
    pub health: Arc<HealthAggregator>,
    pub config: Arc<Config>,
}

/// Builds the HTTP surface. `features` is nested under `/api/v1` and sits
/// inside the same error boundary as the health endpoints.
pub fn create_router(state: AppState, features: Router<AppState>) -> Router {
    let index = state.config.frontend_dir.join("index.html");
    let mut router = if index.is_file() {
        Router::new().route_service("/", ServeFile::new(index))
    } else {
        Router::new().route("/", get(handlers::root))
    };

    router = router
        .route("/health", get(handlers::health_check))
        .route("/health/ui", get(handlers::health_ui))
        .nest("/api/v1", features);

    let static_dir = state.config.frontend_dir.join("static");
    if static_dir.is_dir() {
        router = router.nest_service("/static", ServeDir::new(static_dir));
    }

    router
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn_with_state(state.clone(), error_boundary))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves until `shutdown` is cancelled, then drains open connections for at
/// most `timeouts.drain_secs`.
pub async fn serve(state: AppState, features: Router<AppState>, shutdown: CancellationToken) -> Result<()> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let drain = state.config.timeouts.drain();
    let app = create_router(state, features);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!(%addr, "InnoCore API listening");
    run_server(listener, app, shutdown, drain).await
}

pub(crate) async fn run_server(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
    drain: Duration,
) -> Result<()> {
    let signal = shutdown.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { signal.cancelled().await })
        .into_future();
    tokio::pin!(server);

    let drain_expired = async {
        shutdown.cancelled().await;
        tokio::time::sleep(drain).await;
    };

    tokio::select! {
        result = &mut server => {
            result?;
            info!("API server stopped");
        }
        _ = drain_expired => {
            warn!(drain_ms = drain.as_millis() as u64, "Connections still open after drain timeout; abandoning them");
        }
    }
    Ok(())
}
