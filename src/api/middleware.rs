use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::error;

use super::error::{error_body_response, UnhandledFailure, GENERIC_MESSAGE};
use super::server::AppState;

/// Top-level failure boundary. Any response carrying an [`UnhandledFailure`]
/// is logged once and replaced with the uniform 500 body. The real message is
/// only disclosed when `debug` is set.
pub async fn error_boundary(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let mut response = next.run(request).await;
    let Some(failure) = response.extensions_mut().remove::<UnhandledFailure>() else {
        return response;
    };

    error!(%method, %uri, error = %failure.detail, "Unhandled request failure");

    if state.config.debug {
        error_body_response(&failure.message)
    } else {
        error_body_response(GENERIC_MESSAGE)
    }
}
