use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use std::any::Any;
use thiserror::Error;

use crate::lifecycle::panic_message;

pub const INTERNAL_ERROR: &str = "Internal server error";
pub const GENERIC_MESSAGE: &str = "Something went wrong";
/// Sent verbatim when the error body itself cannot be rendered.
pub const FALLBACK_BODY: &str =
    r#"{"error":"Internal server error","message":"Something went wrong"}"#;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "Not found", "message": message })),
            )
                .into_response(),
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Bad request", "message": message })),
            )
                .into_response(),
            ApiError::Internal(e) => internal_error_response(UnhandledFailure {
                message: e.to_string(),
                detail: format!("{:#}", e),
            }),
        }
    }
}

/// Attached to a 500 response so the error boundary can log it and decide how
/// much of it the client sees.
#[derive(Debug, Clone)]
pub struct UnhandledFailure {
    pub message: String,
    pub detail: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
}

/// A 500 with the generic body. The boundary rewrites it once it has seen
/// the attached failure.
pub fn internal_error_response(failure: UnhandledFailure) -> Response {
    let mut response = error_body_response(GENERIC_MESSAGE);
    response.extensions_mut().insert(failure);
    response
}

pub fn error_body_response(message: &str) -> Response {
    let body = serde_json::to_string(&ErrorBody {
        error: INTERNAL_ERROR,
        message,
    })
    .unwrap_or_else(|_| FALLBACK_BODY.to_string());

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

/// Converts a caught handler panic into the same 500 as any other failure.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message =
        panic_message(payload.as_ref()).unwrap_or_else(|| "handler panicked".to_string());

    internal_error_response(UnhandledFailure {
        detail: format!("panic: {}", message),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn test_fallback_body_is_valid_json() {
        let value: serde_json::Value = serde_json::from_str(FALLBACK_BODY).unwrap();
        assert_eq!(value["error"], INTERNAL_ERROR);
        assert_eq!(value["message"], GENERIC_MESSAGE);
    }

    #[tokio::test]
    async fn test_internal_error_carries_failure() {
        let response =
            ApiError::Internal(anyhow!("pool exhausted").context("loading workflow")).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let failure = response.extensions().get::<UnhandledFailure>().cloned().unwrap();
        assert_eq!(failure.message, "loading workflow");
        assert_eq!(failure.detail, "loading workflow: pool exhausted");

        let json = body_json(response).await;
        assert_eq!(json["message"], GENERIC_MESSAGE);
    }

    #[tokio::test]
    async fn test_not_found_is_not_a_failure() {
        let response = ApiError::NotFound("workflow 42".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.extensions().get::<UnhandledFailure>().is_none());
        assert_eq!(body_json(response).await["message"], "workflow 42");
    }

    #[test]
    fn test_panic_payloads() {
        let response = panic_response(Box::new("static message"));
        let failure = response.extensions().get::<UnhandledFailure>().unwrap();
        assert_eq!(failure.message, "static message");

        let response = panic_response(Box::new(String::from("owned message")));
        let failure = response.extensions().get::<UnhandledFailure>().unwrap();
        assert_eq!(failure.message, "owned message");

        let response = panic_response(Box::new(7_u32));
        let failure = response.extensions().get::<UnhandledFailure>().unwrap();
        assert_eq!(failure.message, "handler panicked");
    }
}
