//! Router assembly shared by the server binary and the handler tests.

use std::time::Duration;

use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::warn;

use crate::error::ApiError;
use crate::web::handlers::{
    list_messages, liveness, metrics, readiness, stats, webhook, AppState,
};
use crate::web::metrics::track_requests;

/// Build the application router with its middleware stack.
pub fn router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    Router::new()
        .route("/webhook", post(webhook))
        .route("/messages", get(list_messages))
        .route("/stats", get(stats))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .route("/metrics", get(metrics))
        .route_layer(middleware::from_fn(track_requests))
        .layer(TimeoutLayer::new(timeout))
        .layer(middleware::map_response(timeout_body))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `TimeoutLayer` answers with an empty 408; give it the JSON error body.
async fn timeout_body(response: Response) -> Response {
    if response.status() == StatusCode::REQUEST_TIMEOUT {
        warn!("request_timed_out");
        return ApiError::Timeout.into_response();
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn slow_app() -> Router {
        Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "done"
                }),
            )
            .route("/fast", get(|| async { "done" }))
            .layer(TimeoutLayer::new(Duration::from_millis(20)))
            .layer(middleware::map_response(timeout_body))
    }

    #[tokio::test]
    async fn test_timeout_returns_json_error() {
        let response = slow_app()
            .oneshot(Request::get("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["code"], "request_timeout");
    }

    #[tokio::test]
    async fn test_fast_request_passes_through() {
        let response = slow_app()
            .oneshot(Request::get("/fast").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"done");
    }
}
