//! HTTP metrics middleware.
//!
//! Records every response, including ones produced before a handler runs
//! (404, 405, extractor rejections) and ingest upgrade rejections.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::observability::metrics::record_http_request;

/// Records method, normalized path, status and duration for each request.
///
/// Applied as the outermost layer. For the ingest endpoint the duration
/// covers the upgrade handshake only.
pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    record_http_request(&method, &path, response.status().as_u16(), start.elapsed());

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::post,
        Router,
    };
    use tower::ServiceExt;

    async fn started() -> &'static str {
        "started"
    }

    async fn failed() -> (StatusCode, &'static str) {
        (StatusCode::INTERNAL_SERVER_ERROR, "failed")
    }

    fn test_app() -> Router {
        Router::new()
            .route("/api/video/room/:session_id/mix/start", post(started))
            .route("/api/video/room/:session_id/mix/stop", post(failed))
            .layer(middleware::from_fn(http_metrics_middleware))
    }

    async fn send(method: &str, uri: &str) -> StatusCode {
        let request = HttpRequest::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request builder should succeed");

        test_app()
            .oneshot(request)
            .await
            .expect("request should succeed")
            .status()
    }

    #[tokio::test]
    async fn test_passes_success_through() {
        assert_eq!(
            send("POST", "/api/video/room/r1/mix/start").await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_passes_error_through() {
        assert_eq!(
            send("POST", "/api/video/room/r1/mix/stop").await,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_records_not_found_and_wrong_method() {
        assert_eq!(send("GET", "/nonexistent").await, StatusCode::NOT_FOUND);
        assert_eq!(
            send("GET", "/api/video/room/r1/mix/start").await,
            StatusCode::METHOD_NOT_ALLOWED
        );
    }
}
