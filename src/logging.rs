use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Request id stored in request extensions for handlers that want to log it.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl std::ops::Deref for RequestId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

/// Milliseconds since `started`, with sub-millisecond precision.
pub(crate) fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Request/response logging middleware.
///
/// Bodies are never buffered: streamed responses pass through untouched, so
/// the elapsed time covers the handler only, not the full stream.
pub async fn request_logging(mut req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    req.extensions_mut().insert(RequestId(request_id.clone()));

    let method = req.method().clone();
    let path = req.uri().path().to_string();

    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        "--> request"
    );

    let started = Instant::now();
    let mut response = next.run(req).await;
    let elapsed = elapsed_ms(started);
    let status = response.status().as_u16();

    if response.status().is_server_error() {
        tracing::error!(request_id = %request_id, status, elapsed_ms = elapsed, "<-- response");
    } else if response.status().is_client_error() {
        tracing::warn!(request_id = %request_id, status, elapsed_ms = elapsed, "<-- response");
    } else {
        tracing::info!(request_id = %request_id, status, elapsed_ms = elapsed, "<-- response");
    }

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, routing::get, Router};
    use tower::ServiceExt;

    #[test]
    fn test_elapsed_ms_is_non_negative() {
        assert!(elapsed_ms(Instant::now()) >= 0.0);
    }

    #[tokio::test]
    async fn test_request_id_is_returned_in_header() {
        let app = Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(axum::middleware::from_fn(request_logging));

        let response = app
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(Uuid::parse_str(id).is_ok());
    }

    #[tokio::test]
    async fn test_handlers_can_read_request_id() {
        let app = Router::new()
            .route(
                "/id",
                get(|axum::Extension(id): axum::Extension<RequestId>| async move { id.0 }),
            )
            .layer(axum::middleware::from_fn(request_logging));

        let response = app
            .oneshot(Request::builder().uri("/id").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let header = response.headers().get(REQUEST_ID_HEADER).cloned().unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(header.as_bytes(), &body[..]);
    }
}
