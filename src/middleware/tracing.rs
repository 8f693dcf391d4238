//! Request tracing middleware

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Log each request with timing, inside a span carrying its request id
pub async fn request_tracing(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|id| !id.is_empty() && id.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = tracing::info_span!("request", request_id = %request_id);
    let start = Instant::now();

    let mut response = async {
        tracing::info!(method = %method, path = %path, "Request started");
        next.run(request).await
    }
    .instrument(span.clone())
    .await;

    let duration_ms = start.elapsed().as_millis();
    let status = response.status();

    span.in_scope(|| {
        if status.is_server_error() {
            tracing::error!(
                method = %method,
                path = %path,
                status = status.as_u16(),
                duration_ms = %duration_ms,
                "Request completed with error"
            );
        } else if status.is_client_error() {
            tracing::warn!(
                method = %method,
                path = %path,
                status = status.as_u16(),
                duration_ms = %duration_ms,
                "Request completed with client error"
            );
        } else {
            tracing::info!(
                method = %method,
                path = %path,
                status = status.as_u16(),
                duration_ms = %duration_ms,
                "Request completed"
            );
        }
    });

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}
