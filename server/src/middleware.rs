//! CORS and request logging middleware.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::metrics::Metrics;

/// Allowed origin for CORS responses.
#[derive(Clone)]
pub struct CorsState {
    pub allowed_origin: Option<HeaderValue>,
}

impl CorsState {
    /// Build from the configured origin; an unusable value disables CORS.
    pub fn new(origin: Option<&str>) -> Self {
        let allowed_origin = origin.and_then(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        });
        Self { allowed_origin }
    }
}

/// Attach CORS headers and answer preflight requests with 204.
pub async fn cors_middleware(State(cors): State<CorsState>, req: Request, next: Next) -> Response {
    let mut response = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };

    if let Some(origin) = cors.allowed_origin {
        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type, Authorization"),
        );
    }
    response
}

/// Log each request in a span carrying a fresh `request_id`.
pub async fn request_logging(
    State(metrics): State<Arc<Metrics>>,
    req: Request,
    next: Next,
) -> Response {
    metrics.request_received();

    let request_id = Uuid::new_v4();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let span = tracing::info_span!("request", %request_id, %method, %path);

    async move {
        let started = Instant::now();
        info!("Request received");

        let mut response = next.run(req).await;

        let status = response.status();
        let latency_ms = started.elapsed().as_millis() as u64;
        if status.is_server_error() {
            warn!(status = status.as_u16(), latency_ms, "Request failed");
        } else {
            info!(status = status.as_u16(), latency_ms, "Request completed");
        }

        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert("x-request-id", value);
        }
        response
    }
    .instrument(span)
    .await
}
