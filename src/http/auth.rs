//! Webhook authentication.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::http::server::AppState;

/// Header carrying the shared webhook secret.
pub const WEBHOOK_SECRET_HEADER: &str = "X-Webhook-Secret";

/// Reject webhook calls without the configured shared secret.
/// Without a configured secret every call passes.
pub async fn webhook_secret_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = state.gateway.config().server.webhook_secret.as_deref() else {
        return Ok(next.run(request).await);
    };

    let presented = request
        .headers()
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|h| h.to_str().ok());

    match presented {
        Some(value) if constant_time_eq(value.as_bytes(), expected.as_bytes()) => Ok(next.run(request).await),
        _ => {
            tracing::warn!(path = %request.uri().path(), "Webhook rejected: bad or missing secret");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
