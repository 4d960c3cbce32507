//! Middleware components for Matrixon API
//!
//! Access token authentication for client routes, plus the tracing and
//! CORS layers every router gets.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tower_http::{
    classify::{ServerErrorsAsFailures, SharedClassifier},
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{debug, error};

use crate::{error::AuthError, routes::AppState};

/// Pull the token out of `Authorization: Bearer <token>`
fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Authentication middleware.
///
/// Resolves the access token to a `Device` and stores it in the request
/// extensions for the handler.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    debug!("🔒 Authenticating request");
    let token = bearer_token(&request).ok_or(AuthError::MissingToken)?;

    let device = state
        .devices
        .device_for_token(token)
        .await
        .map_err(|e| {
            error!("❌ Device lookup failed: {}", e);
            AuthError::Unavailable(e.to_string())
        })?
        .ok_or(AuthError::UnknownToken)?;

    debug!("✅ Authenticated {} ({})", device.user_id, device.device_id);
    request.extensions_mut().insert(device);
    Ok(next.run(request).await)
}

/// Create common middleware layers
pub fn create_middleware_stack() -> (
    TraceLayer<SharedClassifier<ServerErrorsAsFailures>>,
    CorsLayer,
) {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(tracing::Level::DEBUG))
        .on_request(DefaultOnRequest::new().level(tracing::Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(tracing::Level::DEBUG));

    let cors_layer = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    (trace_layer, cors_layer)
}
