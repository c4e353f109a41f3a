//! Middleware Components
//!
//! CORS, request tracking and bearer authentication.

use super::errors::ApiError;
use crate::{errors::WalletError, orchestrator::Caller, wallet::{strip_bearer, WalletService}};
use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use tower_http::cors::{Any, CorsLayer, ExposeHeaders};
use uuid::Uuid;

/// Request ID header key
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Create CORS middleware with configurable origins
pub fn create_cors_layer(allowed_origins: Vec<String>) -> CorsLayer {
    let expose = ExposeHeaders::list([HeaderName::from_static(REQUEST_ID_HEADER)]);
    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        // Development mode: allow all origins
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(expose)
    } else {
        CorsLayer::new()
            .allow_origin(
                allowed_origins
                    .into_iter()
                    .filter_map(|o| o.parse().ok())
                    .collect::<Vec<HeaderValue>>(),
            )
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .expose_headers(expose)
    }
}

/// Middleware to add request ID to all requests
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    // Honour an ID supplied by the client
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

/// Request ID wrapper for extracting in handlers
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Resolve the bearer token to an account through the wallet backend
pub async fn authenticate(
    headers: &HeaderMap,
    wallet: &dyn WalletService,
    request_id: &str,
) -> Result<Caller, ApiError> {
    let raw = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ApiError::unauthorized(request_id.to_string(), "Authorization header missing".to_string())
        })?;

    let token = strip_bearer(raw);
    if token.is_empty() {
        return Err(ApiError::unauthorized(
            request_id.to_string(),
            "Authorization header missing".to_string(),
        ));
    }

    match wallet.verify_token(token).await {
        Ok(identity) => Ok(Caller {
            account_id: identity.account_id,
            token: token.to_string(),
        }),
        Err(WalletError::InvalidToken) => Err(ApiError::unauthorized(
            request_id.to_string(),
            "Invalid or expired token".to_string(),
        )),
        Err(e) => Err(ApiError::service_unavailable(
            request_id.to_string(),
            format!("Failed to get user information: {}", e),
        )
        .with_code("wallet_unavailable")),
    }
}
