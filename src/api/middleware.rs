//! API Middleware
//!
//! Authentication and request logging.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::domain::OperationContext;

use super::AppState;

/// Request user from X-Request-User-Id header
#[derive(Debug, Clone)]
pub struct RequestUser {
    pub user_id: Uuid,
}

/// Hex SHA-256 digest of an API key.
pub fn digest_api_key(key: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

// =========================================================================
// API key authentication middleware
// =========================================================================

/// Extract and validate the API key from the X-API-Key header.
pub async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let api_key = match headers.get("X-API-Key").and_then(|v| v.to_str().ok()) {
        Some(key) => key,
        None => {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "Missing X-API-Key header",
                    "error_code": "missing_api_key"
                })),
            )
                .into_response());
        }
    };

    if digest_api_key(api_key) != state.api_key_digest {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "Invalid API key",
                "error_code": "invalid_api_key"
            })),
        )
            .into_response());
    }

    // Extract X-Request-User-Id if present; transfer endpoints require
    // it and check for the RequestUser extension themselves
    if let Some(user_id_str) = headers
        .get("X-Request-User-Id")
        .and_then(|v| v.to_str().ok())
    {
        match Uuid::parse_str(user_id_str) {
            Ok(user_id) => {
                request.extensions_mut().insert(RequestUser { user_id });
            }
            Err(_) => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": "Invalid X-Request-User-Id header format",
                        "error_code": "invalid_user_id"
                    })),
                )
                    .into_response());
            }
        }
    }

    // Correlation ID from the caller, or a fresh one
    let correlation_id = headers
        .get("X-Correlation-Id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    let context = OperationContext::new().with_correlation_id(correlation_id);
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

// =========================================================================
// Request logging middleware
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &["x-api-key", "authorization", "cookie", "set-cookie"];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

/// Request logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let headers = mask_headers_for_logging(request.headers());

    let correlation_id = request
        .extensions()
        .get::<OperationContext>()
        .and_then(|ctx| ctx.correlation_id);

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        correlation_id = ?correlation_id,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = %duration.as_millis(),
        correlation_id = ?correlation_id,
        "Request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_headers_for_logging() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        headers.insert("x-api-key", "secret-key-12345".parse().unwrap());
        headers.insert("x-request-user-id", "user-123".parse().unwrap());

        let masked = mask_headers_for_logging(&headers);

        let api_key = masked.iter().find(|(k, _)| k == "x-api-key");
        let content_type = masked.iter().find(|(k, _)| k == "content-type");
        let user_id = masked.iter().find(|(k, _)| k == "x-request-user-id");

        assert_eq!(api_key.unwrap().1, "[REDACTED]");
        assert_eq!(content_type.unwrap().1, "application/json");
        assert_eq!(user_id.unwrap().1, "user-123");
    }

    #[test]
    fn test_digest_is_hex_sha256() {
        let digest = digest_api_key("test_key_123");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, digest_api_key("test_key_123"));
        assert_ne!(digest, digest_api_key("other_key"));
    }
}
