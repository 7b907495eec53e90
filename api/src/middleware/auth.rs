//! Authentication middleware

use crate::{error::ApiError, ApiState};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Header carrying the shared key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Require `X-API-KEY` to match the configured key.
///
/// A server without a configured key refuses every request.
pub async fn require_api_key(
    State(state): State<Arc<ApiState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let expected = state
        .api_key
        .as_deref()
        .filter(|k| !k.is_empty())
        .ok_or(ApiError::KeyNotConfigured)?;

    let given = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !keys_match(given.as_bytes(), expected.as_bytes()) {
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}

/// Constant-time over equal-length keys
fn keys_match(given: &[u8], expected: &[u8]) -> bool {
    if given.len() != expected.len() {
        return false;
    }
    given.iter().zip(expected).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}
