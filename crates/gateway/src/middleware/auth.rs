//! Passcode authentication
//!
//! Every protected operation requires the `Authorization` header to carry the
//! admin passcode, either as `Bearer <passcode>` or as the bare value.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::AppState;

pub async fn require_passcode(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let expected = state
        .config
        .auth
        .admin_passcode
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());

    let Some(expected) = expected else {
        tracing::error!("ADMIN_PASSCODE is not set; rejecting request");
        return reject(StatusCode::INTERNAL_SERVER_ERROR, "Passcode is not configured");
    };

    let Some(provided) = provided_passcode(request.headers()) else {
        tracing::warn!(path = %request.uri().path(), "Missing passcode");
        return reject(StatusCode::UNAUTHORIZED, "Authorization header with passcode is required");
    };

    if provided != expected {
        tracing::warn!(path = %request.uri().path(), "Invalid passcode provided");
        return reject(StatusCode::UNAUTHORIZED, "Invalid passcode");
    }

    next.run(request).await
}

/// Passcode from the header with an optional `Bearer ` prefix stripped
fn provided_passcode(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn reject(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_prefix_stripped() {
        assert_eq!(provided_passcode(&headers("Bearer abc")).as_deref(), Some("abc"));
        assert_eq!(provided_passcode(&headers("  abc  ")).as_deref(), Some("abc"));
    }

    #[test]
    fn test_empty_token_is_missing() {
        assert!(provided_passcode(&headers("Bearer ")).is_none());
        assert!(provided_passcode(&HeaderMap::new()).is_none());
    }
}
