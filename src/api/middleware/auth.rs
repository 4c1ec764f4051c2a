//! Session token authentication middleware.
//!
//! Takes the token from the `session_token` cookie or, failing that, from
//! `Authorization: Bearer <token>`. Validates it against the session
//! manager (which slides the idle deadline) and injects `SessionContext`
//! into request extensions for downstream handlers.

use std::time::Duration;

use axum::http::header::{AUTHORIZATION, CACHE_CONTROL, COOKIE};
use axum::http::{HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, SessionContext};
use crate::config::SESSION_COOKIE;
use crate::session_manager::token_prefix;

/// Find the session token in a request's headers. The cookie wins when both
/// are present.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string());
    if from_cookie.is_some() {
        return from_cookie;
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// `Set-Cookie` value carrying a fresh session token.
pub fn session_cookie(token: &str, max_age: Duration) -> String {
    format!(
        "{SESSION_COOKIE}={token}; Path=/; Max-Age={}; HttpOnly; SameSite=Strict",
        max_age.as_secs()
    )
}

/// `Set-Cookie` value that clears the session cookie on logout.
pub fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; Max-Age=0; HttpOnly; SameSite=Strict")
}

/// Require a valid session token.
///
/// Accesses `ApiContext` from request extensions (injected by Extension layer).
/// On success: injects `SessionContext` and marks the response `no-store`.
pub async fn require_session(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_session_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_session_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let token = extract_token(req.headers()).ok_or(ApiError::Unauthorized)?;

    // Session mutex is released before the handler runs.
    let identity = ctx.core.validate_token(&token).map_err(|e| {
        tracing::debug!(token = %token_prefix(&token), "Rejected session token");
        ApiError::from(e)
    })?;

    req.extensions_mut().insert(SessionContext { token, identity });

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(response)
}
