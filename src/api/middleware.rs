//! API Middleware
//!
//! Security-context extraction and request logging.

use axum::{
    body::Body,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use crate::domain::SecurityContext;

// =========================================================================
// Security context
// =========================================================================

const USER_ID_HEADER: &str = "x-user-id";
const ACCOUNT_ID_HEADER: &str = "x-account-id";
const PERMISSIONS_HEADER: &str = "x-permissions";
const SESSION_ID_HEADER: &str = "x-session-id";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Build a [`SecurityContext`] from identity-layer headers.
///
/// Missing headers leave fields empty; rejecting an empty principal is left
/// to the handlers.
pub fn security_context_from_headers(headers: &HeaderMap) -> SecurityContext {
    let mut context = SecurityContext::new(header_str(headers, USER_ID_HEADER).unwrap_or_default());

    if let Some(account_id) = header_str(headers, ACCOUNT_ID_HEADER) {
        context = context.with_account(account_id);
    }

    if let Some(permissions) = header_str(headers, PERMISSIONS_HEADER) {
        context = context.with_permissions(
            permissions
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect(),
        );
    }

    if let Some(session_id) = header_str(headers, SESSION_ID_HEADER) {
        context = context.with_session(session_id);
    }

    // First hop is the original client
    let ip_address = header_str(headers, FORWARDED_FOR_HEADER)
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .unwrap_or_default();
    let user_agent = header_str(headers, axum::http::header::USER_AGENT.as_str()).unwrap_or_default();

    context.with_client(ip_address, user_agent)
}

/// Attach the request's [`SecurityContext`] as an extension
pub async fn security_context_middleware(mut request: Request<Body>, next: Next) -> Response {
    let context = security_context_from_headers(request.headers());
    request.extensions_mut().insert(context);
    next.run(request).await
}

// =========================================================================
// mask_headers_for_logging
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &[
    "x-api-key",
    "authorization",
    "cookie",
    "set-cookie",
    "x-session-id",
];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let masked_value = if SENSITIVE_HEADERS.contains(&name.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

// =========================================================================
// Request Logging Middleware
// =========================================================================

/// Request logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let version = request.version();

    let headers = mask_headers_for_logging(request.headers());
    let user_id = header_str(request.headers(), USER_ID_HEADER).map(String::from);

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        version = ?version,
        user_id = ?user_id,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = %start.elapsed().as_millis(),
        user_id = ?user_id,
        "Request completed"
    );

    response
}
