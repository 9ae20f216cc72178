//! Resolves the acting identity for each API request.
//!
//! The session id travels in `x-session-id`. Elevated permission is granted
//! by presenting the configured admin key in `x-admin-key` or as a bearer
//! token; the key is checked in constant time to mitigate timing attacks.

use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::errors::AppError;
use crate::models::{Actor, SessionId};

/// Header carrying the anonymous session id.
pub const SESSION_HEADER: &str = "x-session-id";

/// Header carrying the admin key.
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Middleware that attaches an [`Actor`] extension to the request.
///
/// No key means an ordinary actor. A presented key that does not match, or
/// any key when none is configured, is rejected with 401.
pub async fn actor_layer(admin_key: Option<String>, mut request: Request, next: Next) -> Response {
    let actor = match resolve_actor(request.headers(), admin_key.as_deref()) {
        Ok(actor) => actor,
        Err(err) => {
            tracing::warn!("Rejected request to {}: {}", request.uri().path(), err);
            return err.into_response();
        }
    };

    tracing::debug!(
        "Request by session {:?} (elevated: {})",
        actor.session.as_ref().map(SessionId::as_str),
        actor.elevated
    );
    request.extensions_mut().insert(actor);
    next.run(request).await
}

/// Build the actor from request headers.
pub fn resolve_actor(headers: &HeaderMap, admin_key: Option<&str>) -> Result<Actor, AppError> {
    let session = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(SessionId::new);

    let presented = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
        });

    let elevated = match (presented, admin_key) {
        (None, _) => false,
        (Some(provided), Some(expected)) if constant_time_compare(provided, expected) => true,
        (Some(_), _) => return Err(AppError::Unauthorized("Invalid admin key".to_string())),
    };

    Ok(Actor::new(session, elevated))
}

/// Perform constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
