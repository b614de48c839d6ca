/**
 * Identity Extraction
 *
 * Resolves the caller from the `Authorization: Bearer <jwt>` header or,
 * failing that, the `authToken` cookie. Routes are not blocked here: a
 * missing or invalid token yields an anonymous caller and the authorizer
 * decides per document.
 */

use crate::backend::auth::{Identity, SessionKeys};
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use std::convert::Infallible;

/// Name of the cookie carrying a session token
pub const AUTH_COOKIE: &str = "authToken";

/// Caller identity, `None` for anonymous callers
#[derive(Clone, Debug)]
pub struct MaybeIdentity(pub Option<Identity>);

impl MaybeIdentity {
    pub fn identity(&self) -> Option<&Identity> {
        self.0.as_ref()
    }
}

/// Find a session token in the request headers
///
/// The `Authorization` header wins over the cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == AUTH_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|token| !token.is_empty())
}

/// Resolve the caller from request headers
pub fn resolve_identity(headers: &HeaderMap, keys: &SessionKeys) -> Option<Identity> {
    let token = extract_token(headers)?;
    match keys.identity_from_token(token) {
        Ok(identity) => Some(identity),
        Err(e) => {
            tracing::debug!("[Auth] Ignoring invalid token: {}", e);
            None
        }
    }
}

impl<S> FromRequestParts<S> for MaybeIdentity
where
    SessionKeys: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = SessionKeys::from_ref(state);
        Ok(MaybeIdentity(resolve_identity(&parts.headers, &keys)))
    }
}
