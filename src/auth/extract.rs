//! Session extractors
//!
//! Handlers behind `/api/onboarding` and `/api/user` are not gated by the
//! request gate, so they pull the session secret themselves.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::CookieJar;

use super::cookie::session_secret;
use crate::AppState;
use crate::error::AppError;

/// Extractor for the caller's session secret
///
/// Rejects with 401 when the session cookie is absent.
///
/// # Usage
/// ```ignore
/// async fn handler(SessionSecret(secret): SessionSecret) -> impl IntoResponse {
///     // call the identity service as the user
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SessionSecret(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for SessionSecret
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);
        session_secret(&jar, &state.config.session.cookie_name)
            .map(SessionSecret)
            .ok_or(AppError::Unauthorized)
    }
}

/// Optional session secret extractor
///
/// Returns None if no session cookie is present, instead of error.
#[derive(Debug, Clone)]
pub struct MaybeSession(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);
        Ok(MaybeSession(session_secret(
            &jar,
            &state.config.session.cookie_name,
        )))
    }
}
