//! Authentication endpoints

use axum::{
    Router,
    extract::{Path, Query, State},
    http::{HeaderMap, header::ORIGIN},
    response::{IntoResponse, Json, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::SameSite;
use serde::{Deserialize, Serialize};
use time::Duration;

use super::ActionResult;
use crate::AppState;
use crate::auth::{
    CookieOptions, LAST_LOGIN_COOKIE, MaybeSession, build_cookie, expired_session_cookie,
    session_cookie,
};
use crate::error::AppError;
use crate::identity::OAuthProvider;
use crate::service::{LoginForm, SignUpForm};

/// Create authentication router
///
/// Routes:
/// - POST /signup - Create account and sign in
/// - POST /login - Email/password sign in
/// - POST /logout - Sign out
/// - GET /session - Whether the session cookie is valid
/// - GET /oauth - OAuth callback (`userId`, `secret`)
/// - POST /oauth/:provider - Start OAuth login
/// - POST /cookies - Set or clear a cookie
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(sign_up))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/session", get(session_status))
        .route("/oauth", get(oauth_callback))
        .route("/oauth/:provider", post(oauth_start))
        .route("/cookies", post(manage_cookie))
}

/// POST /api/auth/signup
async fn sign_up(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(form): Json<SignUpForm>,
) -> Result<(CookieJar, Json<ActionResult>), AppError> {
    let session = state.auth.sign_up(form).await?;
    let jar = jar.add(session_cookie(&state.config, session.secret));
    Ok((jar, Json(ActionResult::ok())))
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(form): Json<LoginForm>,
) -> Result<(CookieJar, Json<ActionResult>), AppError> {
    let session = state.auth.login(form).await?;
    let jar = jar.add(session_cookie(&state.config, session.secret));
    Ok((jar, Json(ActionResult::ok())))
}

/// POST /api/auth/logout
///
/// The cookie is cleared even when the identity service refuses.
async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    MaybeSession(session): MaybeSession,
) -> Response {
    let result = match session {
        Some(session) => state.auth.logout(&session).await,
        None => Ok(()),
    };

    let jar = jar.add(expired_session_cookie(&state.config));
    match result {
        Ok(()) => (jar, Json(ActionResult::ok())).into_response(),
        Err(error) => (jar, error).into_response(),
    }
}

#[derive(Debug, Serialize)]
struct SessionStatus {
    valid: bool,
}

/// GET /api/auth/session
async fn session_status(
    State(state): State<AppState>,
    MaybeSession(session): MaybeSession,
) -> Json<SessionStatus> {
    Json(SessionStatus {
        valid: state.auth.verify_session(session.as_deref()).await,
    })
}

#[derive(Debug, Deserialize)]
struct OAuthCallbackQuery {
    #[serde(rename = "userId")]
    user_id: Option<String>,
    secret: Option<String>,
}

/// GET /api/auth/oauth
///
/// Landing point after the provider consent screen.
async fn oauth_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<(CookieJar, Redirect), AppError> {
    let (Some(user_id), Some(secret)) = (
        query.user_id.filter(|v| !v.is_empty()),
        query.secret.filter(|v| !v.is_empty()),
    ) else {
        tracing::warn!("OAuth callback without userId or secret");
        return Err(AppError::BadRequest("Missing userId or secret".to_string()));
    };

    let session = state.auth.complete_oauth(&user_id, &secret).await?;

    let last_login = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let jar = jar
        .add(session_cookie(&state.config, session.secret))
        .add(build_cookie(
            LAST_LOGIN_COOKIE.to_string(),
            last_login,
            &CookieOptions::strict(state.config.should_use_secure_cookies()),
        ));

    Ok((jar, Redirect::temporary("/dashboard")))
}

/// POST /api/auth/oauth/:provider
async fn oauth_start(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ActionResult>, AppError> {
    let provider: OAuthProvider = provider.parse().map_err(|_| AppError::NotFound)?;
    let origin = headers.get(ORIGIN).and_then(|value| value.to_str().ok());

    let url = state.auth.oauth_redirect_url(provider, origin).await?;
    Ok(Json(ActionResult::redirect(url)))
}

/// Cookie management request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CookieRequest {
    action: Option<String>,
    cookie_name: Option<String>,
    value: Option<String>,
    options: Option<CookieRequestOptions>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CookieRequestOptions {
    path: Option<String>,
    http_only: Option<bool>,
    secure: Option<bool>,
    same_site: Option<String>,
    max_age: Option<i64>,
}

impl CookieRequestOptions {
    /// Resolve against defaults: path `/`, HttpOnly, Strict, Secure in
    /// production, and the session lifetime
    fn resolve(self, state: &AppState) -> CookieOptions {
        let defaults = CookieOptions::strict(state.config.should_use_secure_cookies());
        CookieOptions {
            path: self
                .path
                .filter(|path| !path.is_empty())
                .unwrap_or(defaults.path),
            http_only: self.http_only.unwrap_or(defaults.http_only),
            secure: self.secure.unwrap_or(defaults.secure),
            same_site: self
                .same_site
                .as_deref()
                .map(parse_same_site)
                .unwrap_or(defaults.same_site),
            max_age: Some(Duration::seconds(
                self.max_age
                    .filter(|age| *age > 0)
                    .unwrap_or(state.config.session.max_age_seconds),
            )),
        }
    }
}

fn parse_same_site(value: &str) -> SameSite {
    match value.to_ascii_lowercase().as_str() {
        "lax" => SameSite::Lax,
        "none" => SameSite::None,
        _ => SameSite::Strict,
    }
}

/// POST /api/auth/cookies
///
/// Body: `{action: "set" | "clear", cookieName, value?, options?}`
async fn manage_cookie(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<CookieRequest>,
) -> Result<(CookieJar, Json<ActionResult>), AppError> {
    let (Some(action), Some(name)) = (
        request.action.filter(|v| !v.is_empty()),
        request.cookie_name.filter(|v| !v.is_empty()),
    ) else {
        return Err(AppError::BadRequest(
            "Missing required fields: 'action' or 'cookieName'".to_string(),
        ));
    };

    let options = request.options.unwrap_or_default().resolve(&state);
    let cookie = match action.as_str() {
        "set" => {
            let value = request.value.filter(|v| !v.is_empty()).ok_or_else(|| {
                AppError::BadRequest("Value is required for setting a cookie.".to_string())
            })?;
            build_cookie(name, value, &options)
        }
        "clear" => {
            let options = CookieOptions {
                max_age: Some(Duration::ZERO),
                ..options
            };
            build_cookie(name, String::new(), &options)
        }
        _ => {
            return Err(AppError::BadRequest(
                "Invalid action. Use 'set' or 'clear'.".to_string(),
            ));
        }
    };

    tracing::debug!(cookie = %cookie.name(), action = %action, "Cookie updated");
    Ok((jar.add(cookie), Json(ActionResult::ok())))
}
