//! Gate middleware
//!
//! Session resolution is the only I/O; the decision itself is the pure
//! [`decide`] so it can be tested without a server.

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue, header::SET_COOKIE},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;

use super::routes::{Route, RouteClass};
use crate::AppState;
use crate::auth::{expired_session_cookie, session_secret};
use crate::identity::Account;
use crate::metrics::GATE_DECISIONS_TOTAL;
use crate::service::OnboardingService;

/// Set to `true` on requests forwarded for a signed-in user
pub const USER_AUTHENTICATED_HEADER: HeaderName = HeaderName::from_static("x-user-authenticated");
/// Account id of the signed-in user
pub const USER_ID_HEADER: HeaderName = HeaderName::from_static("x-user-id");

const LOGIN_PATH: &str = "/login";
const DASHBOARD_PATH: &str = "/dashboard";
const ONBOARDING_PATH: &str = "/onboarding";

/// What the session cookie turned out to be
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Missing,
    Valid(Account),
    /// Present but not accepted by the identity service
    Invalid,
    /// Identity service could not be asked
    Unavailable,
}

/// Gate outcome for a request
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Forward as the signed-in account
    Allow(Account),
    /// Forward without identity
    Anonymous { clear_cookie: bool },
    Redirect { to: String, clear_cookie: bool },
}

impl Decision {
    fn label(&self) -> &'static str {
        match self {
            Decision::Allow(_) => "allow",
            Decision::Anonymous { clear_cookie: false } => "anonymous",
            Decision::Anonymous { clear_cookie: true } => "anonymous_cleared",
            Decision::Redirect { to, .. } if to == DASHBOARD_PATH => "redirect_dashboard",
            Decision::Redirect { to, .. } if to == ONBOARDING_PATH => "redirect_onboarding",
            Decision::Redirect { .. } => "redirect_login",
        }
    }
}

/// Decide what happens to a request on a gated route
pub fn decide(route: Route, path: &str, session: SessionState) -> Decision {
    let redirect = |to: &str| Decision::Redirect {
        to: to.to_string(),
        clear_cookie: false,
    };
    let signed_out = |clear_cookie: bool| {
        if route.public {
            Decision::Anonymous { clear_cookie }
        } else {
            Decision::Redirect {
                to: login_url(path),
                clear_cookie,
            }
        }
    };

    match session {
        SessionState::Valid(account) => {
            let completed = OnboardingService::is_complete(&account);
            match route.class {
                RouteClass::AuthOnly => redirect(DASHBOARD_PATH),
                RouteClass::Onboarding if completed => redirect(DASHBOARD_PATH),
                RouteClass::Protected if !completed => redirect(ONBOARDING_PATH),
                _ => Decision::Allow(account),
            }
        }
        SessionState::Missing => signed_out(false),
        SessionState::Invalid => signed_out(true),
        SessionState::Unavailable => {
            if route.public {
                Decision::Anonymous { clear_cookie: true }
            } else {
                Decision::Redirect {
                    to: LOGIN_PATH.to_string(),
                    clear_cookie: true,
                }
            }
        }
    }
}

/// `/login`, carrying `path` as `returnUrl` unless it is the root
fn login_url(path: &str) -> String {
    if path == "/" {
        return LOGIN_PATH.to_string();
    }
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("returnUrl", path)
        .finish();
    format!("{LOGIN_PATH}?{query}")
}

/// Middleware gating every page and auth API request
///
/// Asset and non-auth API paths are forwarded untouched. Otherwise the
/// session cookie is resolved against the identity service and the request
/// is forwarded or redirected according to [`decide`]. Forwarded requests
/// of signed-in users carry [`USER_AUTHENTICATED_HEADER`],
/// [`USER_ID_HEADER`] and the [`Account`] as an extension.
///
/// # Usage
/// ```ignore
/// let app = Router::new()
///     .fallback(serve_page)
///     .layer(middleware::from_fn_with_state(state.clone(), gate_request));
/// ```
pub async fn gate_request(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    let route = Route::classify(&path);
    if route.bypasses_gate() {
        return next.run(request).await;
    }

    // Identity headers are only ever set here.
    request.headers_mut().remove(USER_AUTHENTICATED_HEADER);
    request.headers_mut().remove(USER_ID_HEADER);

    let session = match session_secret(&jar, &state.config.session.cookie_name) {
        None => SessionState::Missing,
        Some(secret) => match state.auth.resolve_session(&secret).await {
            Ok(Some(account)) => SessionState::Valid(account),
            Ok(None) => SessionState::Invalid,
            Err(error) => {
                tracing::error!(%error, path = %path, "Session check failed");
                SessionState::Unavailable
            }
        },
    };

    let decision = decide(route, &path, session);
    GATE_DECISIONS_TOTAL
        .with_label_values(&[decision.label()])
        .inc();
    tracing::debug!(path = %path, decision = decision.label(), "Gate decision");

    match decision {
        Decision::Allow(account) => {
            let headers = request.headers_mut();
            headers.insert(USER_AUTHENTICATED_HEADER, HeaderValue::from_static("true"));
            match HeaderValue::from_str(&account.id) {
                Ok(value) => {
                    headers.insert(USER_ID_HEADER, value);
                }
                Err(error) => tracing::warn!(%error, "Account id is not a valid header value"),
            }
            request.extensions_mut().insert(account);
            next.run(request).await
        }
        Decision::Anonymous { clear_cookie } => {
            let response = next.run(request).await;
            // A handler that just signed the user in owns the cookie.
            if clear_cookie && !sets_cookie(&response, &state.config.session.cookie_name) {
                (jar.add(expired_session_cookie(&state.config)), response).into_response()
            } else {
                response
            }
        }
        Decision::Redirect { to, clear_cookie } => {
            let redirect = Redirect::temporary(&to);
            if clear_cookie {
                (jar.add(expired_session_cookie(&state.config)), redirect).into_response()
            } else {
                redirect.into_response()
            }
        }
    }
}

/// Whether `response` already carries a `Set-Cookie` for `name`
fn sets_cookie(response: &Response, name: &str) -> bool {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|line| line.split_once('='))
        .any(|(cookie, _)| cookie.trim() == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Prefs;

    fn account(onboarded: bool) -> Account {
        let mut prefs = Prefs::new();
        if onboarded {
            prefs.insert("onboardingCompleted", "true");
        }
        Account {
            id: "user-1".to_string(),
            name: "traveler".to_string(),
            email: "traveler@example.com".to_string(),
            email_verification: false,
            registration: String::new(),
            status: true,
            prefs,
        }
    }

    fn gate(path: &str, session: SessionState) -> Decision {
        decide(Route::classify(path), path, session)
    }

    fn redirect(to: &str, clear_cookie: bool) -> Decision {
        Decision::Redirect {
            to: to.to_string(),
            clear_cookie,
        }
    }

    #[test]
    fn signed_out_protected_redirects_with_return_url() {
        assert_eq!(
            gate("/dashboard", SessionState::Missing),
            redirect("/login?returnUrl=%2Fdashboard", false)
        );
        assert_eq!(
            gate("/trips/42", SessionState::Missing),
            redirect("/login?returnUrl=%2Ftrips%2F42", false)
        );
    }

    #[test]
    fn signed_out_public_passes() {
        for path in ["/", "/login", "/signup", "/api/auth/login"] {
            assert_eq!(
                gate(path, SessionState::Missing),
                Decision::Anonymous {
                    clear_cookie: false
                }
            );
        }
    }

    #[test]
    fn invalid_session_clears_cookie() {
        assert_eq!(
            gate("/login", SessionState::Invalid),
            Decision::Anonymous { clear_cookie: true }
        );
        assert_eq!(
            gate("/dashboard", SessionState::Invalid),
            redirect("/login?returnUrl=%2Fdashboard", true)
        );
    }

    #[test]
    fn signed_in_auth_pages_go_to_dashboard() {
        for path in ["/login", "/signup", "/forgot-password"] {
            assert_eq!(
                gate(path, SessionState::Valid(account(false))),
                redirect("/dashboard", false)
            );
        }
    }

    #[test]
    fn onboarding_gate() {
        assert_eq!(
            gate("/dashboard", SessionState::Valid(account(false))),
            redirect("/onboarding", false)
        );
        assert_eq!(
            gate("/", SessionState::Valid(account(false))),
            redirect("/onboarding", false)
        );
        assert_eq!(
            gate("/onboarding", SessionState::Valid(account(false))),
            Decision::Allow(account(false))
        );
        assert_eq!(
            gate("/onboarding", SessionState::Valid(account(true))),
            redirect("/dashboard", false)
        );
        assert_eq!(
            gate("/api/auth/logout", SessionState::Valid(account(false))),
            Decision::Allow(account(false))
        );
        assert_eq!(
            gate("/dashboard", SessionState::Valid(account(true))),
            Decision::Allow(account(true))
        );
    }

    #[test]
    fn unavailable_identity_fails_closed_except_public() {
        assert_eq!(
            gate("/dashboard", SessionState::Unavailable),
            redirect("/login", true)
        );
        assert_eq!(
            gate("/", SessionState::Unavailable),
            Decision::Anonymous { clear_cookie: true }
        );
    }

    #[test]
    fn detects_handler_set_session_cookie() {
        let response = Response::builder()
            .header(SET_COOKIE, "user-last-login=2025; Path=/")
            .header(SET_COOKIE, "user-session=fresh; HttpOnly; Path=/")
            .body(axum::body::Body::empty())
            .unwrap();
        assert!(sets_cookie(&response, "user-session"));
        assert!(!sets_cookie(&response, "user-sessions"));

        let response = Response::new(axum::body::Body::empty());
        assert!(!sets_cookie(&response, "user-session"));
    }

    #[test]
    fn decision_labels() {
        assert_eq!(redirect("/dashboard", false).label(), "redirect_dashboard");
        assert_eq!(redirect("/login?returnUrl=%2Fx", false).label(), "redirect_login");
        assert_eq!(Decision::Allow(account(true)).label(), "allow");
    }
}
