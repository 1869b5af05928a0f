//! Cookie construction
//!
//! The session cookie holds the identity service's session secret. It is
//! HttpOnly, SameSite=Strict, scoped to `/`, and Secure in production.

use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::{Duration, OffsetDateTime};

use crate::config::AppConfig;

/// Cookie recording the time of the last OAuth login
pub const LAST_LOGIN_COOKIE: &str = "user-last-login";

/// Attributes applied to a cookie
#[derive(Debug, Clone, PartialEq)]
pub struct CookieOptions {
    pub path: String,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
    /// `None` makes a browser-session cookie
    pub max_age: Option<Duration>,
}

impl CookieOptions {
    /// Defaults shared by every cookie the gateway writes
    pub fn strict(secure: bool) -> Self {
        Self {
            path: "/".to_string(),
            http_only: true,
            secure,
            same_site: SameSite::Strict,
            max_age: None,
        }
    }
}

/// Build a cookie from a name, value and options
pub fn build_cookie(name: String, value: String, options: &CookieOptions) -> Cookie<'static> {
    let mut builder = Cookie::build((name, value))
        .path(options.path.clone())
        .http_only(options.http_only)
        .secure(options.secure)
        .same_site(options.same_site);

    if let Some(max_age) = options.max_age {
        builder = builder.max_age(max_age);
        if max_age.is_zero() {
            builder = builder.expires(OffsetDateTime::UNIX_EPOCH);
        }
    }

    builder.build()
}

/// Session cookie carrying `secret`
pub fn session_cookie(config: &AppConfig, secret: String) -> Cookie<'static> {
    let options = CookieOptions {
        max_age: Some(Duration::seconds(config.session.max_age_seconds)),
        ..CookieOptions::strict(config.should_use_secure_cookies())
    };
    build_cookie(config.session.cookie_name.clone(), secret, &options)
}

/// Cookie that makes the browser drop the session cookie
pub fn expired_session_cookie(config: &AppConfig) -> Cookie<'static> {
    let options = CookieOptions {
        max_age: Some(Duration::ZERO),
        ..CookieOptions::strict(config.should_use_secure_cookies())
    };
    build_cookie(config.session.cookie_name.clone(), String::new(), &options)
}

/// Session secret from the request cookies, if present and non-empty
pub fn session_secret(jar: &CookieJar, cookie_name: &str) -> Option<String> {
    jar.get(cookie_name)
        .map(|cookie| cookie.value().to_owned())
        .filter(|value| !value.is_empty())
}
