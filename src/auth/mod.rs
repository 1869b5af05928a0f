//! Session cookie handling
//!
//! Handles:
//! - Building and clearing the session cookie
//! - Extracting the session secret in handlers

mod cookie;
mod extract;

pub use cookie::{
    CookieOptions, LAST_LOGIN_COOKIE, build_cookie, expired_session_cookie, session_cookie,
    session_secret,
};
pub use extract::{MaybeSession, SessionSecret};
