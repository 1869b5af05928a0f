//! Authentication service
//!
//! Email/password sign-up and login, logout, OAuth token flow and session
//! verification against the identity service.

use std::sync::Arc;

use serde::Deserialize;

use super::validation::{self, Checks};
use super::reject;
use crate::error::AppError;
use crate::identity::{
    Account, CURRENT_SESSION, IdentityError, IdentityService, IdentitySession, OAuthProvider,
};

/// Sign-up form
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignUpForm {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Login form
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Authentication service
pub struct AuthService {
    identity: Arc<dyn IdentityService>,
}

impl AuthService {
    /// Create new authentication service
    pub fn new(identity: Arc<dyn IdentityService>) -> Self {
        Self { identity }
    }

    /// Create an account and open a session for it
    ///
    /// # Returns
    /// The new session; the caller stores its secret in the session cookie
    ///
    /// # Errors
    /// `Validation` with the first failing rule, `Rejected` when the
    /// identity service refuses the account or the session
    pub async fn sign_up(&self, form: SignUpForm) -> Result<IdentitySession, AppError> {
        let email = validation::normalize_email(&form.email);
        validate_sign_up(&form.username, &email, &form.password)?;

        let username = form.username.trim();
        let user_id = ulid::Ulid::new().to_string();

        self.identity
            .create_account(&user_id, &email, &form.password, username)
            .await
            .map_err(|error| {
                tracing::warn!(%error, "Sign up failed");
                let message = if error.is_already_exists() {
                    "An account with this email already exists."
                } else {
                    "Sign up failed. Please try again."
                };
                AppError::Rejected(message.to_string())
            })?;

        let session = self
            .identity
            .create_email_password_session(&email, &form.password)
            .await
            .map_err(reject("sign_up", "Sign up failed. Please try again."))?;

        tracing::info!(user_id = %session.user_id, "Account created");
        Ok(session)
    }

    /// Open a session from email and password
    ///
    /// Unknown email and wrong password are reported identically.
    pub async fn login(&self, form: LoginForm) -> Result<IdentitySession, AppError> {
        let email = validation::normalize_email(&form.email);
        validate_login(&email, &form.password)?;

        let session = self
            .identity
            .create_email_password_session(&email, &form.password)
            .await
            .map_err(reject(
                "login",
                "Invalid email or password. Please try again.",
            ))?;

        tracing::info!(user_id = %session.user_id, "User logged in");
        Ok(session)
    }

    /// Delete the caller's session on the identity service
    pub async fn logout(&self, session: &str) -> Result<(), AppError> {
        self.identity
            .delete_session(session, CURRENT_SESSION)
            .await
            .map_err(reject("logout", "Logout failed. Please try again."))
    }

    /// Provider authorization URL for the OAuth token flow
    ///
    /// Success and failure redirects are built from the request `Origin`:
    /// `<origin>/api/auth/oauth` and `<origin>/login`.
    pub async fn oauth_redirect_url(
        &self,
        provider: OAuthProvider,
        origin: Option<&str>,
    ) -> Result<String, AppError> {
        let failure = || {
            AppError::Rejected(format!(
                "{} login failed. Please try again.",
                provider.display_name()
            ))
        };

        let Some(origin) = origin
            .map(|value| value.trim().trim_end_matches('/'))
            .filter(|value| !value.is_empty() && *value != "null")
        else {
            tracing::warn!(provider = provider.as_str(), "Invalid request origin");
            return Err(failure());
        };

        let success_url = format!("{origin}/api/auth/oauth");
        let failure_url = format!("{origin}/login");

        self.identity
            .create_oauth2_token(provider, &success_url, &failure_url)
            .await
            .map_err(|error| {
                tracing::warn!(provider = provider.as_str(), %error, "OAuth login failed");
                failure()
            })
    }

    /// Exchange the OAuth callback token for a session
    pub async fn complete_oauth(
        &self,
        user_id: &str,
        secret: &str,
    ) -> Result<IdentitySession, AppError> {
        let session = self
            .identity
            .create_session(user_id, secret)
            .await
            .map_err(reject("complete_oauth", "Authentication failed"))?;

        tracing::info!(user_id = %session.user_id, "OAuth login completed");
        Ok(session)
    }

    /// Whether `session` belongs to a live account
    ///
    /// Never fails: any error, including a missing session, is `false`.
    pub async fn verify_session(&self, session: Option<&str>) -> bool {
        let Some(session) = session else {
            return false;
        };

        match self.identity.get_account(session).await {
            Ok(_) => true,
            Err(error) => {
                tracing::debug!(%error, "Session verification failed");
                false
            }
        }
    }

    /// Account owning `session`
    ///
    /// # Returns
    /// `Ok(None)` when the identity service does not accept the session
    ///
    /// # Errors
    /// Returns the identity error when the service itself is unavailable,
    /// so callers can tell "signed out" apart from "backend down"
    pub async fn resolve_session(&self, session: &str) -> Result<Option<Account>, IdentityError> {
        match self.identity.get_account(session).await {
            Ok(account) => Ok(Some(account)),
            Err(error) if error.is_unavailable() => Err(error),
            Err(error) => {
                tracing::debug!(%error, "Session rejected by identity service");
                Ok(None)
            }
        }
    }
}

fn validate_sign_up(username: &str, email: &str, password: &str) -> Result<(), AppError> {
    let username_len = validation::char_len(username);
    Checks::new()
        .check(username_len >= 1, "Username is required")
        .check(username_len >= 3, "Username must be at least 3 characters")
        .check(username_len <= 30, "Username cannot exceed 30 characters")
        .check(
            validation::is_username(username),
            "Username can only contain letters, numbers, underscores and hyphens",
        )
        .check(!email.is_empty(), "Email is required")
        .check(validation::is_email(email), "Invalid email address")
        .check(!password.is_empty(), "Password is required")
        .check(
            validation::char_len(password) >= 6,
            "Password must be at least 6 characters",
        )
        .check(
            validation::char_len(password) <= 100,
            "Password cannot exceed 100 characters",
        )
        .check(
            validation::has_uppercase(password),
            "Password should contain at least one uppercase letter",
        )
        .check(
            validation::has_digit(password),
            "Password should contain at least one number",
        )
        .finish()
}

fn validate_login(email: &str, password: &str) -> Result<(), AppError> {
    Checks::new()
        .check(!email.is_empty(), "Email is required")
        .check(validation::is_email(email), "Invalid email address")
        .check(!password.is_empty(), "Password is required")
        .check(
            validation::char_len(password) >= 6,
            "Password must be at least 6 characters",
        )
        .check(
            validation::char_len(password) <= 100,
            "Password cannot exceed 100 characters",
        )
        .finish()
}
