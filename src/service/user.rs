//! Account settings service
//!
//! Profile, settings prefs, credentials, account deletion and avatar upload
//! for the signed-in user.

use std::sync::Arc;

use serde::Deserialize;

use super::validation::{self, Checks};
use super::{reject, reject_or_unauthorized};
use crate::error::AppError;
use crate::identity::{Account, FileUpload, IdentityError, IdentityService, Prefs};

/// Largest accepted avatar, in bytes
pub const AVATAR_MAX_BYTES: usize = 2 * 1024 * 1024;
pub const AVATAR_TOO_LARGE: &str = "File size too large. Maximum size is 2MB.";

const AVATAR_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];
const THEMES: &[&str] = &["light", "dark", "system"];

/// Profile update; absent or blank fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileForm {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub location: Option<String>,
}

/// Settings update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreferencesForm {
    pub theme: Option<String>,
    pub email_notifications: Option<bool>,
    pub marketing_emails: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmailForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PasswordForm {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeleteAccountForm {
    pub password: String,
}

/// User settings service
pub struct UserService {
    identity: Arc<dyn IdentityService>,
    avatar_bucket_id: String,
}

impl UserService {
    /// Create new user service storing avatars in `avatar_bucket_id`
    pub fn new(identity: Arc<dyn IdentityService>, avatar_bucket_id: impl Into<String>) -> Self {
        Self {
            identity,
            avatar_bucket_id: avatar_bucket_id.into(),
        }
    }

    /// Account for the session, `None` on any failure
    pub async fn get_current_user(&self, session: Option<&str>) -> Option<Account> {
        match self.identity.get_account(session?).await {
            Ok(account) => Some(account),
            Err(error) => {
                tracing::debug!(%error, "Failed to get current user");
                None
            }
        }
    }

    /// Update display name and profile prefs
    pub async fn update_profile(&self, session: &str, form: ProfileForm) -> Result<(), AppError> {
        let name = validation::non_blank(form.name.map(|n| n.trim().to_string()));
        let bio = validation::non_blank(form.bio);
        let website = validation::non_blank(form.website.map(|w| w.trim().to_string()));
        let location = validation::non_blank(form.location);

        Checks::new()
            .check(
                name.as_deref().is_none_or(|n| validation::char_len(n) >= 2),
                "Name must be at least 2 characters",
            )
            .check(
                bio.as_deref().is_none_or(|b| validation::char_len(b) <= 500),
                "Bio must be less than 500 characters",
            )
            .check(
                website.as_deref().is_none_or(validation::is_url),
                "Please enter a valid URL",
            )
            .check(
                location.as_deref().is_none_or(|l| validation::char_len(l) <= 100),
                "Location must be less than 100 characters",
            )
            .finish()?;

        const FAILED: &str = "Failed to update profile. Please try again.";

        if let Some(name) = &name {
            self.identity
                .update_name(session, name)
                .await
                .map_err(reject_or_unauthorized("update_profile", FAILED))?;
        }

        let mut update = Prefs::new();
        for (key, value) in [("bio", bio), ("website", website), ("location", location)] {
            if let Some(value) = value {
                update.insert(key, value);
            }
        }
        self.merge_prefs(session, update, "update_profile", FAILED)
            .await?;

        tracing::info!("Profile updated");
        Ok(())
    }

    /// Update theme and notification settings
    pub async fn update_preferences(
        &self,
        session: &str,
        form: PreferencesForm,
    ) -> Result<(), AppError> {
        let theme = validation::non_blank(form.theme);
        Checks::new()
            .check(
                theme.as_deref().is_none_or(|t| THEMES.contains(&t)),
                "Theme must be light, dark, or system",
            )
            .finish()?;

        let mut update = Prefs::new();
        if let Some(theme) = theme {
            update.insert("theme", theme);
        }
        if let Some(enabled) = form.email_notifications {
            update.insert("emailNotifications", enabled);
        }
        if let Some(enabled) = form.marketing_emails {
            update.insert("marketingEmails", enabled);
        }

        self.merge_prefs(
            session,
            update,
            "update_preferences",
            "Failed to update preferences. Please try again.",
        )
        .await
    }

    /// Change the account email, confirmed with the current password
    pub async fn update_email(&self, session: &str, form: EmailForm) -> Result<(), AppError> {
        let email = validation::normalize_email(&form.email);
        Checks::new()
            .check(validation::is_email(&email), "Please enter a valid email address")
            .check(
                validation::char_len(&form.password) >= 8,
                "Password must be at least 8 characters",
            )
            .finish()?;

        self.identity
            .update_email(session, &email, &form.password)
            .await
            .map_err(|error| {
                let message = if error.is_invalid_credentials() {
                    "Incorrect password provided. Please try again."
                } else if error.is_already_exists() {
                    "This email is already in use. Please use a different email."
                } else {
                    return reject_or_unauthorized(
                        "update_email",
                        "Failed to update email. Please try again.",
                    )(error);
                };
                tracing::warn!(%error, "Email update rejected");
                AppError::Rejected(message.to_string())
            })?;

        tracing::info!("Email updated");
        Ok(())
    }

    /// Change the password, confirmed with the current one
    pub async fn update_password(&self, session: &str, form: PasswordForm) -> Result<(), AppError> {
        let new = form.new_password.as_str();
        Checks::new()
            .check(
                validation::char_len(&form.current_password) >= 8,
                "Current password must be at least 8 characters",
            )
            .check(
                validation::char_len(new) >= 8,
                "New password must be at least 8 characters",
            )
            .check(
                validation::has_lowercase(new),
                "Password must contain at least one lowercase letter",
            )
            .check(
                validation::has_uppercase(new),
                "Password must contain at least one uppercase letter",
            )
            .check(
                validation::has_digit(new),
                "Password must contain at least one number",
            )
            .check(
                validation::char_len(&form.confirm_password) >= 8,
                "Password confirmation must be at least 8 characters",
            )
            .check(new == form.confirm_password, "Passwords don't match")
            .finish()?;

        self.identity
            .update_password(session, new, &form.current_password)
            .await
            .map_err(|error| {
                if error.is_invalid_credentials() {
                    tracing::warn!(%error, "Password update rejected");
                    return AppError::Rejected(
                        "Incorrect current password. Please try again.".to_string(),
                    );
                }
                reject_or_unauthorized(
                    "update_password",
                    "Failed to update password. Please try again.",
                )(error)
            })?;

        tracing::info!("Password updated");
        Ok(())
    }

    /// Delete the account after re-checking the password
    ///
    /// The password is verified by opening a fresh session for the
    /// account's email; deletion itself runs with the server API key.
    pub async fn delete_account(
        &self,
        session: &str,
        form: DeleteAccountForm,
    ) -> Result<(), AppError> {
        Checks::new()
            .check(
                validation::char_len(&form.password) >= 8,
                "Valid password is required to delete your account",
            )
            .finish()?;

        let account = self
            .identity
            .get_account(session)
            .await
            .map_err(reject("delete_account", "Failed to authenticate user"))?;

        let verification = self
            .identity
            .create_email_password_session(&account.email, &form.password)
            .await
            .map_err(|error| deletion_error(error, true))?;

        if let Err(error) = self.identity.delete_user(&account.id).await {
            // The account survives, so its verification session must not.
            if let Err(cleanup) = self
                .identity
                .delete_session(&verification.secret, &verification.id)
                .await
            {
                tracing::warn!(error = %cleanup, "Failed to drop verification session");
            }
            return Err(deletion_error(error, false));
        }

        tracing::info!(user_id = %account.id, "Account deleted");
        Ok(())
    }

    /// Store a new avatar and record its URL in prefs
    ///
    /// # Returns
    /// The public view URL of the uploaded image
    pub async fn upload_avatar(
        &self,
        session: &str,
        file: Option<FileUpload>,
    ) -> Result<String, AppError> {
        let Some(file) = file.filter(|f| !f.bytes.is_empty()) else {
            return Err(AppError::Validation("No avatar file provided".to_string()));
        };

        Checks::new()
            .check(
                AVATAR_TYPES.contains(&file.content_type.as_str()),
                "File type not supported. Please upload a JPEG, PNG, GIF, or WebP image.",
            )
            .check(
                file.bytes.len() <= AVATAR_MAX_BYTES,
                AVATAR_TOO_LARGE,
            )
            .finish()?;

        const FAILED: &str = "Failed to upload avatar. Please try again.";

        // Authenticate before storing anything with the server key.
        let mut prefs = self
            .identity
            .get_prefs(session)
            .await
            .map_err(reject_or_unauthorized("upload_avatar", FAILED))?;

        let file_id = ulid::Ulid::new().to_string();
        let stored = self
            .identity
            .upload_file(&self.avatar_bucket_id, &file_id, file)
            .await
            .map_err(reject("upload_avatar", FAILED))?;

        let avatar_url = self
            .identity
            .file_view_url(&self.avatar_bucket_id, &stored.id);
        prefs.insert("avatarUrl", avatar_url.clone());

        self.identity
            .update_prefs(session, &prefs)
            .await
            .map_err(reject_or_unauthorized("upload_avatar", FAILED))?;

        tracing::info!(file_id = %stored.id, size = stored.size, "Avatar uploaded");
        Ok(avatar_url)
    }

    /// Read prefs, overlay `update`, write back
    async fn merge_prefs(
        &self,
        session: &str,
        update: Prefs,
        operation: &'static str,
        message: &'static str,
    ) -> Result<(), AppError> {
        let mut prefs = self
            .identity
            .get_prefs(session)
            .await
            .map_err(reject_or_unauthorized(operation, message))?;
        prefs.merge(update);

        self.identity
            .update_prefs(session, &prefs)
            .await
            .map_err(reject_or_unauthorized(operation, message))?;
        Ok(())
    }
}

fn deletion_error(error: IdentityError, verifying_password: bool) -> AppError {
    tracing::warn!(%error, "Account deletion failed");
    let message = if verifying_password && error.is_invalid_credentials() {
        "Incorrect password. Please try again."
    } else {
        "Failed to delete account. Please try again."
    };
    AppError::Rejected(message.to_string())
}
