//! Account settings endpoints

use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use axum_extra::extract::CookieJar;

use super::ActionResult;
use crate::AppState;
use crate::auth::{MaybeSession, SessionSecret, expired_session_cookie};
use crate::error::AppError;
use crate::identity::{Account, FileUpload};
use crate::service::{
    AVATAR_MAX_BYTES, AVATAR_TOO_LARGE, DeleteAccountForm, EmailForm, PasswordForm,
    PreferencesForm, ProfileForm,
};

/// Multipart framing on top of the largest accepted avatar
const AVATAR_BODY_LIMIT: usize = 2 * AVATAR_MAX_BYTES;

/// Create user router
///
/// Routes:
/// - GET / - Current account, or null
/// - POST /profile
/// - POST /preferences
/// - POST /email
/// - POST /password
/// - POST /delete - Delete the account and sign out
/// - POST /avatar - Multipart upload, field `avatar`
pub fn user_router() -> Router<AppState> {
    Router::new()
        .route("/", get(current_user))
        .route("/profile", post(update_profile))
        .route("/preferences", post(update_preferences))
        .route("/email", post(update_email))
        .route("/password", post(update_password))
        .route("/delete", post(delete_account))
        .route(
            "/avatar",
            post(upload_avatar).layer(DefaultBodyLimit::max(AVATAR_BODY_LIMIT)),
        )
}

/// GET /api/user
async fn current_user(
    State(state): State<AppState>,
    MaybeSession(session): MaybeSession,
) -> Json<Option<Account>> {
    Json(state.users.get_current_user(session.as_deref()).await)
}

/// POST /api/user/profile
async fn update_profile(
    State(state): State<AppState>,
    SessionSecret(session): SessionSecret,
    Json(form): Json<ProfileForm>,
) -> Result<Json<ActionResult>, AppError> {
    state.users.update_profile(&session, form).await?;
    Ok(Json(ActionResult::ok()))
}

/// POST /api/user/preferences
async fn update_preferences(
    State(state): State<AppState>,
    SessionSecret(session): SessionSecret,
    Json(form): Json<PreferencesForm>,
) -> Result<Json<ActionResult>, AppError> {
    state.users.update_preferences(&session, form).await?;
    Ok(Json(ActionResult::ok()))
}

/// POST /api/user/email
async fn update_email(
    State(state): State<AppState>,
    SessionSecret(session): SessionSecret,
    Json(form): Json<EmailForm>,
) -> Result<Json<ActionResult>, AppError> {
    state.users.update_email(&session, form).await?;
    Ok(Json(ActionResult::ok()))
}

/// POST /api/user/password
async fn update_password(
    State(state): State<AppState>,
    SessionSecret(session): SessionSecret,
    Json(form): Json<PasswordForm>,
) -> Result<Json<ActionResult>, AppError> {
    state.users.update_password(&session, form).await?;
    Ok(Json(ActionResult::ok()))
}

/// POST /api/user/delete
async fn delete_account(
    State(state): State<AppState>,
    jar: CookieJar,
    SessionSecret(session): SessionSecret,
    Json(form): Json<DeleteAccountForm>,
) -> Result<(CookieJar, Json<ActionResult>), AppError> {
    state.users.delete_account(&session, form).await?;
    let jar = jar.add(expired_session_cookie(&state.config));
    Ok((jar, Json(ActionResult::ok())))
}

/// POST /api/user/avatar
async fn upload_avatar(
    State(state): State<AppState>,
    SessionSecret(session): SessionSecret,
    mut multipart: Multipart,
) -> Result<Json<ActionResult>, AppError> {
    let mut avatar: Option<FileUpload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, "Failed to parse multipart"))?
    {
        if field.name() != Some("avatar") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("avatar").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, "Failed to read file"))?;

        avatar = Some(FileUpload {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
    }

    let avatar_url = state.users.upload_avatar(&session, avatar).await?;
    Ok(Json(ActionResult::avatar(avatar_url)))
}

/// A body over the route limit is an oversized avatar, not a malformed form
fn multipart_error(error: MultipartError, context: &str) -> AppError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::Validation(AVATAR_TOO_LARGE.to_string());
    }
    AppError::BadRequest(format!("{}: {}", context, error))
}
