//! Onboarding endpoints

use axum::{
    Router,
    extract::State,
    response::Json,
    routing::{get, post},
};
use serde::Serialize;

use super::ActionResult;
use crate::AppState;
use crate::auth::{MaybeSession, SessionSecret};
use crate::error::AppError;
use crate::service::{OnboardingForm, StoredPreferences};

/// Create onboarding router
///
/// Routes:
/// - GET /status - Whether onboarding is complete
/// - POST /complete - Save preferences and finish onboarding
/// - POST /skip - Finish onboarding with defaults
/// - GET /preferences - Saved preferences, or null
pub fn onboarding_router() -> Router<AppState> {
    Router::new()
        .route("/status", get(status))
        .route("/complete", post(complete))
        .route("/skip", post(skip))
        .route("/preferences", get(preferences))
}

#[derive(Debug, Serialize)]
struct OnboardingStatus {
    completed: bool,
}

/// GET /api/onboarding/status
async fn status(
    State(state): State<AppState>,
    MaybeSession(session): MaybeSession,
) -> Json<OnboardingStatus> {
    Json(OnboardingStatus {
        completed: state
            .onboarding
            .check_onboarding_status(session.as_deref())
            .await,
    })
}

/// POST /api/onboarding/complete
async fn complete(
    State(state): State<AppState>,
    SessionSecret(session): SessionSecret,
    Json(form): Json<OnboardingForm>,
) -> Result<Json<ActionResult>, AppError> {
    state.onboarding.complete_onboarding(&session, form).await?;
    Ok(Json(ActionResult::ok()))
}

/// POST /api/onboarding/skip
async fn skip(
    State(state): State<AppState>,
    SessionSecret(session): SessionSecret,
) -> Result<Json<ActionResult>, AppError> {
    state.onboarding.skip_onboarding(&session).await?;
    Ok(Json(ActionResult::ok()))
}

/// GET /api/onboarding/preferences
async fn preferences(
    State(state): State<AppState>,
    MaybeSession(session): MaybeSession,
) -> Json<Option<StoredPreferences>> {
    Json(state.onboarding.get_user_preferences(session.as_deref()).await)
}
