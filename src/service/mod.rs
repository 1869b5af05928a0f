//! Service layer
//!
//! Business logic between HTTP handlers and the identity service.
//! Every operation validates its input before the first backend call.

mod auth;
mod itinerary;
mod onboarding;
mod user;
pub mod validation;

pub use auth::{AuthService, LoginForm, SignUpForm};
pub use itinerary::{
    BudgetBreakdown, Itinerary, ItineraryDay, ItineraryPreview, ItineraryService, JourneyPath,
    Recommendations, SavedItinerary, TimeBlock, TotalBudget, TripMetadata,
};
pub use onboarding::{
    OnboardingForm, OnboardingPreferences, OnboardingService, StoredPreferences, TripPace,
};
pub use user::{
    AVATAR_MAX_BYTES, AVATAR_TOO_LARGE, DeleteAccountForm, EmailForm, PasswordForm,
    PreferencesForm, ProfileForm, UserService,
};

use crate::error::AppError;
use crate::identity::IdentityError;

/// Map an identity failure to a user-facing message, logging the detail
fn reject(operation: &'static str, message: &'static str) -> impl FnOnce(IdentityError) -> AppError {
    move |error| {
        tracing::warn!(operation, %error, "Identity service rejected request");
        AppError::Rejected(message.to_string())
    }
}

/// Like [`reject`], but an expired or missing session stays a 401
fn reject_or_unauthorized(
    operation: &'static str,
    message: &'static str,
) -> impl FnOnce(IdentityError) -> AppError {
    move |error| {
        if error.is_unauthenticated() {
            tracing::debug!(operation, %error, "Session not accepted by identity service");
            return AppError::Unauthorized;
        }
        reject(operation, message)(error)
    }
}
