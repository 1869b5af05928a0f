//! API layer
//!
//! HTTP handlers for:
//! - Authentication (`/api/auth`)
//! - Onboarding (`/api/onboarding`)
//! - Account settings (`/api/user`)
//! - Saved itineraries (`/api/itineraries`)
//! - Front-end pages (fallback)
//! - Metrics (Prometheus)

mod auth;
mod itineraries;
pub mod metrics;
mod onboarding;
mod pages;
mod user;

use serde::Serialize;

pub use auth::auth_router;
pub use itineraries::itineraries_router;
pub use metrics::metrics_router;
pub use onboarding::onboarding_router;
pub use pages::serve_page;
pub use user::user_router;

/// Uniform result of a form action
///
/// Failures are rendered by [`AppError`](crate::error::AppError) with the
/// same shape.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl ActionResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn redirect(url: String) -> Self {
        Self {
            redirect_url: Some(url),
            ..Self::ok()
        }
    }

    pub fn avatar(url: String) -> Self {
        Self {
            avatar_url: Some(url),
            ..Self::ok()
        }
    }
}
