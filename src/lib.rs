//! Aventra - authentication and onboarding gateway for the Aventra travel planner
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Request Gate                            │
//! │  - Route classification                                     │
//! │  - Session resolution, login/onboarding redirects           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - /api/auth, /api/onboarding, /api/user, /api/itineraries  │
//! │  - Front-end pages                                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Form validation                                          │
//! │  - Auth, onboarding, account settings, saved itineraries    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Identity Service (REST)                    │
//! │  - Accounts, sessions, prefs, storage, documents            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `gate`: Per-request session and onboarding gating
//! - `api`: HTTP handlers
//! - `service`: Business logic layer
//! - `identity`: Identity service client
//! - `auth`: Session cookie and extractors
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod gate;
pub mod identity;
pub mod metrics;
pub mod service;

use std::sync::Arc;

use identity::IdentityService;
use service::{AuthService, ItineraryService, OnboardingService, UserService};

/// Application state shared across all handlers
///
/// Cloned for each request; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    pub auth: Arc<AuthService>,
    pub onboarding: Arc<OnboardingService>,
    pub users: Arc<UserService>,
    pub itineraries: Arc<ItineraryService>,
}

impl AppState {
    /// Initialize application state against the configured identity service
    ///
    /// # Errors
    /// Returns error if the identity client cannot be built
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let identity = identity::AppwriteClient::new(&config.identity)?;
        tracing::info!(endpoint = %config.identity.endpoint, "Identity client initialized");

        Ok(Self::with_identity(config, Arc::new(identity)))
    }

    /// Build state around an existing identity service
    pub fn with_identity(config: config::AppConfig, identity: Arc<dyn IdentityService>) -> Self {
        let avatar_bucket_id = config.identity.avatar_bucket_id.clone();
        let store = config.itineraries.clone();

        Self {
            config: Arc::new(config),
            auth: Arc::new(AuthService::new(identity.clone())),
            onboarding: Arc::new(OnboardingService::new(identity.clone())),
            users: Arc::new(UserService::new(identity.clone(), avatar_bucket_id)),
            itineraries: Arc::new(ItineraryService::new(identity, store)),
        }
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, middleware};
    use tower_http::{compression::CompressionLayer, trace::TraceLayer};

    let cors_layer = build_cors_layer(&state.config.server);

    Router::new()
        .nest("/api/auth", api::auth_router())
        .nest("/api/onboarding", api::onboarding_router())
        .nest("/api/user", api::user_router())
        .nest("/api/itineraries", api::itineraries_router())
        .fallback(api::serve_page)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            gate::gate_request,
        ))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
        .route("/health", axum::routing::get(health_check))
        .merge(api::metrics_router())
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::{HeaderValue, Method, header};
    use tower_http::cors::CorsLayer;

    let origins: Vec<HeaderValue> = server
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::error!(%error, origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return CorsLayer::new();
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

async fn health_check() -> &'static str {
    "OK"
}
