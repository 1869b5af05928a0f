//! Route classification
//!
//! A pure function of the path and the constant tables below.

/// Static asset prefixes that never reach the gate logic
const PUBLIC_ASSET_PREFIXES: &[&str] = &[
    "/_next/static",
    "/_next/image",
    "/favicon.ico",
    "/_vercel",
    "/images",
    "/assets",
    "/fonts",
    "/videos",
];

/// Reachable without a session
const PUBLIC_ROUTES: &[&str] = &[
    "/",
    "/login",
    "/signup",
    "/forgot-password",
    "/api/auth/signup",
    "/api/auth/login",
    "/api/auth/session",
    "/api/auth/oauth",
    "/api/auth/callback",
    "/api/auth/cookies",
];

/// Pointless once signed in; redirected to the dashboard
const AUTH_ROUTES: &[&str] = &["/login", "/signup", "/forgot-password"];

const ONBOARDING_ROUTE: &str = "/onboarding";

/// Reachable by signed-in users who have not finished onboarding
const ONBOARDING_EXEMPT: &[&str] = &[ONBOARDING_ROUTE, "/api/auth", "/logout"];

const API_PREFIX: &str = "/api/";
const AUTH_API_PREFIX: &str = "/api/auth/";

/// What the gate does with a path for a signed-in user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Static asset, forwarded untouched
    PublicAsset,
    /// API outside `/api/auth/`, forwarded untouched
    Api,
    /// Login/signup pages
    AuthOnly,
    /// The onboarding page itself
    Onboarding,
    /// Allowed before onboarding is complete
    OnboardingExempt,
    /// Requires completed onboarding
    Protected,
}

/// Classified request path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub class: RouteClass,
    /// Reachable without a session
    pub public: bool,
}

impl Route {
    pub fn classify(path: &str) -> Self {
        let class = if PUBLIC_ASSET_PREFIXES.iter().any(|p| matches_prefix(path, p)) {
            RouteClass::PublicAsset
        } else if path.starts_with(API_PREFIX) && !path.starts_with(AUTH_API_PREFIX) {
            RouteClass::Api
        } else if AUTH_ROUTES.iter().any(|p| matches_prefix(path, p)) {
            RouteClass::AuthOnly
        } else if path == ONBOARDING_ROUTE {
            RouteClass::Onboarding
        } else if ONBOARDING_EXEMPT.iter().any(|p| matches_prefix(path, p)) {
            RouteClass::OnboardingExempt
        } else {
            RouteClass::Protected
        };

        Self {
            class,
            public: PUBLIC_ROUTES.iter().any(|p| matches_prefix(path, p)),
        }
    }

    /// Whether the request skips session handling entirely
    pub fn bypasses_gate(&self) -> bool {
        matches!(self.class, RouteClass::PublicAsset | RouteClass::Api)
    }
}

/// `path` is `prefix` or lies below it
fn matches_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
