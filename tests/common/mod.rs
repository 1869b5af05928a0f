//! Common test utilities for E2E tests

#![allow(dead_code)]

pub mod fake_identity;

use aventra::{AppState, config};
use reqwest::header::{COOKIE, LOCATION, SET_COOKIE};
use tempfile::TempDir;
use tokio::net::TcpListener;

use fake_identity::FakeIdentity;

pub const PASSWORD: &str = "Passw0rd!";

/// Test server instance backed by a fake identity service
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub identity: FakeIdentity,
    pub _static_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        let identity = FakeIdentity::start().await;
        let static_dir = TempDir::new().unwrap();
        write_pages(&static_dir);

        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                static_dir: static_dir.path().to_path_buf(),
                allowed_origins: vec!["https://app.aventra.test".to_string()],
            },
            identity: config::IdentityConfig {
                endpoint: identity.endpoint.clone(),
                project_id: fake_identity::PROJECT_ID.to_string(),
                api_key: fake_identity::API_KEY.to_string(),
                avatar_bucket_id: "avatars".to_string(),
                timeout_seconds: 5,
            },
            session: config::SessionConfig {
                cookie_name: "user-session".to_string(),
                max_age_seconds: 604800,
            },
            environment: config::Environment::Development,
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
            itineraries: config::ItineraryStoreConfig {
                database_id: "trips".to_string(),
                itineraries_collection: "itineraries".to_string(),
                budgets_collection: "budget_breakdowns".to_string(),
                days_collection: "itinerary_days".to_string(),
                time_blocks_collection: "time_blocks".to_string(),
                recommendations_collection: "recommendations".to_string(),
                journey_paths_collection: "journey_paths".to_string(),
            },
        };

        let state = AppState::new(config).unwrap();

        // Redirects are asserted on, never followed
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = aventra::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            state,
            identity,
            _static_dir: static_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// GET with an optional session cookie
    pub async fn get(&self, path: &str, session: Option<&str>) -> reqwest::Response {
        let mut request = self.client.get(self.url(path));
        if let Some(session) = session {
            request = request.header(COOKIE, format!("user-session={}", session));
        }
        request.send().await.unwrap()
    }

    /// POST a JSON body with an optional session cookie
    pub async fn post_json(
        &self,
        path: &str,
        session: Option<&str>,
        body: serde_json::Value,
    ) -> reqwest::Response {
        let mut request = self.client.post(self.url(path)).json(&body);
        if let Some(session) = session {
            request = request.header(COOKIE, format!("user-session={}", session));
        }
        request.send().await.unwrap()
    }

    /// DELETE with an optional session cookie
    pub async fn delete(&self, path: &str, session: Option<&str>) -> reqwest::Response {
        let mut request = self.client.delete(self.url(path));
        if let Some(session) = session {
            request = request.header(COOKIE, format!("user-session={}", session));
        }
        request.send().await.unwrap()
    }

    /// Create an account in the identity service and open a session for it
    ///
    /// Returns (user id, session secret).
    pub fn signed_in_user(&self, email: &str, onboarded: bool) -> (String, String) {
        let user_id = self
            .identity
            .add_user(email, PASSWORD, "traveler", onboarded);
        let secret = self.identity.open_session(&user_id);
        (user_id, secret)
    }
}

fn write_pages(dir: &TempDir) {
    let root = dir.path();
    for page in ["index", "login", "signup", "dashboard", "onboarding"] {
        std::fs::write(
            root.join(format!("{}.html", page)),
            format!("<html><body>{} page</body></html>", page),
        )
        .unwrap();
    }
    std::fs::create_dir_all(root.join("images")).unwrap();
    std::fs::write(root.join("images/logo.png"), [0x89, b'P', b'N', b'G']).unwrap();
}

/// `Location` header of a redirect
pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Full `Set-Cookie` line for `name`, if the response sets it
pub fn set_cookie(response: &reqwest::Response, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&prefix))
        .map(ToOwned::to_owned)
}

/// Every `Set-Cookie` line for `name`, in response order
pub fn set_cookies(response: &reqwest::Response, name: &str) -> Vec<String> {
    let prefix = format!("{}=", name);
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter(|v| v.starts_with(&prefix))
        .map(ToOwned::to_owned)
        .collect()
}

/// Value carried by the `Set-Cookie` line for `name`
pub fn cookie_value(response: &reqwest::Response, name: &str) -> Option<String> {
    let line = set_cookie(response, name)?;
    let pair = line.split(';').next()?;
    pair.split_once('=').map(|(_, value)| value.to_string())
}

/// Whether the response tells the browser to drop the session cookie
pub fn clears_session(response: &reqwest::Response) -> bool {
    set_cookie(response, "user-session")
        .is_some_and(|line| line.starts_with("user-session=;") && line.contains("Max-Age=0"))
}
