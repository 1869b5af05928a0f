//! Identity service integration
//!
//! Accounts, sessions, OAuth tokens, per-account prefs, file storage and
//! the itinerary database all live in an external Appwrite-compatible
//! backend. Everything in the crate
//! talks to it through the [`IdentityService`] trait so handlers and tests
//! never depend on the HTTP client directly.

mod appwrite;

pub use appwrite::AppwriteClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use thiserror::Error;

/// Session id accepted by the backend for "the session making this call"
pub const CURRENT_SESSION: &str = "current";

/// Account record held by the identity service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub email: String,
    #[serde(rename = "emailVerification", default)]
    pub email_verification: bool,
    #[serde(default)]
    pub registration: String,
    #[serde(default = "default_status")]
    pub status: bool,
    #[serde(default)]
    pub prefs: Prefs,
}

fn default_status() -> bool {
    true
}

/// Session issued by the identity service
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IdentitySession {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Only populated when the session was created with a server key
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub expire: String,
}

/// Per-account key/value store
///
/// Onboarding values are stored as strings (lists JSON-encoded), profile
/// settings may be strings or booleans.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Prefs(pub Map<String, Value>);

impl Prefs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value for `key`, `None` if absent or not a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Overlay every entry of `other` onto `self`
    pub fn merge(&mut self, other: Prefs) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// File stored in an identity-service bucket
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StoredFile {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
    #[serde(rename = "sizeOriginal", default)]
    pub size: u64,
}

/// File content handed to [`IdentityService::upload_file`]
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Document stored in a database collection
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Document {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "$createdAt", default)]
    pub created_at: String,
    /// Attributes, plus the system fields not named above
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Document {
    /// Decode the attributes into a typed row
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, IdentityError> {
        serde_json::from_value(Value::Object(self.data.clone())).map_err(|e| {
            IdentityError::UnexpectedResponse(format!("document {}: {e}", self.id))
        })
    }
}

/// Filter, ordering or paging for [`IdentityService::list_documents`]
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Equal(&'static str, String),
    OrderAsc(&'static str),
    OrderDesc(&'static str),
    Limit(u32),
}

impl Query {
    /// JSON form sent as a `queries[]` parameter
    pub fn to_json(&self) -> String {
        let query = match self {
            Query::Equal(attribute, value) => serde_json::json!({
                "method": "equal",
                "attribute": attribute,
                "values": [value],
            }),
            Query::OrderAsc(attribute) => serde_json::json!({
                "method": "orderAsc",
                "attribute": attribute,
            }),
            Query::OrderDesc(attribute) => serde_json::json!({
                "method": "orderDesc",
                "attribute": attribute,
            }),
            Query::Limit(limit) => serde_json::json!({
                "method": "limit",
                "values": [limit],
            }),
        };
        query.to_string()
    }
}

/// Supported OAuth providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
    Github,
}

impl OAuthProvider {
    /// Provider id in identity-service URLs
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::Github => "github",
        }
    }

    /// Name shown to users
    pub fn display_name(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "Google",
            OAuthProvider::Github => "GitHub",
        }
    }
}

impl std::str::FromStr for OAuthProvider {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "google" => Ok(OAuthProvider::Google),
            "github" => Ok(OAuthProvider::Github),
            other => Err(format!("unsupported OAuth provider: {other}")),
        }
    }
}

/// Error returned by the identity service or while talking to it
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The service answered with an error document
    #[error("{message} (type: {kind}, status: {status})")]
    Api {
        status: u16,
        kind: String,
        message: String,
    },

    /// The service could not be reached or the connection failed
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with something we could not interpret
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl IdentityError {
    /// Whether the failure is a uniqueness conflict (account or email taken)
    pub fn is_already_exists(&self) -> bool {
        match self {
            IdentityError::Api {
                status,
                kind,
                message,
            } => {
                if !kind.is_empty() {
                    return kind.ends_with("_already_exists");
                }
                *status == 409 || message.contains("already exists")
            }
            _ => false,
        }
    }

    /// Whether the failure is a wrong password / unknown user
    pub fn is_invalid_credentials(&self) -> bool {
        match self {
            IdentityError::Api { kind, message, .. } => {
                if !kind.is_empty() {
                    return kind == "user_invalid_credentials"
                        || kind == "user_password_mismatch";
                }
                message.contains("Invalid credentials")
            }
            _ => false,
        }
    }

    /// Whether the failure means the caller simply is not authenticated
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, IdentityError::Api { status: 401 | 403 | 404, .. })
    }

    /// Whether the failure says nothing about the caller, only the service
    pub fn is_unavailable(&self) -> bool {
        match self {
            IdentityError::Api { status, .. } => *status >= 500 || *status == 429,
            IdentityError::Transport(_) | IdentityError::UnexpectedResponse(_) => true,
        }
    }
}

/// Operations the gateway needs from the identity service
///
/// Calls taking a `session` run with the user's session secret; the rest
/// run with the server API key.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Create an account
    async fn create_account(
        &self,
        user_id: &str,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<Account, IdentityError>;

    /// Open a session from email and password
    async fn create_email_password_session(
        &self,
        email: &str,
        password: &str,
    ) -> Result<IdentitySession, IdentityError>;

    /// Exchange a one-time token (OAuth callback) for a session
    async fn create_session(
        &self,
        user_id: &str,
        secret: &str,
    ) -> Result<IdentitySession, IdentityError>;

    /// Get the provider authorization URL for an OAuth token flow
    async fn create_oauth2_token(
        &self,
        provider: OAuthProvider,
        success_url: &str,
        failure_url: &str,
    ) -> Result<String, IdentityError>;

    /// Account owning `session`
    async fn get_account(&self, session: &str) -> Result<Account, IdentityError>;

    /// Delete a session (`CURRENT_SESSION` for the caller's own)
    async fn delete_session(&self, session: &str, session_id: &str) -> Result<(), IdentityError>;

    async fn get_prefs(&self, session: &str) -> Result<Prefs, IdentityError>;

    /// Replace the account prefs
    async fn update_prefs(&self, session: &str, prefs: &Prefs) -> Result<Account, IdentityError>;

    async fn update_name(&self, session: &str, name: &str) -> Result<Account, IdentityError>;

    async fn update_email(
        &self,
        session: &str,
        email: &str,
        password: &str,
    ) -> Result<Account, IdentityError>;

    async fn update_password(
        &self,
        session: &str,
        password: &str,
        old_password: &str,
    ) -> Result<Account, IdentityError>;

    /// Remove an account by id (users-admin capability)
    async fn delete_user(&self, user_id: &str) -> Result<(), IdentityError>;

    /// Store a file in a bucket
    async fn upload_file(
        &self,
        bucket_id: &str,
        file_id: &str,
        file: FileUpload,
    ) -> Result<StoredFile, IdentityError>;

    /// Public view URL of a stored file
    fn file_view_url(&self, bucket_id: &str, file_id: &str) -> String;

    async fn create_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: Value,
    ) -> Result<Document, IdentityError>;

    async fn list_documents(
        &self,
        database_id: &str,
        collection_id: &str,
        queries: &[Query],
    ) -> Result<Vec<Document>, IdentityError>;

    async fn delete_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<(), IdentityError>;
}
