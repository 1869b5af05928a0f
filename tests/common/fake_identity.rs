//! In-process stand-in for the identity service REST API
//!
//! Implements the subset of the Appwrite account, users, storage and
//! database endpoints the gateway calls, with the same headers, error documents and
//! status codes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, RawQuery, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::net::TcpListener;

pub const PROJECT_ID: &str = "aventra-test";
pub const API_KEY: &str = "test-server-key";

#[derive(Debug, Clone)]
pub struct FakeUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub prefs: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct FakeFile {
    pub bucket_id: String,
    pub name: String,
    pub mime_type: String,
    pub size: usize,
}

#[derive(Debug, Clone)]
pub struct FakeDocument {
    pub database_id: String,
    pub collection_id: String,
    pub id: String,
    pub created_at: String,
    pub data: Map<String, Value>,
}

impl FakeDocument {
    fn to_json(&self) -> Value {
        let mut body = self.data.clone();
        body.insert("$id".to_string(), json!(self.id));
        body.insert("$createdAt".to_string(), json!(self.created_at));
        body.insert("$collectionId".to_string(), json!(self.collection_id));
        body.insert("$databaseId".to_string(), json!(self.database_id));
        Value::Object(body)
    }

    /// Attribute value, including the `$` system fields
    fn attribute(&self, name: &str) -> Value {
        match name {
            "$id" => json!(self.id),
            "$createdAt" => json!(self.created_at),
            _ => self.data.get(name).cloned().unwrap_or(Value::Null),
        }
    }
}

#[derive(Default)]
struct Store {
    users: HashMap<String, FakeUser>,
    /// session secret -> user id
    sessions: HashMap<String, String>,
    /// one-time OAuth secret -> user id
    tokens: HashMap<String, String>,
    files: HashMap<String, FakeFile>,
    /// In insertion order
    documents: Vec<FakeDocument>,
}

/// Handle to a running fake identity service
#[derive(Clone)]
pub struct FakeIdentity {
    store: Arc<Mutex<Store>>,
    unavailable: Arc<AtomicBool>,
    counter: Arc<AtomicU64>,
    /// Base URL including the `/v1` prefix
    pub endpoint: String,
}

impl FakeIdentity {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let fake = Self {
            store: Arc::new(Mutex::new(Store::default())),
            unavailable: Arc::new(AtomicBool::new(false)),
            counter: Arc::new(AtomicU64::new(1)),
            endpoint: format!("http://{}/v1", addr),
        };

        let app = router(fake.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        fake
    }

    /// Make every endpoint answer 503
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.counter.fetch_add(1, Ordering::SeqCst))
    }

    pub fn add_user(&self, email: &str, password: &str, name: &str, onboarded: bool) -> String {
        let id = self.next_id("user");
        let mut prefs = Map::new();
        if onboarded {
            prefs.insert("onboardingCompleted".to_string(), json!("true"));
        }
        self.store.lock().unwrap().users.insert(
            id.clone(),
            FakeUser {
                id: id.clone(),
                name: name.to_string(),
                email: email.to_string(),
                password: password.to_string(),
                prefs,
            },
        );
        id
    }

    pub fn open_session(&self, user_id: &str) -> String {
        let secret = self.next_id("secret");
        self.store
            .lock()
            .unwrap()
            .sessions
            .insert(secret.clone(), user_id.to_string());
        secret
    }

    pub fn issue_oauth_token(&self, user_id: &str) -> String {
        let secret = self.next_id("token");
        self.store
            .lock()
            .unwrap()
            .tokens
            .insert(secret.clone(), user_id.to_string());
        secret
    }

    pub fn user(&self, user_id: &str) -> Option<FakeUser> {
        self.store.lock().unwrap().users.get(user_id).cloned()
    }

    pub fn user_by_email(&self, email: &str) -> Option<FakeUser> {
        self.store
            .lock()
            .unwrap()
            .users
            .values()
            .find(|user| user.email == email)
            .cloned()
    }

    pub fn has_session(&self, secret: &str) -> bool {
        self.store.lock().unwrap().sessions.contains_key(secret)
    }

    pub fn files(&self) -> Vec<FakeFile> {
        self.store.lock().unwrap().files.values().cloned().collect()
    }

    /// Documents of a collection, oldest first
    pub fn documents(&self, collection_id: &str) -> Vec<FakeDocument> {
        self.store
            .lock()
            .unwrap()
            .documents
            .iter()
            .filter(|doc| doc.collection_id == collection_id)
            .cloned()
            .collect()
    }
}

fn router(fake: FakeIdentity) -> Router {
    Router::new()
        .route("/v1/account", post(create_account).get(get_account))
        .route("/v1/account/sessions/email", post(create_email_session))
        .route("/v1/account/sessions/token", post(create_token_session))
        .route("/v1/account/sessions/current", delete(delete_current_session))
        .route("/v1/account/tokens/oauth2/:provider", get(oauth_token))
        .route("/v1/account/prefs", get(get_prefs).patch(update_prefs))
        .route("/v1/account/name", patch(update_name))
        .route("/v1/account/email", patch(update_email))
        .route("/v1/account/password", patch(update_password))
        .route("/v1/users/:id", delete(delete_user))
        .route("/v1/storage/buckets/:bucket/files", post(upload_file))
        .route(
            "/v1/databases/:db/collections/:col/documents",
            post(create_document).get(list_documents),
        )
        .route(
            "/v1/databases/:db/collections/:col/documents/:id",
            delete(delete_document),
        )
        .with_state(fake)
}

type Reply = Result<Response, Response>;

fn error(status: StatusCode, kind: &str, message: &str) -> Response {
    (
        status,
        Json(json!({ "message": message, "code": status.as_u16(), "type": kind })),
    )
        .into_response()
}

fn account_json(user: &FakeUser) -> Value {
    json!({
        "$id": user.id,
        "name": user.name,
        "email": user.email,
        "emailVerification": false,
        "registration": "2025-01-01T00:00:00.000+00:00",
        "status": true,
        "prefs": user.prefs,
    })
}

fn session_json(id: &str, user_id: &str, secret: &str) -> Value {
    json!({
        "$id": id,
        "userId": user_id,
        "secret": secret,
        "expire": "2099-01-01T00:00:00.000+00:00",
    })
}

/// Project header and availability checks shared by every endpoint
fn check_request(fake: &FakeIdentity, headers: &HeaderMap) -> Result<(), Response> {
    if fake.unavailable.load(Ordering::SeqCst) {
        return Err(error(
            StatusCode::SERVICE_UNAVAILABLE,
            "general_server_error",
            "Service unavailable",
        ));
    }
    if headers.get("x-appwrite-project").and_then(|v| v.to_str().ok()) != Some(PROJECT_ID) {
        return Err(error(
            StatusCode::NOT_FOUND,
            "project_not_found",
            "Project with the requested ID could not be found.",
        ));
    }
    Ok(())
}

fn require_key(fake: &FakeIdentity, headers: &HeaderMap) -> Result<(), Response> {
    check_request(fake, headers)?;
    if headers.get("x-appwrite-key").and_then(|v| v.to_str().ok()) != Some(API_KEY) {
        return Err(error(
            StatusCode::UNAUTHORIZED,
            "general_unauthorized_scope",
            "The current user or API key does not have the required scopes.",
        ));
    }
    Ok(())
}

/// Session secret and user id of the calling session
fn require_session(fake: &FakeIdentity, headers: &HeaderMap) -> Result<(String, String), Response> {
    check_request(fake, headers)?;
    let secret = headers
        .get("x-appwrite-session")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let store = fake.store.lock().unwrap();
    match store.sessions.get(&secret) {
        Some(user_id) if store.users.contains_key(user_id) => Ok((secret, user_id.clone())),
        _ => Err(error(
            StatusCode::UNAUTHORIZED,
            "user_unauthorized",
            "The current user is not authorized to perform the requested action.",
        )),
    }
}

fn invalid_credentials() -> Response {
    error(
        StatusCode::UNAUTHORIZED,
        "user_invalid_credentials",
        "Invalid credentials. Please check the email and password.",
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAccount {
    user_id: String,
    email: String,
    password: String,
    name: String,
}

async fn create_account(
    State(fake): State<FakeIdentity>,
    headers: HeaderMap,
    Json(body): Json<CreateAccount>,
) -> Reply {
    require_key(&fake, &headers)?;
    let mut store = fake.store.lock().unwrap();
    if store.users.values().any(|user| user.email == body.email) {
        return Err(error(
            StatusCode::CONFLICT,
            "user_already_exists",
            "A user with the same id, email, or phone already exists in this project.",
        ));
    }

    let user = FakeUser {
        id: body.user_id,
        name: body.name,
        email: body.email,
        password: body.password,
        prefs: Map::new(),
    };
    let response = (StatusCode::CREATED, Json(account_json(&user))).into_response();
    store.users.insert(user.id.clone(), user);
    Ok(response)
}

#[derive(Deserialize)]
struct EmailSession {
    email: String,
    password: String,
}

async fn create_email_session(
    State(fake): State<FakeIdentity>,
    headers: HeaderMap,
    Json(body): Json<EmailSession>,
) -> Reply {
    require_key(&fake, &headers)?;
    let user_id = fake
        .user_by_email(&body.email)
        .filter(|user| user.password == body.password)
        .map(|user| user.id)
        .ok_or_else(invalid_credentials)?;

    let secret = fake.open_session(&user_id);
    let id = fake.next_id("session");
    Ok((StatusCode::CREATED, Json(session_json(&id, &user_id, &secret))).into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenSession {
    user_id: String,
    secret: String,
}

async fn create_token_session(
    State(fake): State<FakeIdentity>,
    headers: HeaderMap,
    Json(body): Json<TokenSession>,
) -> Reply {
    require_key(&fake, &headers)?;
    let owner = fake.store.lock().unwrap().tokens.remove(&body.secret);
    if owner.as_deref() != Some(body.user_id.as_str()) {
        return Err(error(
            StatusCode::UNAUTHORIZED,
            "user_invalid_token",
            "Invalid token passed in the request.",
        ));
    }

    let secret = fake.open_session(&body.user_id);
    let id = fake.next_id("session");
    Ok((StatusCode::CREATED, Json(session_json(&id, &body.user_id, &secret))).into_response())
}

async fn delete_current_session(State(fake): State<FakeIdentity>, headers: HeaderMap) -> Reply {
    let (secret, _) = require_session(&fake, &headers)?;
    fake.store.lock().unwrap().sessions.remove(&secret);
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[derive(Deserialize)]
struct OAuthQuery {
    success: String,
    failure: String,
}

async fn oauth_token(
    State(fake): State<FakeIdentity>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    Query(query): Query<OAuthQuery>,
) -> Reply {
    check_request(&fake, &headers)?;
    let location = format!(
        "https://{}.oauth.test/authorize?success={}&failure={}",
        provider,
        urlencoding::encode(&query.success),
        urlencoding::encode(&query.failure)
    );
    Ok((StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response())
}

async fn get_account(State(fake): State<FakeIdentity>, headers: HeaderMap) -> Reply {
    let (_, user_id) = require_session(&fake, &headers)?;
    let user = fake.user(&user_id).ok_or_else(invalid_credentials)?;
    Ok(Json(account_json(&user)).into_response())
}

async fn get_prefs(State(fake): State<FakeIdentity>, headers: HeaderMap) -> Reply {
    let (_, user_id) = require_session(&fake, &headers)?;
    let user = fake.user(&user_id).ok_or_else(invalid_credentials)?;
    Ok(Json(Value::Object(user.prefs)).into_response())
}

/// Apply `change` to the calling user and answer with the account
fn modify_user(
    fake: &FakeIdentity,
    user_id: &str,
    change: impl FnOnce(&mut FakeUser),
) -> Reply {
    let mut store = fake.store.lock().unwrap();
    let user = store.users.get_mut(user_id).ok_or_else(invalid_credentials)?;
    change(user);
    Ok(Json(account_json(user)).into_response())
}

#[derive(Deserialize)]
struct UpdatePrefs {
    prefs: Map<String, Value>,
}

async fn update_prefs(
    State(fake): State<FakeIdentity>,
    headers: HeaderMap,
    Json(body): Json<UpdatePrefs>,
) -> Reply {
    let (_, user_id) = require_session(&fake, &headers)?;
    modify_user(&fake, &user_id, |user| user.prefs = body.prefs)
}

#[derive(Deserialize)]
struct UpdateName {
    name: String,
}

async fn update_name(
    State(fake): State<FakeIdentity>,
    headers: HeaderMap,
    Json(body): Json<UpdateName>,
) -> Reply {
    let (_, user_id) = require_session(&fake, &headers)?;
    modify_user(&fake, &user_id, |user| user.name = body.name)
}

#[derive(Deserialize)]
struct UpdateEmail {
    email: String,
    password: String,
}

async fn update_email(
    State(fake): State<FakeIdentity>,
    headers: HeaderMap,
    Json(body): Json<UpdateEmail>,
) -> Reply {
    let (_, user_id) = require_session(&fake, &headers)?;
    let user = fake.user(&user_id).ok_or_else(invalid_credentials)?;
    if user.password != body.password {
        return Err(invalid_credentials());
    }
    if fake
        .user_by_email(&body.email)
        .is_some_and(|other| other.id != user_id)
    {
        return Err(error(
            StatusCode::CONFLICT,
            "user_email_already_exists",
            "A user with the same email already exists in the current project.",
        ));
    }
    modify_user(&fake, &user_id, |user| user.email = body.email)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePassword {
    password: String,
    old_password: String,
}

async fn update_password(
    State(fake): State<FakeIdentity>,
    headers: HeaderMap,
    Json(body): Json<UpdatePassword>,
) -> Reply {
    let (_, user_id) = require_session(&fake, &headers)?;
    let user = fake.user(&user_id).ok_or_else(invalid_credentials)?;
    if user.password != body.old_password {
        return Err(invalid_credentials());
    }
    modify_user(&fake, &user_id, |user| user.password = body.password)
}

async fn delete_user(
    State(fake): State<FakeIdentity>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> Reply {
    require_key(&fake, &headers)?;
    let mut store = fake.store.lock().unwrap();
    if store.users.remove(&user_id).is_none() {
        return Err(error(
            StatusCode::NOT_FOUND,
            "user_not_found",
            "User with the requested ID could not be found.",
        ));
    }
    store.sessions.retain(|_, owner| *owner != user_id);
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn upload_file(
    State(fake): State<FakeIdentity>,
    Path(bucket_id): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Reply {
    require_key(&fake, &headers)?;

    let mut file_id = None;
    let mut file = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("fileId") => file_id = field.text().await.ok(),
            Some("file") => {
                let name = field.file_name().unwrap_or_default().to_string();
                let mime_type = field.content_type().unwrap_or_default().to_string();
                let size = field.bytes().await.map(|b| b.len()).unwrap_or_default();
                file = Some(FakeFile {
                    bucket_id: bucket_id.clone(),
                    name,
                    mime_type,
                    size,
                });
            }
            _ => {}
        }
    }

    let (Some(file_id), Some(file)) = (file_id, file) else {
        return Err(error(
            StatusCode::BAD_REQUEST,
            "storage_invalid_file",
            "Invalid file",
        ));
    };

    let body = json!({
        "$id": file_id,
        "bucketId": file.bucket_id,
        "name": file.name,
        "mimeType": file.mime_type,
        "sizeOriginal": file.size,
    });
    fake.store.lock().unwrap().files.insert(file_id, file);
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateDocument {
    document_id: String,
    data: Map<String, Value>,
}

async fn create_document(
    State(fake): State<FakeIdentity>,
    Path((database_id, collection_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<CreateDocument>,
) -> Reply {
    require_key(&fake, &headers)?;
    let sequence = fake.counter.fetch_add(1, Ordering::SeqCst);
    let mut store = fake.store.lock().unwrap();
    if store.documents.iter().any(|doc| {
        doc.database_id == database_id
            && doc.collection_id == collection_id
            && doc.id == body.document_id
    }) {
        return Err(error(
            StatusCode::CONFLICT,
            "document_already_exists",
            "Document with the requested ID already exists.",
        ));
    }

    let document = FakeDocument {
        database_id,
        collection_id,
        id: body.document_id,
        created_at: format!("2025-01-01T00:00:00.{:06}+00:00", sequence),
        data: body.data,
    };
    let response = (StatusCode::CREATED, Json(document.to_json())).into_response();
    store.documents.push(document);
    Ok(response)
}

fn compare(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

async fn list_documents(
    State(fake): State<FakeIdentity>,
    Path((database_id, collection_id)): Path<(String, String)>,
    headers: HeaderMap,
    RawQuery(raw): RawQuery,
) -> Reply {
    require_key(&fake, &headers)?;
    let queries: Vec<Value> = url::form_urlencoded::parse(raw.unwrap_or_default().as_bytes())
        .filter(|(key, _)| key == "queries[]")
        .map(|(_, value)| serde_json::from_str(&value))
        .collect::<Result<_, _>>()
        .map_err(|_| error(StatusCode::BAD_REQUEST, "general_query_invalid", "Invalid query"))?;

    let mut documents: Vec<FakeDocument> = fake
        .store
        .lock()
        .unwrap()
        .documents
        .iter()
        .filter(|doc| doc.database_id == database_id && doc.collection_id == collection_id)
        .cloned()
        .collect();
    let mut limit = 25;

    for query in &queries {
        let attribute = query["attribute"].as_str().unwrap_or_default();
        match query["method"].as_str() {
            Some("equal") => {
                let values = query["values"].as_array().cloned().unwrap_or_default();
                documents.retain(|doc| values.contains(&doc.attribute(attribute)));
            }
            Some("orderAsc") => {
                documents.sort_by(|a, b| compare(&a.attribute(attribute), &b.attribute(attribute)))
            }
            Some("orderDesc") => {
                documents.sort_by(|a, b| compare(&b.attribute(attribute), &a.attribute(attribute)))
            }
            Some("limit") => limit = query["values"][0].as_u64().unwrap_or(25) as usize,
            _ => {
                return Err(error(
                    StatusCode::BAD_REQUEST,
                    "general_query_invalid",
                    "Invalid query method",
                ));
            }
        }
    }

    let total = documents.len();
    let documents: Vec<Value> = documents.iter().take(limit).map(FakeDocument::to_json).collect();
    Ok(Json(json!({ "total": total, "documents": documents })).into_response())
}

async fn delete_document(
    State(fake): State<FakeIdentity>,
    Path((database_id, collection_id, document_id)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Reply {
    require_key(&fake, &headers)?;
    let mut store = fake.store.lock().unwrap();
    let before = store.documents.len();
    store.documents.retain(|doc| {
        !(doc.database_id == database_id
            && doc.collection_id == collection_id
            && doc.id == document_id)
    });
    if store.documents.len() == before {
        return Err(error(
            StatusCode::NOT_FOUND,
            "document_not_found",
            "Document with the requested ID could not be found.",
        ));
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}
