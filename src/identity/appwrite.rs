//! Appwrite REST client
//!
//! Implements [`IdentityService`] against the Appwrite HTTP API.
//! Admin-scoped calls carry the server API key, user-scoped calls carry the
//! session secret from the `user-session` cookie.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::{
    Account, Document, FileUpload, IdentityError, IdentityService, IdentitySession,
    OAuthProvider, Prefs, Query, StoredFile,
};
use crate::config::IdentityConfig;
use crate::error::AppError;
use crate::metrics::{IDENTITY_REQUEST_DURATION_SECONDS, IDENTITY_REQUESTS_TOTAL};

const PROJECT_HEADER: &str = "X-Appwrite-Project";
const KEY_HEADER: &str = "X-Appwrite-Key";
const SESSION_HEADER: &str = "X-Appwrite-Session";

/// Error document returned by Appwrite
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(rename = "type", default)]
    kind: String,
}

/// HTTP client for an Appwrite-compatible identity service
pub struct AppwriteClient {
    http: reqwest::Client,
    endpoint: String,
    project_id: String,
    api_key: String,
}

impl AppwriteClient {
    /// Build a client from configuration
    ///
    /// Redirects are never followed: the OAuth token endpoint answers with a
    /// redirect whose `Location` is the value we want.
    pub fn new(config: &IdentityConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .user_agent("Aventra/0.1.0")
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    fn admin(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header(PROJECT_HEADER, &self.project_id)
            .header(KEY_HEADER, &self.api_key)
    }

    fn as_user(&self, method: Method, path: &str, session: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header(PROJECT_HEADER, &self.project_id)
            .header(SESSION_HEADER, session)
    }

    /// Send a request and record metrics for it
    async fn execute(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, IdentityError> {
        let timer = IDENTITY_REQUEST_DURATION_SECONDS
            .with_label_values(&[operation])
            .start_timer();
        let result = request.send().await;
        timer.observe_duration();

        let outcome = match &result {
            Ok(response) if response.status().is_success() => "ok",
            Ok(response) if response.status().is_redirection() => "redirect",
            Ok(response) if response.status().is_client_error() => "rejected",
            _ => "error",
        };
        IDENTITY_REQUESTS_TOTAL
            .with_label_values(&[operation, outcome])
            .inc();

        let response = result?;
        tracing::debug!(operation, status = %response.status(), "Identity request completed");
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, IdentityError> {
        let response = self.execute(operation, request).await?;
        let response = ensure_success(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| IdentityError::UnexpectedResponse(e.to_string()))
    }

    async fn send_empty(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<(), IdentityError> {
        let response = self.execute(operation, request).await?;
        ensure_success(response).await?;
        Ok(())
    }
}

/// Turn a non-2xx response into an [`IdentityError::Api`]
async fn ensure_success(response: Response) -> Result<Response, IdentityError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    Err(api_error(status, &text))
}

fn api_error(status: StatusCode, body: &str) -> IdentityError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => IdentityError::Api {
            status: status.as_u16(),
            kind: parsed.kind,
            message: parsed.message,
        },
        Err(_) => IdentityError::Api {
            status: status.as_u16(),
            kind: String::new(),
            message: if body.is_empty() {
                status.to_string()
            } else {
                body.chars().take(200).collect()
            },
        },
    }
}

#[async_trait]
impl IdentityService for AppwriteClient {
    async fn create_account(
        &self,
        user_id: &str,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<Account, IdentityError> {
        let request = self.admin(Method::POST, "/account").json(&json!({
            "userId": user_id,
            "email": email,
            "password": password,
            "name": name,
        }));
        self.send_json("create_account", request).await
    }

    async fn create_email_password_session(
        &self,
        email: &str,
        password: &str,
    ) -> Result<IdentitySession, IdentityError> {
        let request = self
            .admin(Method::POST, "/account/sessions/email")
            .json(&json!({ "email": email, "password": password }));
        self.send_json("create_email_password_session", request)
            .await
    }

    async fn create_session(
        &self,
        user_id: &str,
        secret: &str,
    ) -> Result<IdentitySession, IdentityError> {
        let request = self
            .admin(Method::POST, "/account/sessions/token")
            .json(&json!({ "userId": user_id, "secret": secret }));
        self.send_json("create_session", request).await
    }

    async fn create_oauth2_token(
        &self,
        provider: OAuthProvider,
        success_url: &str,
        failure_url: &str,
    ) -> Result<String, IdentityError> {
        let path = format!("/account/tokens/oauth2/{}", provider.as_str());
        let request = self
            .admin(Method::GET, &path)
            .query(&[("success", success_url), ("failure", failure_url)]);

        let response = self.execute("create_oauth2_token", request).await?;
        if !response.status().is_redirection() {
            let response = ensure_success(response).await?;
            return Err(IdentityError::UnexpectedResponse(format!(
                "expected a redirect from the OAuth token endpoint, got {}",
                response.status()
            )));
        }

        response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(ToOwned::to_owned)
            .ok_or_else(|| {
                IdentityError::UnexpectedResponse(
                    "OAuth token redirect carried no Location header".to_string(),
                )
            })
    }

    async fn get_account(&self, session: &str) -> Result<Account, IdentityError> {
        let request = self.as_user(Method::GET, "/account", session);
        self.send_json("get_account", request).await
    }

    async fn delete_session(&self, session: &str, session_id: &str) -> Result<(), IdentityError> {
        let path = format!(
            "/account/sessions/{}",
            urlencoding::encode(session_id)
        );
        let request = self.as_user(Method::DELETE, &path, session);
        self.send_empty("delete_session", request).await
    }

    async fn get_prefs(&self, session: &str) -> Result<Prefs, IdentityError> {
        let request = self.as_user(Method::GET, "/account/prefs", session);
        self.send_json("get_prefs", request).await
    }

    async fn update_prefs(&self, session: &str, prefs: &Prefs) -> Result<Account, IdentityError> {
        let request = self
            .as_user(Method::PATCH, "/account/prefs", session)
            .json(&json!({ "prefs": prefs }));
        self.send_json("update_prefs", request).await
    }

    async fn update_name(&self, session: &str, name: &str) -> Result<Account, IdentityError> {
        let request = self
            .as_user(Method::PATCH, "/account/name", session)
            .json(&json!({ "name": name }));
        self.send_json("update_name", request).await
    }

    async fn update_email(
        &self,
        session: &str,
        email: &str,
        password: &str,
    ) -> Result<Account, IdentityError> {
        let request = self
            .as_user(Method::PATCH, "/account/email", session)
            .json(&json!({ "email": email, "password": password }));
        self.send_json("update_email", request).await
    }

    async fn update_password(
        &self,
        session: &str,
        password: &str,
        old_password: &str,
    ) -> Result<Account, IdentityError> {
        let request = self
            .as_user(Method::PATCH, "/account/password", session)
            .json(&json!({ "password": password, "oldPassword": old_password }));
        self.send_json("update_password", request).await
    }

    async fn delete_user(&self, user_id: &str) -> Result<(), IdentityError> {
        let path = format!("/users/{}", urlencoding::encode(user_id));
        let request = self.admin(Method::DELETE, &path);
        self.send_empty("delete_user", request).await
    }

    async fn upload_file(
        &self,
        bucket_id: &str,
        file_id: &str,
        file: FileUpload,
    ) -> Result<StoredFile, IdentityError> {
        use reqwest::multipart::{Form, Part};

        let part = Part::bytes(file.bytes)
            .file_name(file.file_name)
            .mime_str(&file.content_type)?;
        let form = Form::new()
            .text("fileId", file_id.to_string())
            .part("file", part);

        let path = format!("/storage/buckets/{}/files", urlencoding::encode(bucket_id));
        let request = self.admin(Method::POST, &path).multipart(form);
        self.send_json("upload_file", request).await
    }

    fn file_view_url(&self, bucket_id: &str, file_id: &str) -> String {
        format!(
            "{}/storage/buckets/{}/files/{}/view?project={}",
            self.endpoint,
            urlencoding::encode(bucket_id),
            urlencoding::encode(file_id),
            urlencoding::encode(&self.project_id)
        )
    }

    async fn create_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: Value,
    ) -> Result<Document, IdentityError> {
        let request = self
            .admin(Method::POST, &documents_path(database_id, collection_id))
            .json(&json!({ "documentId": document_id, "data": data }));
        self.send_json("create_document", request).await
    }

    async fn list_documents(
        &self,
        database_id: &str,
        collection_id: &str,
        queries: &[Query],
    ) -> Result<Vec<Document>, IdentityError> {
        let params: Vec<(&str, String)> = queries
            .iter()
            .map(|query| ("queries[]", query.to_json()))
            .collect();
        let request = self
            .admin(Method::GET, &documents_path(database_id, collection_id))
            .query(&params);
        let list: DocumentList = self.send_json("list_documents", request).await?;
        Ok(list.documents)
    }

    async fn delete_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<(), IdentityError> {
        let path = format!(
            "{}/{}",
            documents_path(database_id, collection_id),
            urlencoding::encode(document_id)
        );
        let request = self.admin(Method::DELETE, &path);
        self.send_empty("delete_document", request).await
    }
}

fn documents_path(database_id: &str, collection_id: &str) -> String {
    format!(
        "/databases/{}/collections/{}/documents",
        urlencoding::encode(database_id),
        urlencoding::encode(collection_id)
    )
}

#[derive(Deserialize)]
struct DocumentList {
    documents: Vec<Document>,
}
