//! Thin REST client shared by every feature: bearer auth, error normalisation
//! and the centralised 401 sign-out.

use crate::domain::model::{Actor, DocumentUpload, LoginResponse, UploadedDocument, UserProfile};
use crate::domain::ports::KeyValueStore;
use crate::utils::error::{ApiError, ApiResult, Result};
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;

pub const SESSION_TOKEN_KEY: &str = "auth.token";
pub const SESSION_USER_KEY: &str = "auth.user";

pub type SignOutHandler = Arc<dyn Fn() + Send + Sync>;

/// Bearer token and profile of the signed-in user, mirrored to the key-value store.
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
    token: Arc<RwLock<Option<String>>>,
    user: Arc<RwLock<Option<UserProfile>>>,
}

impl SessionStore {
    pub async fn load(store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let token = store
            .get(SESSION_TOKEN_KEY)
            .await?
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let user = match store.get(SESSION_USER_KEY).await? {
            Some(raw) => match serde_json::from_str::<UserProfile>(&raw) {
                Ok(user) => Some(user),
                Err(e) => {
                    tracing::warn!("stored user profile is unreadable: {}", e);
                    None
                }
            },
            None => None,
        };
        Ok(Self {
            store,
            token: Arc::new(RwLock::new(token)),
            user: Arc::new(RwLock::new(user)),
        })
    }

    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    pub async fn is_signed_in(&self) -> bool {
        self.token.read().await.is_some()
    }

    pub async fn set_token(&self, token: &str) -> Result<()> {
        self.store.set(SESSION_TOKEN_KEY, token).await?;
        *self.token.write().await = Some(token.to_string());
        Ok(())
    }

    pub async fn user(&self) -> Option<UserProfile> {
        self.user.read().await.clone()
    }

    /// The signed-in user as a policy actor.
    pub async fn actor(&self) -> Option<Actor> {
        self.user
            .read()
            .await
            .as_ref()
            .map(|u| Actor::new(u.id.clone(), u.role))
    }

    pub async fn set_user(&self, user: &UserProfile) -> Result<()> {
        self.store
            .set(SESSION_USER_KEY, &serde_json::to_string(user)?)
            .await?;
        *self.user.write().await = Some(user.clone());
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        *self.token.write().await = None;
        *self.user.write().await = None;
        self.store.remove(SESSION_TOKEN_KEY).await?;
        self.store.remove(SESSION_USER_KEY).await
    }
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: SessionStore,
    on_unauthorized: Arc<Mutex<Option<SignOutHandler>>>,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration, session: SessionStore) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
            on_unauthorized: Arc::new(Mutex::new(None)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Registers the callback run after any 401 has cleared the session.
    pub fn set_sign_out_handler(&self, handler: impl Fn() + Send + Sync + 'static) {
        if let Ok(mut slot) = self.on_unauthorized.lock() {
            *slot = Some(Arc::new(handler));
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.token().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn handle_unauthorized(&self) {
        tracing::warn!("received 401, signing out");
        if let Err(e) = self.session.clear().await {
            tracing::error!("failed to clear session: {}", e);
        }
        let handler = self
            .on_unauthorized
            .lock()
            .ok()
            .and_then(|slot| slot.clone());
        if let Some(handler) = handler {
            handler();
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let response = self.authorized(request).await.send().await?;
        let status = response.status();
        tracing::debug!("API response status: {} for {}", status, response.url());

        let body = response.text().await?;
        if !status.is_success() {
            let err = ApiError::from_response_body(status.as_u16(), &body);
            if err.is_unauthorized() {
                self.handle_unauthorized().await;
            }
            return Err(err);
        }

        let body = if body.trim().is_empty() { "null" } else { &body };
        serde_json::from_str(body).map_err(|e| ApiError {
            kind: crate::utils::error::ApiErrorKind::Unknown,
            message: format!("unexpected response body: {}", e),
            status: Some(status.as_u16()),
        })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        tracing::debug!("GET {}", path);
        self.send(self.client.get(self.url(path))).await
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        tracing::debug!("POST {}", path);
        self.send(self.client.post(self.url(path)).json(body)).await
    }

    pub async fn patch_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        tracing::debug!("PATCH {}", path);
        self.send(self.client.patch(self.url(path)).json(body)).await
    }

    /// Multipart upload to the documents endpoint.
    pub async fn upload_document(&self, upload: DocumentUpload) -> ApiResult<UploadedDocument> {
        tracing::debug!(
            module = %upload.module,
            reference_id = %upload.reference_id,
            size = upload.bytes.len(),
            "uploading document"
        );
        let file_part = reqwest::multipart::Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(&upload.mime_type)?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("category", upload.category)
            .text("module", upload.module)
            .text("referenceId", upload.reference_id);
        if let Some(client_upload_id) = upload.client_upload_id {
            form = form.text("clientUploadId", client_upload_id);
        }

        self.send(self.client.post(self.url("/documents/upload")).multipart(form))
            .await
    }

    /// Reachability probe: any HTTP answer counts as online.
    pub async fn probe(&self, path: &str) -> bool {
        match self.client.get(self.url(path)).send().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("reachability probe failed: {}", e);
                false
            }
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let body = serde_json::json!({ "email": email, "password": password });
        let response: LoginResponse = self.post_json("/auth/login", &body).await?;
        self.session.set_token(&response.access_token).await?;
        self.session.set_user(&response.user).await?;
        tracing::info!(user = %response.user.id, role = %response.user.role, "signed in");
        Ok(response)
    }

    pub async fn logout(&self) -> Result<()> {
        self.session.clear().await
    }
}
