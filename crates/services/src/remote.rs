use std::collections::BTreeMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use vocab_core::model::{ItemId, LessonId};

use crate::error::RemoteError;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

#[derive(Clone, Debug)]
pub struct RemoteConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl RemoteConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Reads `VOCAB_API_URL`, falling back to the local development API.
    #[must_use]
    pub fn from_env() -> Self {
        let base_url = env::var("VOCAB_API_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.into());
        Self::new(base_url)
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

/// Supplies the bearer token for remote calls.
///
/// Signing in and exchanging tokens happens elsewhere; this only hands out
/// whatever the session currently holds. `None` means anonymous mode.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn access_token(&self) -> Option<String>;

    /// Try to obtain a fresh token after a 401. Returns `true` if a retry is worthwhile.
    async fn refresh(&self) -> bool {
        false
    }
}

/// A fixed token, or none at all.
#[derive(Clone, Debug, Default)]
pub struct StaticCredentials {
    token: Option<String>,
}

impl StaticCredentials {
    #[must_use]
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|token| !token.trim().is_empty()),
        }
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self { token: None }
    }

    /// Reads `VOCAB_ACCESS_TOKEN`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(env::var("VOCAB_ACCESS_TOKEN").ok())
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn access_token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// One raw record of the remote summary. Items and lessons carry
/// `completed`/`stars`, quizzes carry `score`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub stars: Option<u32>,
    #[serde(default)]
    pub score: Option<u32>,
    #[serde(default)]
    pub category_id: Option<String>,
}

/// Body of `GET /progress`: prefixed keys (`item_1`, `lesson_2`, `quiz_3`)
/// next to a `totalItems` count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteSummary {
    pub records: BTreeMap<String, RemoteRecord>,
    pub total_items: Option<u64>,
}

impl RemoteSummary {
    /// # Errors
    ///
    /// Returns `RemoteError::Malformed` if the body is not a JSON object.
    pub fn from_json(value: Value) -> Result<Self, RemoteError> {
        let Value::Object(fields) = value else {
            return Err(RemoteError::Malformed("expected a JSON object".into()));
        };

        let mut summary = Self::default();
        for (key, value) in fields {
            if key == "totalItems" {
                summary.total_items = value.as_u64();
                if summary.total_items.is_none() {
                    warn!(value = %value, "ignoring non-numeric totalItems");
                }
                continue;
            }
            match serde_json::from_value::<RemoteRecord>(value) {
                Ok(record) => {
                    summary.records.insert(key, record);
                }
                Err(err) => warn!(key = %key, error = %err, "skipping malformed remote record"),
            }
        }
        Ok(summary)
    }
}

/// The remote progress API.
#[async_trait]
pub trait ProgressRemote: Send + Sync {
    /// Fetch every progress record of the signed-in learner.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` for anonymous sessions, transport failures,
    /// non-2xx responses and malformed bodies.
    async fn fetch_summary(&self) -> Result<RemoteSummary, RemoteError>;

    /// # Errors
    ///
    /// Returns `RemoteError` if the update is not acknowledged.
    async fn update_item(&self, id: ItemId, completed: bool, stars: u32)
    -> Result<(), RemoteError>;

    /// # Errors
    ///
    /// Returns `RemoteError` if the update is not acknowledged.
    async fn update_lesson(
        &self,
        id: LessonId,
        completed: bool,
        stars: u32,
    ) -> Result<(), RemoteError>;

    /// # Errors
    ///
    /// Returns `RemoteError` if the update is not acknowledged.
    async fn update_quiz(&self, id: LessonId, completed: bool, score: u32)
    -> Result<(), RemoteError>;
}

#[derive(Debug, Serialize)]
struct StarsUpdate {
    completed: bool,
    stars: u32,
}

#[derive(Debug, Serialize)]
struct ScoreUpdate {
    completed: bool,
    score: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    detail: Option<String>,
    message: Option<String>,
}

/// `ProgressRemote` over HTTP/JSON.
#[derive(Clone)]
pub struct HttpProgressRemote {
    client: Client,
    config: RemoteConfig,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpProgressRemote {
    #[must_use]
    pub fn new(config: RemoteConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            client: Client::new(),
            config,
            credentials,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn request<B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        token: &str,
    ) -> Result<Response, RemoteError> {
        let mut request = self
            .client
            .request(method, self.url(path))
            .bearer_auth(token)
            .timeout(self.config.timeout);
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Send an authenticated request, refreshing the credential once on 401.
    async fn send<B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, RemoteError> {
        let token = self
            .credentials
            .access_token()
            .await
            .ok_or(RemoteError::Unauthenticated)?;
        let response = self.request(method.clone(), path, body, &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED && self.credentials.refresh().await {
            debug!(path, "retrying with refreshed credential");
            let token = self
                .credentials
                .access_token()
                .await
                .ok_or(RemoteError::Unauthenticated)?;
            let retried = self.request(method, path, body, &token).await?;
            return ensure_success(retried).await;
        }

        ensure_success(response).await
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<(), RemoteError> {
        self.send(Method::POST, path, Some(body)).await?;
        Ok(())
    }
}

async fn ensure_success(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .json::<ApiErrorBody>()
        .await
        .ok()
        .and_then(|body| body.detail.or(body.message))
        .unwrap_or_else(|| format!("API error: {}", status.as_u16()));
    Err(RemoteError::Api { status, message })
}

#[async_trait]
impl ProgressRemote for HttpProgressRemote {
    async fn fetch_summary(&self) -> Result<RemoteSummary, RemoteError> {
        let response = self.send::<()>(Method::GET, "/progress", None).await?;
        let text = response.text().await?;
        let value: Value =
            serde_json::from_str(&text).map_err(|e| RemoteError::Malformed(e.to_string()))?;
        RemoteSummary::from_json(value)
    }

    async fn update_item(
        &self,
        id: ItemId,
        completed: bool,
        stars: u32,
    ) -> Result<(), RemoteError> {
        self.post(
            &format!("/progress/items/{id}"),
            &StarsUpdate { completed, stars },
        )
        .await
    }

    async fn update_lesson(
        &self,
        id: LessonId,
        completed: bool,
        stars: u32,
    ) -> Result<(), RemoteError> {
        self.post(
            &format!("/progress/lessons/{id}"),
            &StarsUpdate { completed, stars },
        )
        .await
    }

    async fn update_quiz(
        &self,
        id: LessonId,
        completed: bool,
        score: u32,
    ) -> Result<(), RemoteError> {
        self.post(
            &format!("/progress/quizzes/{id}"),
            &ScoreUpdate { completed, score },
        )
        .await
    }
}
