use crate::error::VaultError;
use crate::models::Secret;
use crate::store::SecretStore;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

const TOKEN_HEADER: &str = "X-Vault-Token";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct VaultClientBuilder {
    base_url: Option<String>,
    token: Option<String>,
    timeout: Duration,
    application_name: Option<String>,
}

impl Default for VaultClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl VaultClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            token: None,
            timeout: DEFAULT_TIMEOUT,
            application_name: None,
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Per-request timeout, also bounds every renewal attempt
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    pub fn build(self) -> Result<VaultClient, VaultError> {
        let base_url = self
            .base_url
            .or_else(|| std::env::var("VAULT_ADDR").ok())
            .ok_or(VaultError::VaultNotDetected)?;

        let mut http = reqwest::Client::builder().timeout(self.timeout);
        if let Some(ref app_name) = self.application_name {
            http = http.user_agent(app_name.clone());
        }

        Ok(VaultClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: http.build()?,
            token: RwLock::new(self.token),
        })
    }
}

/// HTTP client for the Vault API
pub struct VaultClient {
    base_url: String,
    http: reqwest::Client,
    token: RwLock<Option<String>>,
}

impl VaultClient {
    pub fn from_env() -> Result<Self, VaultError> {
        VaultClientBuilder::new().build()
    }

    pub fn builder() -> VaultClientBuilder {
        VaultClientBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let url = format!("{}/v1/{}", self.base_url, path.trim_start_matches('/'));
        let request = self.http.request(method, url);

        let session = self
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match token.map(str::to_string).or(session) {
            Some(token) => request.header(TOKEN_HEADER, token),
            None => request,
        }
    }

    async fn send(request: RequestBuilder) -> Result<Response, VaultError> {
        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(VaultError::ClientError {
            status,
            errors: parse_errors(&body),
        })
    }

    async fn secret(response: Response) -> Result<Secret, VaultError> {
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Secret::default());
        }
        response
            .json()
            .await
            .map_err(|e| VaultError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl SecretStore for VaultClient {
    fn set_token(&self, token: &str) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
    }

    async fn write(&self, path: &str, payload: serde_json::Value) -> Result<Secret, VaultError> {
        let response = Self::send(self.request(Method::PUT, path, None).json(&payload)).await?;
        Self::secret(response).await
    }

    async fn read(&self, path: &str) -> Result<Option<Secret>, VaultError> {
        match Self::send(self.request(Method::GET, path, None)).await {
            Ok(response) if response.status() == StatusCode::NO_CONTENT => Ok(None),
            Ok(response) => Self::secret(response).await.map(Some),
            // Vault answers 404 with an empty error list when nothing is stored at the path
            Err(VaultError::ClientError { status: 404, errors }) if errors.is_empty() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn lookup_self(
        &self,
        token: &str,
    ) -> Result<serde_json::Map<String, serde_json::Value>, VaultError> {
        #[derive(serde::Deserialize)]
        struct LookupResponse {
            data: Option<serde_json::Map<String, serde_json::Value>>,
        }

        let response = Self::send(self.request(
            Method::GET,
            "auth/token/lookup-self",
            Some(token),
        ))
        .await?;

        let lookup: LookupResponse = response
            .json()
            .await
            .map_err(|e| VaultError::InvalidResponse(e.to_string()))?;
        lookup
            .data
            .ok_or_else(|| VaultError::InvalidResponse("lookup-self returned no data".to_string()))
    }

    async fn renew_self(&self, token: &str, increment: Duration) -> Result<Secret, VaultError> {
        let body = serde_json::json!({ "increment": increment.as_secs() });
        let response = Self::send(
            self.request(Method::PUT, "auth/token/renew-self", Some(token))
                .json(&body),
        )
        .await?;
        Self::secret(response).await
    }

    async fn renew_lease(&self, lease_id: &str, increment: Duration) -> Result<Secret, VaultError> {
        let body = serde_json::json!({
            "lease_id": lease_id,
            "increment": increment.as_secs(),
        });
        let response =
            Self::send(self.request(Method::PUT, "sys/leases/renew", None).json(&body)).await?;
        Self::secret(response).await
    }

    async fn revoke_self(&self, token: &str) -> Result<(), VaultError> {
        Self::send(self.request(Method::PUT, "auth/token/revoke-self", Some(token))).await?;
        Ok(())
    }
}

/// Pulls the `errors` array out of a Vault error body, falling back to the raw text
fn parse_errors(body: &str) -> Vec<String> {
    #[derive(serde::Deserialize)]
    struct ErrorResponse {
        #[serde(default)]
        errors: Vec<String>,
    }

    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) => parsed.errors,
        Err(_) if body.trim().is_empty() => Vec::new(),
        Err(_) => vec![body.trim().to_string()],
    }
}
