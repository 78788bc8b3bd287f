use super::AuthMethod;
use crate::error::AuthError;
use crate::models::Credential;
use crate::store::SecretStore;
use async_trait::async_trait;
use std::collections::HashMap;

pub const TOKEN_ENV_VAR: &str = "VAULT_TOKEN";

/// Static token authentication: configured token, else `VAULT_TOKEN`
pub struct StaticTokenAuth {
    token: Option<String>,
    environ: HashMap<String, String>,
}

impl StaticTokenAuth {
    /// Falls back to the process environment as it is at construction time
    pub fn new(token: Option<String>) -> Self {
        Self {
            token,
            environ: std::env::vars().collect(),
        }
    }

    /// Use the given variables instead of the process environment
    pub fn with_environ(mut self, environ: HashMap<String, String>) -> Self {
        self.environ = environ;
        self
    }

    fn resolve(&self) -> Result<String, AuthError> {
        if let Some(token) = self.token.as_ref().filter(|t| !t.is_empty()) {
            tracing::info!("Vault token found in config file");
            return Ok(token.clone());
        }

        match self.environ.get(TOKEN_ENV_VAR) {
            Some(token) if !token.is_empty() => {
                tracing::info!(env = TOKEN_ENV_VAR, "Vault token found in environment");
                Ok(token.clone())
            }
            _ => Err(AuthError::MissingToken),
        }
    }
}

#[async_trait]
impl AuthMethod for StaticTokenAuth {
    async fn authenticate(&self, _store: &dyn SecretStore) -> Result<Credential, AuthError> {
        tracing::info!("Using token authentication");
        self.resolve().map(Credential::static_token)
    }

    fn name(&self) -> &'static str {
        "token"
    }
}
