mod kubernetes;
mod token;
mod token_info;

pub use kubernetes::KubernetesAuth;
pub use token::StaticTokenAuth;
pub use token_info::{TokenInspector, TokenMetadata};

use crate::config::VaultConfig;
use crate::error::AuthError;
use crate::models::Credential;
use crate::store::SecretStore;
use async_trait::async_trait;

/// Trait for authentication methods
#[async_trait]
pub trait AuthMethod: Send + Sync {
    /// Obtain a token. Never starts renewal.
    async fn authenticate(&self, store: &dyn SecretStore) -> Result<Credential, AuthError>;

    /// Method name as used in configuration
    fn name(&self) -> &'static str;
}

/// Picks the auth method named by `config.authentication`
pub fn auth_method_from_config(config: &VaultConfig) -> Result<Box<dyn AuthMethod>, AuthError> {
    match config.authentication.as_str() {
        "token" => Ok(Box::new(StaticTokenAuth::new(config.token.clone()))),
        "kubernetes" => Ok(Box::new(
            KubernetesAuth::new(config.mount.clone(), config.role.clone())
                .with_jwt_path(config.jwt.clone()),
        )),
        other => Err(AuthError::UnsupportedMethod(other.to_string())),
    }
}
