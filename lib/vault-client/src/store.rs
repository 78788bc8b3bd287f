use crate::error::VaultError;
use crate::models::Secret;
use async_trait::async_trait;
use std::time::Duration;

/// Operations the lifecycle manager needs from Vault.
///
/// Implementations must be safe to share between the main flow and any
/// number of renewal tasks.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Token used by `read` and `write`
    fn set_token(&self, token: &str);

    async fn write(&self, path: &str, payload: serde_json::Value) -> Result<Secret, VaultError>;

    /// `Ok(None)` when Vault has nothing at `path`
    async fn read(&self, path: &str) -> Result<Option<Secret>, VaultError>;

    /// Raw `data` map of `auth/token/lookup-self`
    async fn lookup_self(
        &self,
        token: &str,
    ) -> Result<serde_json::Map<String, serde_json::Value>, VaultError>;

    async fn renew_self(&self, token: &str, increment: Duration) -> Result<Secret, VaultError>;

    async fn renew_lease(&self, lease_id: &str, increment: Duration) -> Result<Secret, VaultError>;

    async fn revoke_self(&self, token: &str) -> Result<(), VaultError>;
}
