use crate::client::{VaultClient, VaultClientBuilder};
use crate::error::VaultError;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_AUTH_METHOD: &str = "token";
pub const DEFAULT_K8S_MOUNT: &str = "kubernetes";
pub const DEFAULT_JWT_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
pub const DEFAULT_GRACE_SECS: u64 = 15;

/// Connection and authentication settings for Vault
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Vault address, e.g. `http://127.0.0.1:8200`
    pub server: String,
    /// Auth method name: `token` or `kubernetes`
    pub authentication: String,
    /// Static token, `VAULT_TOKEN` is used when empty
    pub token: Option<String>,
    /// Kubernetes role to log in as
    pub role: String,
    /// Path of the service account JWT
    pub jwt: String,
    /// Mount of the kubernetes auth backend
    pub mount: String,
    /// Renew this long before a lease would run out
    pub grace_secs: u64,
    pub timeout_secs: Option<u64>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            server: "http://127.0.0.1:8200".to_string(),
            authentication: DEFAULT_AUTH_METHOD.to_string(),
            token: None,
            role: String::new(),
            jwt: DEFAULT_JWT_PATH.to_string(),
            mount: DEFAULT_K8S_MOUNT.to_string(),
            grace_secs: DEFAULT_GRACE_SECS,
            timeout_secs: None,
        }
    }
}

impl VaultConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    /// HTTP client pointed at `server`
    pub fn client(&self, application_name: &str) -> Result<VaultClient, VaultError> {
        let mut builder = VaultClientBuilder::new()
            .base_url(&self.server)
            .application_name(application_name);
        if let Some(secs) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        builder.build()
    }
}
