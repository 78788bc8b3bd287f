use super::AuthMethod;
use crate::config::{DEFAULT_JWT_PATH, DEFAULT_K8S_MOUNT};
use crate::error::AuthError;
use crate::models::Credential;
use crate::store::SecretStore;
use async_trait::async_trait;
use serde::Serialize;

/// Kubernetes authentication: trades the pod's service account JWT for a Vault token
pub struct KubernetesAuth {
    pub mount: String,
    pub role: String,
    pub jwt_path: String,
}

impl KubernetesAuth {
    pub fn new(mount: String, role: String) -> Self {
        Self {
            mount,
            role,
            jwt_path: DEFAULT_JWT_PATH.to_string(),
        }
    }

    pub fn with_jwt_path(mut self, path: String) -> Self {
        self.jwt_path = path;
        self
    }

    fn login_path(&self) -> String {
        let mount = self.mount.trim_matches('/');
        let mount = if mount.is_empty() { DEFAULT_K8S_MOUNT } else { mount };
        format!("auth/{}/login", mount)
    }

    fn read_jwt(&self) -> Result<String, AuthError> {
        std::fs::read_to_string(&self.jwt_path)
            .map(|s| s.trim().to_string())
            .map_err(|source| AuthError::IdentityToken {
                path: self.jwt_path.clone(),
                source,
            })
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    jwt: String,
    role: &'a str,
}

#[async_trait]
impl AuthMethod for KubernetesAuth {
    async fn authenticate(&self, store: &dyn SecretStore) -> Result<Credential, AuthError> {
        tracing::info!(role = %self.role, jwt_path = %self.jwt_path, "Using kubernetes authentication");
        let jwt = self.read_jwt()?;

        let payload = serde_json::to_value(LoginRequest {
            jwt,
            role: &self.role,
        })
        .map_err(|e| AuthError::ExchangeFailed(e.to_string()))?;

        let secret = store
            .write(&self.login_path(), payload)
            .await
            .map_err(|e| AuthError::ExchangeFailed(e.to_string()))?;

        let auth = secret
            .auth
            .ok_or_else(|| AuthError::ExchangeFailed("login response has no auth data".to_string()))?;
        if auth.client_token.is_empty() {
            return Err(AuthError::ExchangeFailed(
                "login response has no client token".to_string(),
            ));
        }

        tracing::info!(
            accessor = %auth.accessor,
            metadata = ?auth.metadata,
            policies = ?auth.policies,
            "Got Vault token"
        );

        Ok(Credential::from_auth(&auth))
    }

    fn name(&self) -> &'static str {
        "kubernetes"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_jwt_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "my-jwt-token").unwrap();

        let auth = KubernetesAuth::new("kubernetes".to_string(), "app".to_string())
            .with_jwt_path(file.path().to_str().unwrap().to_string());

        let jwt = auth.read_jwt().unwrap();
        assert_eq!(jwt, "my-jwt-token");
    }

    #[test]
    fn test_read_jwt_missing_file() {
        let auth = KubernetesAuth::new("kubernetes".to_string(), "app".to_string())
            .with_jwt_path("/nonexistent/path".to_string());

        let result = auth.read_jwt();
        assert!(matches!(result, Err(AuthError::IdentityToken { .. })));
    }

    #[test]
    fn test_login_path_uses_mount() {
        let auth = KubernetesAuth::new("/k8s-prod/".to_string(), "app".to_string());
        assert_eq!(auth.login_path(), "auth/k8s-prod/login");

        let auth = KubernetesAuth::new(String::new(), "app".to_string());
        assert_eq!(auth.login_path(), "auth/kubernetes/login");
    }
}
