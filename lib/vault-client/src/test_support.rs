use crate::error::VaultError;
use crate::models::{Secret, SecretAuth};
use crate::store::SecretStore;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Scripted answer to one renewal request
pub enum Step {
    Renew(Duration),
    /// Renewed, but Vault will not extend it again
    RenewFinal(Duration),
    Fail(u16),
    /// Never answers
    Hang,
}

/// In-memory store. Renewal scripts are keyed by token (renew-self) or lease id.
#[derive(Default)]
pub struct ScriptedStore {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<HashMap<String, usize>>,
    lookup: Mutex<Option<Result<serde_json::Value, u16>>>,
    secrets: Mutex<HashMap<String, Secret>>,
    token: Mutex<Option<String>>,
    revoked: Mutex<Vec<String>>,
    revoke_fails: Mutex<bool>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, key: &str, steps: Vec<Step>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(key.to_string(), steps.into());
    }

    pub fn calls(&self, key: &str) -> usize {
        self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn set_lookup(&self, data: serde_json::Value) {
        *self.lookup.lock().unwrap() = Some(Ok(data));
    }

    pub fn reject_lookup(&self, status: u16) {
        *self.lookup.lock().unwrap() = Some(Err(status));
    }

    pub fn put_secret(&self, path: &str, secret: Secret) {
        self.secrets.lock().unwrap().insert(path.to_string(), secret);
    }

    pub fn fail_revoke(&self) {
        *self.revoke_fails.lock().unwrap() = true;
    }

    pub fn revoked(&self) -> Vec<String> {
        self.revoked.lock().unwrap().clone()
    }

    pub fn current_token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    async fn next_step(&self, key: &str) -> Result<(Duration, bool), VaultError> {
        *self.calls.lock().unwrap().entry(key.to_string()).or_default() += 1;
        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(key)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Step::Hang);

        match step {
            Step::Renew(lease) => Ok((lease, true)),
            Step::RenewFinal(lease) => Ok((lease, false)),
            Step::Fail(status) => Err(VaultError::ClientError {
                status,
                errors: vec![format!("scripted failure for {}", key)],
            }),
            Step::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl SecretStore for ScriptedStore {
    fn set_token(&self, token: &str) {
        *self.token.lock().unwrap() = Some(token.to_string());
    }

    async fn write(&self, path: &str, _payload: serde_json::Value) -> Result<Secret, VaultError> {
        self.secrets
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| VaultError::ClientError {
                status: 400,
                errors: vec!["no handler for route".to_string()],
            })
    }

    async fn read(&self, path: &str) -> Result<Option<Secret>, VaultError> {
        Ok(self.secrets.lock().unwrap().get(path).cloned())
    }

    async fn lookup_self(
        &self,
        _token: &str,
    ) -> Result<serde_json::Map<String, serde_json::Value>, VaultError> {
        match self.lookup.lock().unwrap().clone() {
            Some(Ok(serde_json::Value::Object(data))) => Ok(data),
            Some(Err(status)) => Err(VaultError::ClientError {
                status,
                errors: vec!["permission denied".to_string()],
            }),
            _ => Err(VaultError::InvalidResponse("no lookup scripted".to_string())),
        }
    }

    async fn renew_self(&self, token: &str, _increment: Duration) -> Result<Secret, VaultError> {
        let (lease_duration, renewable) = self.next_step(token).await?;
        Ok(Secret {
            auth: Some(SecretAuth {
                lease_duration,
                renewable,
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    async fn renew_lease(&self, lease_id: &str, _increment: Duration) -> Result<Secret, VaultError> {
        let (lease_duration, renewable) = self.next_step(lease_id).await?;
        Ok(Secret {
            lease_id: Some(lease_id.to_string()),
            lease_duration,
            renewable,
            ..Default::default()
        })
    }

    async fn revoke_self(&self, token: &str) -> Result<(), VaultError> {
        if *self.revoke_fails.lock().unwrap() {
            return Err(VaultError::RequestError("connection refused".to_string()));
        }
        self.revoked.lock().unwrap().push(token.to_string());
        Ok(())
    }
}
