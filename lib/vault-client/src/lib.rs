//! vault-client - keeps Vault credentials alive
//!
//! Authenticates with a static token or a Kubernetes service account, checks
//! whether the token can be renewed and, if so, renews it in the background.
//! Leases of secrets read through the session can be renewed the same way.
//! When a token or lease can no longer be renewed the manager reports it
//! through [`LifecycleManager::expired`]; the application is expected to exit
//! and let its orchestrator start it again.

pub mod auth;
mod client;
mod config;
mod error;
mod manager;
mod models;
mod renewer;
mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use auth::{AuthMethod, KubernetesAuth, StaticTokenAuth, TokenInspector, TokenMetadata};
pub use client::{VaultClient, VaultClientBuilder};
pub use config::VaultConfig;
pub use error::{
    AuthError, ExpiryCause, FatalError, LeaseError, LookupError, ReadError, VaultError,
};
pub use manager::{LifecycleFailure, LifecycleManager, Subject};
pub use models::{Credential, Lease, RenewalEvent, Renewable, Secret, SecretAuth};
pub use renewer::{RenewalHandle, RenewalStopper, Renewer, RenewerState};
pub use store::SecretStore;
