use crate::auth::{auth_method_from_config, AuthMethod, TokenInspector};
use crate::config::VaultConfig;
use crate::error::{ExpiryCause, FatalError, LeaseError, ReadError};
use crate::models::{Credential, Lease, RenewalEvent, Renewable, Secret};
use crate::renewer::{RenewalHandle, RenewalStopper, Renewer, RenewerState};
use crate::store::SecretStore;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// What stopped being renewable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    Token { accessor: String },
    Lease { lease_id: String },
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token { accessor } => write!(f, "token with accessor {}", accessor),
            Self::Lease { lease_id } => write!(f, "lease {}", lease_id),
        }
    }
}

/// A credential reached the end of its life. The process is expected to exit.
#[derive(Debug, Clone)]
pub struct LifecycleFailure {
    pub subject: Subject,
    pub cause: ExpiryCause,
}

struct TokenRenewal {
    stopper: RenewalStopper,
    state: watch::Receiver<RenewerState>,
}

type LeaseRegistry = Arc<Mutex<HashMap<String, RenewalStopper>>>;

/// Owns the Vault session: authenticates, keeps the token alive and renews
/// leases of secrets read through it.
pub struct LifecycleManager {
    store: Arc<dyn SecretStore>,
    session: Arc<RwLock<Option<Credential>>>,
    token_renewal: Mutex<Option<TokenRenewal>>,
    leases: LeaseRegistry,
    failures_tx: mpsc::UnboundedSender<LifecycleFailure>,
    failures_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<LifecycleFailure>>,
}

impl LifecycleManager {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        Self {
            store,
            session: Arc::new(RwLock::new(None)),
            token_renewal: Mutex::new(None),
            leases: Arc::new(Mutex::new(HashMap::new())),
            failures_tx,
            failures_rx: tokio::sync::Mutex::new(failures_rx),
        }
    }

    /// Authenticates, validates the token and starts its renewal when Vault allows it.
    /// Returns as soon as renewal is running; renewal never "finishes" successfully.
    pub async fn initialize(&self, config: &VaultConfig) -> Result<(), FatalError> {
        let method = auth_method_from_config(config)?;
        self.initialize_with(method.as_ref(), config.grace()).await
    }

    /// Same as [`initialize`](Self::initialize) with an already chosen auth method
    pub async fn initialize_with(&self, method: &dyn AuthMethod, grace: Duration) -> Result<(), FatalError> {
        tracing::info!(method = method.name(), "Client authenticating to Vault");
        let credential = method.authenticate(self.store.as_ref()).await?;

        tracing::info!("Looking up token");
        let metadata = TokenInspector::new(self.store.as_ref())
            .lookup_self(&credential.token)
            .await?;
        tracing::info!(
            accessor = %metadata.accessor,
            creation_ttl = metadata.creation_ttl.as_secs(),
            max_ttl = metadata.max_ttl.as_secs(),
            renewable = metadata.renewable,
            "Token is valid"
        );

        let credential = credential.with_metadata(&metadata);
        self.stop_token_renewal();
        self.store.set_token(&credential.token);
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(credential.clone());

        if !credential.renewable {
            tracing::info!("Token is not renewable. Token lifecycle disabled.");
            return Ok(());
        }

        self.start_token_renewal(credential, grace);
        Ok(())
    }

    fn start_token_renewal(&self, credential: Credential, grace: Duration) {
        let accessor = credential.accessor.clone();
        tracing::info!(accessor = %accessor, "Starting token lifecycle management");

        let mut handle = Renewer::start(self.store.clone(), Renewable::Token(credential), grace);
        *self
            .token_renewal
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(TokenRenewal {
            stopper: handle.stopper(),
            state: handle.state_receiver(),
        });

        let session = Arc::clone(&self.session);
        let failures = self.failures_tx.clone();
        tokio::spawn(async move {
            let cause = follow(&mut handle, |renewal| {
                if let Renewable::Token(renewed) = renewal {
                    let mut session = session.write().unwrap_or_else(PoisonError::into_inner);
                    if session.as_ref().is_some_and(|c| c.token == renewed.token) {
                        *session = Some(renewed.clone());
                    }
                }
            })
            .await;

            if cause.is_fatal() {
                tracing::error!(
                    accessor = %accessor,
                    cause = %cause,
                    "Cannot renew token. App will terminate."
                );
                let _ = failures.send(LifecycleFailure {
                    subject: Subject::Token { accessor },
                    cause,
                });
            }
        });
    }

    fn stop_token_renewal(&self) {
        let previous = self
            .token_renewal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(renewal) = previous {
            renewal.stopper.stop();
        }
    }

    fn stop_renewals(&self) {
        self.stop_token_renewal();
        for (_, stopper) in self
            .leases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
        {
            stopper.stop();
        }
    }

    /// State of the token renewer, `None` when the token is not being renewed
    pub fn token_renewal_state(&self) -> Option<RenewerState> {
        self.token_renewal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|renewal| *renewal.state.borrow())
    }

    /// Current session credential
    pub fn session(&self) -> Option<Credential> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn get_secret(&self, path: &str) -> Result<Secret, ReadError> {
        tracing::info!(path = %path, "Starting secret retrieval");

        let secret = match self.store.read(path).await {
            Ok(Some(secret)) => secret,
            Ok(None) => {
                return Err(ReadError::NotFound {
                    path: path.to_string(),
                })
            }
            Err(e) => {
                let path = path.to_string();
                return Err(match e.status() {
                    Some(404) => ReadError::NotFound { path },
                    Some(401) | Some(403) => ReadError::Denied { path },
                    _ => ReadError::Transport { path, source: e },
                });
            }
        };

        let mut fields: Vec<&str> = secret.data.keys().map(String::as_str).collect();
        fields.sort_unstable();
        tracing::info!(
            path = %path,
            lease_id = secret.lease_id.as_deref().unwrap_or(""),
            fields = ?fields,
            "Got secret"
        );
        Ok(secret)
    }

    /// Keeps the secret's lease alive until it can no longer be renewed and
    /// returns why. Independent of the token and of other leases.
    pub async fn renew_lease(&self, secret: &Secret, grace: Duration) -> Result<ExpiryCause, LeaseError> {
        let lease_id = secret
            .lease_id
            .clone()
            .ok_or_else(|| LeaseError::MissingLease(secret.request_id.clone()))?;
        if !secret.renewable {
            return Err(LeaseError::NotRenewable(lease_id));
        }

        tracing::info!(lease_id = %lease_id, "Starting secret lifecycle management");
        let lease = Lease {
            lease_id: lease_id.clone(),
            lease_duration: secret.lease_duration,
            renewable: secret.renewable,
        };
        let mut handle = Renewer::start(self.store.clone(), Renewable::Lease(lease), grace);
        let _registration = LeaseRegistration::new(&self.leases, lease_id.clone(), handle.stopper());

        let cause = follow(&mut handle, |_| {}).await;
        if cause.is_fatal() {
            tracing::error!(
                lease_id = %lease_id,
                cause = %cause,
                "Cannot renew lease. App will terminate."
            );
            let _ = self.failures_tx.send(LifecycleFailure {
                subject: Subject::Lease { lease_id },
                cause: cause.clone(),
            });
        }
        Ok(cause)
    }

    /// Leases currently being renewed
    pub fn active_leases(&self) -> Vec<String> {
        let mut leases: Vec<String> = self
            .leases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        leases.sort();
        leases
    }

    /// Waits for the next credential that could not be renewed
    pub async fn expired(&self) -> Option<LifecycleFailure> {
        self.failures_rx.lock().await.recv().await
    }

    /// Stops all renewal and revokes the session token. Revocation failures are only logged.
    pub async fn shutdown(&self) {
        self.stop_renewals();

        let credential = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(credential) = credential else {
            return;
        };

        tracing::info!(accessor = %credential.accessor, "Revoking token");
        if let Err(e) = self.store.revoke_self(&credential.token).await {
            tracing::warn!(accessor = %credential.accessor, error = %e, "Failed to revoke token");
        }
    }
}

impl Drop for LifecycleManager {
    fn drop(&mut self) {
        self.stop_renewals();
    }
}

/// Logs renewals until the renewer terminates and returns the terminal cause
async fn follow(handle: &mut RenewalHandle, mut on_renewed: impl FnMut(&Renewable)) -> ExpiryCause {
    while let Some(event) = handle.next_event().await {
        match event {
            RenewalEvent::Renewed {
                renewal,
                renewed_at,
            } => {
                match &renewal {
                    Renewable::Token(credential) => tracing::info!(
                        accessor = %credential.accessor,
                        renewed_at = %renewed_at,
                        ttl = credential.lease_duration.as_secs(),
                        "Successfully renewed token"
                    ),
                    Renewable::Lease(lease) => tracing::info!(
                        lease_id = %lease.lease_id,
                        renewed_at = %renewed_at,
                        ttl = lease.lease_duration.as_secs(),
                        "Successfully renewed lease"
                    ),
                }
                on_renewed(&renewal);
            }
            RenewalEvent::Expired { cause } => return cause,
        }
    }
    // stream closed without a terminal event: stopped before the first renewal
    ExpiryCause::ExplicitStop
}

/// Registers a lease renewer with the manager for as long as it is alive
struct LeaseRegistration {
    leases: LeaseRegistry,
    lease_id: String,
    stopper: RenewalStopper,
}

impl LeaseRegistration {
    fn new(leases: &LeaseRegistry, lease_id: String, stopper: RenewalStopper) -> Self {
        let replaced = leases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(lease_id.clone(), stopper.clone());
        if let Some(previous) = replaced {
            tracing::warn!(lease_id = %lease_id, "Lease already renewed elsewhere, stopping previous renewer");
            previous.stop();
        }
        Self {
            leases: Arc::clone(leases),
            lease_id,
            stopper,
        }
    }
}

impl Drop for LeaseRegistration {
    fn drop(&mut self) {
        let mut leases = self.leases.lock().unwrap_or_else(PoisonError::into_inner);
        if leases
            .get(&self.lease_id)
            .is_some_and(|s| s.same_renewer(&self.stopper))
        {
            leases.remove(&self.lease_id);
        }
    }
}
