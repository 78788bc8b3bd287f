use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use vault_client::{FatalError, LifecycleFailure, LifecycleManager, ReadError, VaultError};

use crate::settings::AppSettings;

pub const APPLICATION_NAME: &str = concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Could not create Vault client: {0}")]
    Client(#[from] VaultError),

    #[error("Vault initialization failed: {0}")]
    Init(#[from] FatalError),

    #[error(transparent)]
    Read(#[from] ReadError),
}

/// Why the application stopped
#[derive(Debug)]
pub enum Exit {
    /// Asked to stop, token revoked
    Shutdown,
    /// A credential could not be renewed any more
    Expired(LifecycleFailure),
}

/// Authenticates, reads the configured secret and keeps everything renewed until
/// `shutdown` resolves or a credential expires.
pub async fn run(settings: &AppSettings, shutdown: impl Future<Output = ()>) -> Result<Exit, AppError> {
    let client = settings.vault.client(APPLICATION_NAME)?;
    let manager = Arc::new(LifecycleManager::new(Arc::new(client)));

    manager.initialize(&settings.vault).await?;

    if let Some(path) = &settings.secret.path {
        let secret = match manager.get_secret(path).await {
            Ok(secret) => secret,
            Err(e) => {
                manager.shutdown().await;
                return Err(e.into());
            }
        };

        if settings.secret.renew {
            let grace = settings.vault.grace();
            let lease_manager = Arc::clone(&manager);
            tokio::spawn(async move {
                if let Err(e) = lease_manager.renew_lease(&secret, grace).await {
                    tracing::info!(reason = %e, "Secret lifecycle management disabled");
                }
            });
        }
    }

    tokio::select! {
        failure = manager.expired() => Ok(match failure {
            Some(failure) => Exit::Expired(failure),
            None => Exit::Shutdown,
        }),
        _ = shutdown => {
            tracing::info!("Shutting down");
            manager.shutdown().await;
            Ok(Exit::Shutdown)
        }
    }
}
