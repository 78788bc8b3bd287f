use thiserror::Error;

/// Transport-level failure talking to Vault.
#[derive(Debug, Clone, Error)]
pub enum VaultError {
    #[error("Vault not detected: VAULT_ADDR not set")]
    VaultNotDetected,

    #[error("Vault client error ({status}): {}", .errors.join("; "))]
    ClientError { status: u16, errors: Vec<String> },

    #[error("Vault request error: {0}")]
    RequestError(String),

    #[error("Invalid Vault response: {0}")]
    InvalidResponse(String),
}

impl VaultError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ClientError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for VaultError {
    fn from(e: reqwest::Error) -> Self {
        Self::RequestError(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Could not get Vault token: not in config and VAULT_TOKEN is not set")]
    MissingToken,

    #[error("Failed to read service account JWT from {path}: {source}")]
    IdentityToken {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Kubernetes login failed: {0}")]
    ExchangeFailed(String),

    #[error("Auth method {0} is not supported")]
    UnsupportedMethod(String),
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Token is not valid: {0}")]
    Invalid(String),

    #[error("Token lookup failed: {0}")]
    Transport(VaultError),
}

/// Startup failure. The session is left uninitialized.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Lookup(#[from] LookupError),
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("Secret not found: {path}")]
    NotFound { path: String },

    #[error("Permission denied reading {path}")]
    Denied { path: String },

    #[error("Failed to read {path}: {source}")]
    Transport {
        path: String,
        #[source]
        source: VaultError,
    },
}

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("Secret from request {0} carries no lease")]
    MissingLease(String),

    #[error("Lease {0} is not renewable")]
    NotRenewable(String),
}

/// Why a renewer reached its terminal state.
#[derive(Debug, Clone, Error)]
pub enum ExpiryCause {
    #[error("max TTL reached, credential can no longer be renewed")]
    MaxTtlExceeded,

    #[error("credential is no longer renewable")]
    NotRenewable,

    #[error("renewal failed: {0}")]
    RenewRpcFailed(#[source] VaultError),

    #[error("renewal stopped")]
    ExplicitStop,
}

impl ExpiryCause {
    /// Every terminal state except an explicit stop ends the credential's life.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ExplicitStop)
    }
}
