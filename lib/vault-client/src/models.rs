use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::auth::TokenMetadata;
use crate::error::ExpiryCause;

/// Response envelope returned by Vault for reads, writes and renewals
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Secret {
    #[serde(default)]
    pub request_id: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub lease_id: Option<String>,
    #[serde(default, with = "seconds")]
    pub lease_duration: Duration,
    #[serde(default)]
    pub renewable: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
    #[serde(default)]
    pub auth: Option<SecretAuth>,
}

impl Secret {
    /// String field from the payload, `None` when absent or not a string
    pub fn field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }
}

/// Login block of a Vault response
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SecretAuth {
    pub client_token: String,
    #[serde(default)]
    pub accessor: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub policies: Vec<String>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
    #[serde(default, with = "seconds")]
    pub lease_duration: Duration,
    #[serde(default)]
    pub renewable: bool,
}

impl fmt::Debug for SecretAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretAuth")
            .field("accessor", &self.accessor)
            .field("policies", &self.policies)
            .field("metadata", &self.metadata)
            .field("lease_duration", &self.lease_duration)
            .field("renewable", &self.renewable)
            .finish_non_exhaustive()
    }
}

/// Session token and what is known about its validity window
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub accessor: String,
    pub lease_id: Option<String>,
    pub creation_ttl: Duration,
    pub max_ttl: Duration,
    pub lease_duration: Duration,
    pub renewable: bool,
}

impl Credential {
    /// Token handed over as-is; everything else is learnt from lookup-self
    pub fn static_token(token: String) -> Self {
        Self {
            token,
            accessor: String::new(),
            lease_id: None,
            creation_ttl: Duration::ZERO,
            max_ttl: Duration::ZERO,
            lease_duration: Duration::ZERO,
            renewable: false,
        }
    }

    pub fn from_auth(auth: &SecretAuth) -> Self {
        Self {
            token: auth.client_token.clone(),
            accessor: auth.accessor.clone(),
            lease_id: None,
            creation_ttl: auth.lease_duration,
            max_ttl: Duration::ZERO,
            lease_duration: auth.lease_duration,
            renewable: auth.renewable,
        }
    }

    /// Snapshot enriched with lookup-self data. The token itself never changes.
    pub fn with_metadata(self, metadata: &TokenMetadata) -> Self {
        Self {
            accessor: if metadata.accessor.is_empty() {
                self.accessor
            } else {
                metadata.accessor.clone()
            },
            creation_ttl: metadata.creation_ttl,
            max_ttl: metadata.max_ttl,
            lease_duration: metadata.ttl,
            renewable: metadata.renewable,
            ..self
        }
    }

    /// Snapshot produced by a successful renew-self
    pub(crate) fn renewed(&self, auth: &SecretAuth) -> Self {
        Self {
            token: if auth.client_token.is_empty() {
                self.token.clone()
            } else {
                auth.client_token.clone()
            },
            accessor: if auth.accessor.is_empty() {
                self.accessor.clone()
            } else {
                auth.accessor.clone()
            },
            lease_duration: auth.lease_duration,
            renewable: auth.renewable,
            ..self.clone()
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("accessor", &self.accessor)
            .field("lease_id", &self.lease_id)
            .field("creation_ttl", &self.creation_ttl)
            .field("max_ttl", &self.max_ttl)
            .field("lease_duration", &self.lease_duration)
            .field("renewable", &self.renewable)
            .finish()
    }
}

/// Lease attached to a secret read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub lease_id: String,
    pub lease_duration: Duration,
    pub renewable: bool,
}

/// What a renewer keeps alive, along with its latest snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Renewable {
    Token(Credential),
    Lease(Lease),
}

impl Renewable {
    pub fn lease_duration(&self) -> Duration {
        match self {
            Self::Token(credential) => credential.lease_duration,
            Self::Lease(lease) => lease.lease_duration,
        }
    }

    pub fn is_renewable(&self) -> bool {
        match self {
            Self::Token(credential) => credential.renewable,
            Self::Lease(lease) => lease.renewable,
        }
    }

    /// Identifier safe to log: accessor for tokens, lease id for leases
    pub fn id(&self) -> &str {
        match self {
            Self::Token(credential) => &credential.accessor,
            Self::Lease(lease) => &lease.lease_id,
        }
    }
}

#[derive(Debug)]
pub enum RenewalEvent {
    Renewed {
        renewal: Renewable,
        renewed_at: DateTime<Utc>,
    },
    Expired {
        cause: ExpiryCause,
    },
}

mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn empty_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.is_empty()))
}
