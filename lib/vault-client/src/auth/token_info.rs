use crate::error::{LookupError, VaultError};
use crate::store::SecretStore;
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Token information reported by lookup-self
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenMetadata {
    #[serde(default)]
    pub accessor: String,
    #[serde(deserialize_with = "ttl_seconds")]
    pub creation_ttl: Duration,
    #[serde(rename = "explicit_max_ttl", deserialize_with = "ttl_seconds")]
    pub max_ttl: Duration,
    #[serde(default, deserialize_with = "ttl_seconds")]
    pub ttl: Duration,
    pub renewable: bool,
}

impl TokenMetadata {
    /// Validating decode of the raw lookup-self data map
    pub fn from_data(data: serde_json::Map<String, serde_json::Value>) -> Result<Self, LookupError> {
        serde_json::from_value(serde_json::Value::Object(data))
            .map_err(|e| LookupError::Invalid(format!("malformed token metadata: {}", e)))
    }
}

/// Looks up the token's own metadata
pub struct TokenInspector<'a> {
    store: &'a dyn SecretStore,
}

impl<'a> TokenInspector<'a> {
    pub fn new(store: &'a dyn SecretStore) -> Self {
        Self { store }
    }

    pub async fn lookup_self(&self, token: &str) -> Result<TokenMetadata, LookupError> {
        let data = self.store.lookup_self(token).await.map_err(|e| match e {
            VaultError::ClientError { status, .. } if (400..500).contains(&status) => {
                LookupError::Invalid(e.to_string())
            }
            VaultError::InvalidResponse(message) => LookupError::Invalid(message),
            other => LookupError::Transport(other),
        })?;

        TokenMetadata::from_data(data)
    }
}

/// Whole seconds from a JSON integer or a decimal integer string. Floats are refused
/// so a TTL never goes through a lossy conversion.
fn ttl_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    struct SecondsVisitor;

    impl Visitor<'_> for SecondsVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a non-negative whole number of seconds")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
            u64::try_from(v)
                .map(Duration::from_secs)
                .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
            v.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
        }
    }

    deserializer.deserialize_any(SecondsVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_decode_numbers() {
        let metadata = TokenMetadata::from_data(data(json!({
            "accessor": "acc-1",
            "creation_ttl": 2764800,
            "explicit_max_ttl": 0,
            "ttl": 2764790,
            "renewable": true,
            "policies": ["default"]
        })))
        .unwrap();

        assert_eq!(metadata.accessor, "acc-1");
        assert_eq!(metadata.creation_ttl, Duration::from_secs(2764800));
        assert_eq!(metadata.max_ttl, Duration::ZERO);
        assert_eq!(metadata.ttl, Duration::from_secs(2764790));
        assert!(metadata.renewable);
    }

    #[test]
    fn test_decode_decimal_strings() {
        let metadata = TokenMetadata::from_data(data(json!({
            "creation_ttl": "18446744073709551615",
            "explicit_max_ttl": "86400",
            "renewable": false
        })))
        .unwrap();

        assert_eq!(metadata.creation_ttl, Duration::from_secs(u64::MAX));
        assert_eq!(metadata.max_ttl, Duration::from_secs(86400));
        assert_eq!(metadata.ttl, Duration::ZERO);
        assert!(!metadata.renewable);
    }

    #[test]
    fn test_missing_field_is_invalid() {
        let result = TokenMetadata::from_data(data(json!({
            "creation_ttl": 60,
            "renewable": true
        })));
        assert!(matches!(result, Err(LookupError::Invalid(ref m)) if m.contains("explicit_max_ttl")));
    }

    #[test]
    fn test_mistyped_fields_are_invalid() {
        let float_ttl = TokenMetadata::from_data(data(json!({
            "creation_ttl": 60.5,
            "explicit_max_ttl": 0,
            "renewable": true
        })));
        assert!(matches!(float_ttl, Err(LookupError::Invalid(_))));

        let negative_ttl = TokenMetadata::from_data(data(json!({
            "creation_ttl": -1,
            "explicit_max_ttl": 0,
            "renewable": true
        })));
        assert!(matches!(negative_ttl, Err(LookupError::Invalid(_))));

        let string_flag = TokenMetadata::from_data(data(json!({
            "creation_ttl": 60,
            "explicit_max_ttl": 0,
            "renewable": "true"
        })));
        assert!(matches!(string_flag, Err(LookupError::Invalid(_))));
    }
}
