use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use vault_client::VaultConfig;

pub const CONFIG_ENV_VAR: &str = "APP_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings JSON: {0}")]
    JsonParse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub vault: VaultConfig,
    pub secret: SecretSettings,
}

/// Secret read at start-up
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecretSettings {
    pub path: Option<String>,
    /// Keep the secret's lease alive
    pub renew: bool,
}

impl Default for SecretSettings {
    fn default() -> Self {
        Self {
            path: None,
            renew: true,
        }
    }
}

impl AppSettings {
    /// Settings file from `APP_CONFIG` (or `config.json`), then environment overrides.
    /// A missing default file means defaults; a missing explicit file is an error.
    pub fn load() -> Result<Self, SettingsError> {
        let environ: HashMap<String, String> = std::env::vars().collect();
        let settings = match environ.get(CONFIG_ENV_VAR) {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH)?,
            None => {
                tracing::info!("No settings file, using defaults");
                Self::default()
            }
        };
        Ok(settings.apply_env(&environ))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        tracing::debug!("Load settings from file {:?} ...", path);
        let contents = std::fs::read_to_string(path).map_err(|source| SettingsError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(contents)?)
    }

    /// `VAULT_ADDR` wins over the configured server
    pub fn apply_env(mut self, environ: &HashMap<String, String>) -> Self {
        if let Some(address) = environ.get("VAULT_ADDR").filter(|a| !a.is_empty()) {
            self.vault.server = address.clone();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_from_json() {
        let settings = AppSettings::from_json(
            r#"{
                "vault": {
                    "server": "http://vault:8200",
                    "authentication": "kubernetes",
                    "role": "order",
                    "jwt": "/var/run/secrets/kubernetes.io/serviceaccount/token"
                },
                "secret": {"path": "database/creds/order"}
            }"#,
        )
        .unwrap();

        assert_eq!(settings.vault.server, "http://vault:8200");
        assert_eq!(settings.vault.authentication, "kubernetes");
        assert_eq!(settings.secret.path.as_deref(), Some("database/creds/order"));
        assert!(settings.secret.renew);
    }

    #[test]
    fn test_empty_json_gives_defaults() {
        let settings = AppSettings::from_json("{}").unwrap();
        assert_eq!(settings.vault.authentication, "token");
        assert!(settings.secret.path.is_none());
    }

    #[test]
    fn test_vault_addr_override() {
        let environ = HashMap::from([("VAULT_ADDR".to_string(), "https://vault.prod:8200".to_string())]);
        let settings = AppSettings::default().apply_env(&environ);
        assert_eq!(settings.vault.server, "https://vault.prod:8200");

        let settings = AppSettings::default().apply_env(&HashMap::new());
        assert_eq!(settings.vault.server, "http://127.0.0.1:8200");
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"vault": {{"token": "s.abc"}}}}"#).unwrap();

        let settings = AppSettings::from_file(file.path()).unwrap();
        assert_eq!(settings.vault.token.as_deref(), Some("s.abc"));
    }

    #[test]
    fn test_missing_file() {
        let result = AppSettings::from_file("/nonexistent/config.json");
        assert!(matches!(result, Err(SettingsError::FileRead { .. })));
    }

    #[test]
    fn test_invalid_json() {
        let result = AppSettings::from_json("{not json");
        assert!(matches!(result, Err(SettingsError::JsonParse(_))));
    }
}
