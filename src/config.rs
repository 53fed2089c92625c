//! # Store Configuration
//!
//! Explicit configuration handed to [`crate::provider::create_store`].
//!
//! Backends never read the environment themselves. [`StoreConfig::from_env`]
//! is the single place environment variables are consulted, and every value
//! has a sensible default.

use crate::constants::{
    DEFAULT_FILE_PATH, DEFAULT_RETRIES, ENV_ACTOR, ENV_BACKEND, ENV_ENDPOINT, ENV_FILE,
    ENV_KMS_KEY_ALIAS, ENV_REGION, ENV_RETRIES,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

/// Which physical secret system backs the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackendKind {
    /// AWS Secrets Manager
    #[default]
    SecretsManager,
    /// AWS Systems Manager Parameter Store
    ParameterStore,
    /// Local AES-GCM encrypted JSON file
    File,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::SecretsManager => "secretsmanager",
            BackendKind::ParameterStore => "ssm",
            BackendKind::File => "file",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "secretsmanager" | "secrets-manager" | "asm" => Ok(BackendKind::SecretsManager),
            "ssm" | "parameterstore" | "parameter-store" => Ok(BackendKind::ParameterStore),
            "file" => Ok(BackendKind::File),
            other => Err(format!(
                "unknown backend '{other}'. Expected one of: secretsmanager, ssm, file"
            )),
        }
    }
}

/// Backend selection and connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    pub backend: BackendKind,
    /// Encryption key override (KMS alias, or `file:<path>` for the file backend)
    pub key_alias: Option<String>,
    /// Maximum retries applied to every backend call
    pub retries: u32,
    /// AWS region; falls back to the SDK's default chain when unset
    pub region: Option<String>,
    /// Endpoint override (e.g. localstack)
    pub endpoint: Option<String>,
    /// Location of the local encrypted store
    pub file_path: PathBuf,
    /// Identity recorded as the author of new versions
    pub actor: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            key_alias: None,
            retries: DEFAULT_RETRIES,
            region: None,
            endpoint: None,
            file_path: PathBuf::from(DEFAULT_FILE_PATH),
            actor: None,
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let backend = match env_var_non_empty(ENV_BACKEND) {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!("{}: {}, using {}", ENV_BACKEND, e, BackendKind::default());
                BackendKind::default()
            }),
            None => BackendKind::default(),
        };

        Self {
            backend,
            key_alias: env_var_non_empty(ENV_KMS_KEY_ALIAS),
            retries: env_var_or_default(ENV_RETRIES, DEFAULT_RETRIES),
            region: env_var_non_empty(ENV_REGION),
            endpoint: env_var_non_empty(ENV_ENDPOINT),
            file_path: env_var_non_empty(ENV_FILE)
                .map_or_else(|| PathBuf::from(DEFAULT_FILE_PATH), PathBuf::from),
            actor: env_var_non_empty(ENV_ACTOR),
        }
    }
}

/// Resolve the encryption key reference for a backend
///
/// An explicit override wins over the default. An override missing the
/// backend's prefix gets it prepended rather than being rejected.
pub fn resolve_key_reference(override_value: Option<&str>, default: &str, prefix: &str) -> String {
    match override_value.map(str::trim).filter(|v| !v.is_empty()) {
        None => default.to_string(),
        Some(value) if value.starts_with(prefix) => value.to_string(),
        Some(value) => format!("{prefix}{value}"),
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: FromStr>(key: &str, default: T) -> T
where
    <T as FromStr>::Err: fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_var_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
