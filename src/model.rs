//! # Data Model
//!
//! Identity and value types shared by every backend.

use crate::constants::NAME_SEPARATOR;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical address of a secret: a key within a service
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SecretId {
    pub service: String,
    pub key: String,
}

impl SecretId {
    pub fn new(service: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            key: key.into(),
        }
    }

    /// Canonical name: `{service}/{key}`
    pub fn name(&self) -> String {
        format!("{}{NAME_SEPARATOR}{}", self.service, self.key)
    }

    /// Reverse of [`SecretId::name`]
    ///
    /// Returns `None` unless the name has exactly one separator with
    /// non-empty segments on both sides.
    pub fn from_name(name: &str) -> Option<Self> {
        let (service, key) = name.split_once(NAME_SEPARATOR)?;
        if service.is_empty() || key.is_empty() || key.contains(NAME_SEPARATOR) {
            return None;
        }
        Some(Self::new(service, key))
    }
}

impl fmt::Display for SecretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{NAME_SEPARATOR}{}", self.service, self.key)
    }
}

/// Provenance of one version of a secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretMetadata {
    pub created: DateTime<Utc>,
    /// Identity of the writer (best effort on some backends)
    pub created_by: String,
    pub version: u64,
    /// Canonical name of the secret
    pub key: String,
}

/// One version's worth of secret data
///
/// `value` is only `None` in listings that were asked not to include values.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub value: Option<String>,
    pub meta: SecretMetadata,
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("value", &self.value.as_ref().map(|_| "<redacted>"))
            .field("meta", &self.meta)
            .finish()
    }
}

/// Backend-native listing entry, without values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSecret {
    pub id: SecretId,
    /// Backend-native resource name
    pub name: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// What happened to a secret at a given version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Created,
    Updated,
    Deleted,
    Rotated,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Created => "created",
            ChangeAction::Updated => "updated",
            ChangeAction::Deleted => "deleted",
            ChangeAction::Rotated => "rotated",
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in a secret's audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub version: u64,
    pub action: ChangeAction,
    pub user: String,
    pub time: DateTime<Utc>,
}
