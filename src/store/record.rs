//! # Version Record
//!
//! JSON envelope stored as the value of every native revision written by
//! this crate. It carries what the native systems cannot: the recorded
//! version number, the change action, deletion markers and the author.
//!
//! Values that do not parse as an envelope were written by something else
//! (a rotation function, the console) and are treated as raw values.

use crate::constants::UNKNOWN_ACTOR;
use crate::error::{BackendError, Result};
use crate::model::ChangeAction;
use crate::store::versioning::Revision;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Envelope format marker
pub const RECORD_FORMAT: &str = "secret-store/v1";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub format: String,
    pub version: u64,
    pub action: ChangeAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub created_by: String,
}

impl fmt::Debug for VersionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionRecord")
            .field("version", &self.version)
            .field("action", &self.action)
            .field("created_by", &self.created_by)
            .finish_non_exhaustive()
    }
}

impl VersionRecord {
    pub fn new(version: u64, action: ChangeAction, value: &str, created_by: &str) -> Self {
        Self {
            format: RECORD_FORMAT.to_string(),
            version,
            action,
            value: Some(value.to_string()),
            created_by: created_by.to_string(),
        }
    }

    pub fn tombstone(version: u64, created_by: &str) -> Self {
        Self {
            format: RECORD_FORMAT.to_string(),
            version,
            action: ChangeAction::Deleted,
            value: None,
            created_by: created_by.to_string(),
        }
    }

    /// # Errors
    ///
    /// Returns a permanent backend error if serialization fails.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            BackendError::permanent("encode version record", e.to_string()).into()
        })
    }

    /// Parse an envelope; `None` for anything else
    pub fn decode(raw: &str) -> Option<Self> {
        serde_json::from_str::<Self>(raw)
            .ok()
            .filter(|record| record.format == RECORD_FORMAT)
    }

    pub fn into_revision(self, created: DateTime<Utc>) -> Revision {
        let value = if self.action == ChangeAction::Deleted {
            None
        } else {
            self.value
        };
        Revision {
            recorded_version: Some(self.version),
            action: self.action,
            value,
            created,
            created_by: self.created_by,
        }
    }
}

/// Interpret one native revision
///
/// Envelopes keep their recorded fields. Raw values become a revision with
/// no recorded version, authored by `native_author` when the backend knows it.
pub fn revision_from_native(
    raw: &str,
    created: DateTime<Utc>,
    native_author: Option<&str>,
    raw_action: ChangeAction,
) -> Revision {
    match VersionRecord::decode(raw) {
        Some(record) => {
            let mut revision = record.into_revision(created);
            if revision.created_by.is_empty() {
                revision.created_by = native_author.unwrap_or(UNKNOWN_ACTOR).to_string();
            }
            revision
        }
        None => Revision {
            recorded_version: None,
            action: raw_action,
            value: Some(raw.to_string()),
            created,
            created_by: native_author.unwrap_or(UNKNOWN_ACTOR).to_string(),
        },
    }
}
