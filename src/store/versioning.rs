//! # Version Resolution
//!
//! Turns a backend's native revisions into a numbered history and answers
//! latest/specific-version reads against it.
//!
//! Numbering is a deterministic monotonic counter. Each revision takes
//! `max(recorded, previous + 1)`, so recorded numbers are honoured when they
//! increase, gaps are preserved, duplicates from racing writers are pushed
//! forward, and revisions without a recorded number (written outside this
//! crate) slot in after their predecessor.

use crate::constants::LATEST_VERSION;
use crate::error::{Result, StoreError};
use crate::model::{ChangeAction, ChangeEvent, Secret, SecretId, SecretMetadata};
use chrono::{DateTime, Utc};
use std::fmt;

/// One native revision as read from a backend, before numbering
#[derive(Clone, PartialEq, Eq)]
pub struct Revision {
    /// Version recorded by the writer or the backend's native counter
    pub recorded_version: Option<u64>,
    pub action: ChangeAction,
    /// Plaintext value; `None` for deletion markers
    pub value: Option<String>,
    pub created: DateTime<Utc>,
    pub created_by: String,
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Revision")
            .field("recorded_version", &self.recorded_version)
            .field("action", &self.action)
            .field("created", &self.created)
            .field("created_by", &self.created_by)
            .finish_non_exhaustive()
    }
}

/// A numbered revision
#[derive(Clone, PartialEq, Eq)]
pub struct VersionEntry {
    pub version: u64,
    pub action: ChangeAction,
    pub value: Option<String>,
    pub created: DateTime<Utc>,
    pub created_by: String,
}

impl fmt::Debug for VersionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionEntry")
            .field("version", &self.version)
            .field("action", &self.action)
            .field("created", &self.created)
            .field("created_by", &self.created_by)
            .finish_non_exhaustive()
    }
}

impl VersionEntry {
    pub fn is_deleted(&self) -> bool {
        self.action == ChangeAction::Deleted
    }

    pub fn to_secret(&self, id: &SecretId) -> Secret {
        Secret {
            value: self.value.clone(),
            meta: SecretMetadata {
                created: self.created,
                created_by: self.created_by.clone(),
                version: self.version,
                key: id.name(),
            },
        }
    }

    pub fn to_change_event(&self) -> ChangeEvent {
        ChangeEvent {
            version: self.version,
            action: self.action,
            user: self.created_by.clone(),
            time: self.created,
        }
    }
}

/// Numbered history of a single secret, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionHistory {
    entries: Vec<VersionEntry>,
}

impl VersionHistory {
    /// Number revisions in chronological order
    ///
    /// Ties on timestamp are broken by recorded version; revisions without
    /// one sort after those that have it.
    pub fn from_revisions(mut revisions: Vec<Revision>) -> Self {
        revisions.sort_by_key(|r| (r.created, r.recorded_version.unwrap_or(u64::MAX)));
        Self::from_ordered(revisions)
    }

    /// Number revisions already in backend order
    pub fn from_ordered(revisions: Vec<Revision>) -> Self {
        let mut entries: Vec<VersionEntry> = Vec::with_capacity(revisions.len());
        let mut previous = 0u64;

        for revision in revisions {
            let version = match revision.recorded_version {
                Some(recorded) if recorded > previous => recorded,
                _ => previous + 1,
            };
            let action = if entries.is_empty() && revision.action == ChangeAction::Updated {
                ChangeAction::Created
            } else {
                revision.action
            };
            previous = version;
            entries.push(VersionEntry {
                version,
                action,
                value: revision.value,
                created: revision.created,
                created_by: revision.created_by,
            });
        }

        Self { entries }
    }

    pub fn entries(&self) -> &[VersionEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest version, deletion markers included
    pub fn latest(&self) -> Option<&VersionEntry> {
        self.entries.last()
    }

    /// Highest version unless it is a deletion marker
    pub fn latest_live(&self) -> Option<&VersionEntry> {
        self.latest().filter(|entry| !entry.is_deleted())
    }

    pub fn is_live(&self) -> bool {
        self.latest_live().is_some()
    }

    /// Number the next appended revision will receive
    pub fn next_version(&self) -> u64 {
        self.latest().map_or(1, |entry| entry.version + 1)
    }

    /// Action recorded for the next write: a write after deletion re-creates
    pub fn next_write_action(&self) -> ChangeAction {
        if self.is_live() {
            ChangeAction::Updated
        } else {
            ChangeAction::Created
        }
    }

    /// Reject a selector that can never match, before any history is loaded
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] unless `version` is [`LATEST_VERSION`] or
    /// positive.
    pub fn check_selector(id: &SecretId, version: i64) -> Result<()> {
        if version == LATEST_VERSION || version >= 1 {
            Ok(())
        } else {
            Err(StoreError::not_found(format!("{id} version {version}")))
        }
    }

    /// Resolve a version selector
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the selector matches nothing, points at
    /// a deletion marker, or is neither [`LATEST_VERSION`] nor positive.
    pub fn resolve(&self, id: &SecretId, version: i64) -> Result<&VersionEntry> {
        Self::check_selector(id, version)?;
        if version == LATEST_VERSION {
            return self.latest_live().ok_or_else(|| StoreError::not_found(id.name()));
        }

        let wanted = u64::try_from(version)
            .ok()
            .ok_or_else(|| StoreError::not_found(format!("{id} version {version}")))?;

        self.entries
            .iter()
            .find(|entry| entry.version == wanted && !entry.is_deleted())
            .ok_or_else(|| StoreError::not_found(format!("{id} version {version}")))
    }

    pub fn change_events(&self) -> Vec<ChangeEvent> {
        self.entries.iter().map(VersionEntry::to_change_event).collect()
    }
}
