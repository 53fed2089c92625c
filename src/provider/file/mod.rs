//! # Local File Store
//!
//! Keeps every secret in one JSON document on disk:
//!
//! ```json
//! { "secrets": { "billing/api_key": [ { "version": 1, "action": "created", ... } ] } }
//! ```
//!
//! Values are encrypted with AES-256-GCM (see [`cipher`]). Appends hold an
//! exclusive lock on `<path>.lock` from load until the new document has been
//! renamed into place, so writers in other handles and other processes
//! never lose each other's versions. Readers take no lock; the rename is
//! atomic, so they never observe a partial write.

pub mod cipher;
mod lock;

use crate::config::{resolve_key_reference, StoreConfig};
use crate::constants::{
    DEFAULT_FILE_KEY_EXTENSION, FILE_KEY_PREFIX, NAME_SEPARATOR, UNKNOWN_ACTOR,
};
use crate::error::{BackendError, Result, StoreError};
use crate::model::{ChangeAction, ChangeEvent, RawSecret, Secret, SecretId};
use crate::observability;
use crate::store::{Idempotency, RetryPolicy, Revision, Store, VersionEntry, VersionHistory};
use crate::validation::{validate_id, validate_name};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cipher::FileCipher;
use lock::FileLock;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, field, info, info_span, Instrument};
use uuid::Uuid;

const BACKEND: &str = "file";

/// Convert an I/O error, classifying interruptions and timeouts as transient
pub(crate) fn io_error(operation: &str, path: &Path, e: &std::io::Error) -> StoreError {
    let message = format!("{}: {e}", path.display());
    match e.kind() {
        ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock => {
            BackendError::transient(operation, message).into()
        }
        _ => BackendError::permanent(operation, message).into(),
    }
}

/// On-disk document
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    secrets: BTreeMap<String, Vec<StoredVersion>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredVersion {
    version: u64,
    action: ChangeAction,
    /// base64(nonce || ciphertext); absent on deletion markers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ciphertext: Option<String>,
    created_by: String,
    created: DateTime<Utc>,
}

/// What an append records
enum Change {
    Write(String),
    Delete,
    Rotate,
}

impl Change {
    fn operation(&self) -> &'static str {
        match self {
            Change::Write(_) => "write",
            Change::Delete => "delete",
            Change::Rotate => "rotate",
        }
    }
}

/// Store backed by an encrypted JSON file
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    key_path: PathBuf,
    cipher: FileCipher,
    actor: String,
    retry: RetryPolicy,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open the store described by `config`, creating the key file if needed
    ///
    /// The document itself is created on first write.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the key file cannot be read or created.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let key_path = Self::key_path(config);
        let cipher = FileCipher::load_or_create(&key_path).await?;
        let actor = config
            .actor
            .clone()
            .unwrap_or_else(|| UNKNOWN_ACTOR.to_string());

        info!(
            "Using local file store {} with key file {}",
            config.file_path.display(),
            key_path.display()
        );

        Ok(Self {
            path: config.file_path.clone(),
            key_path,
            cipher,
            actor,
            retry: RetryPolicy::new(config.retries),
            write_lock: Mutex::new(()),
        })
    }

    /// Key file location: the `file:` override, else `<store path>.key`
    pub fn key_path(config: &StoreConfig) -> PathBuf {
        let default = format!(
            "{FILE_KEY_PREFIX}{}.{DEFAULT_FILE_KEY_EXTENSION}",
            config.file_path.display()
        );
        let reference = resolve_key_reference(config.key_alias.as_deref(), &default, FILE_KEY_PREFIX);
        PathBuf::from(reference.strip_prefix(FILE_KEY_PREFIX).unwrap_or(&reference))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key_file(&self) -> &Path {
        &self.key_path
    }

    async fn load(&self) -> Result<StoreDocument> {
        let path = self.path.as_path();
        let contents = self
            .retry
            .run("read_store", Idempotency::Idempotent, move || async move {
                match tokio::fs::read(path).await {
                    Ok(contents) => Ok(Some(contents)),
                    Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(io_error("read store", path, &e)),
                }
            })
            .await?;

        match contents {
            None => Ok(StoreDocument::default()),
            Some(contents) => serde_json::from_slice(&contents).map_err(|e| {
                BackendError::permanent("parse store", format!("{}: {e}", path.display())).into()
            }),
        }
    }

    /// Replace the document atomically: write a sibling temp file, then rename
    async fn save(&self, document: &StoreDocument) -> Result<()> {
        let contents = serde_json::to_vec_pretty(document)
            .map_err(|e| BackendError::permanent("encode store", e.to_string()))?;
        let contents = contents.as_slice();
        let path = self.path.as_path();

        let mut temp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        temp_name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
        let temp_path = path.with_file_name(temp_name);
        let temp_path = temp_path.as_path();

        self.retry
            .run("write_store", Idempotency::Mutating, move || async move {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| io_error("create store directory", parent, &e))?;
                }
                tokio::fs::write(temp_path, contents)
                    .await
                    .map_err(|e| io_error("write store", temp_path, &e))?;
                if let Err(e) = tokio::fs::rename(temp_path, path).await {
                    let _ = tokio::fs::remove_file(temp_path).await;
                    return Err(io_error("replace store", path, &e));
                }
                Ok::<(), StoreError>(())
            })
            .await
    }

    /// Numbered history with ciphertexts in place of values
    fn sealed_history(versions: &[StoredVersion]) -> VersionHistory {
        VersionHistory::from_ordered(
            versions
                .iter()
                .map(|stored| Revision {
                    recorded_version: Some(stored.version),
                    action: stored.action,
                    value: stored.ciphertext.clone(),
                    created: stored.created,
                    created_by: stored.created_by.clone(),
                })
                .collect(),
        )
    }

    fn open_secret(&self, id: &SecretId, entry: &VersionEntry) -> Result<Secret> {
        let mut secret = entry.to_secret(id);
        secret.value = entry
            .value
            .as_deref()
            .map(|sealed| self.cipher.decrypt(sealed, &secret.meta.key))
            .transpose()?;
        Ok(secret)
    }

    /// Append one version under the write locks; returns its number
    async fn append(&self, id: &SecretId, change: Change) -> Result<u64> {
        let name = id.name();
        // In-process writers queue here instead of parking blocking threads on the file lock
        let _guard = self.write_lock.lock().await;
        let _file_lock = FileLock::acquire(&self.path).await?;
        let mut document = self.load().await?;

        let versions = document.secrets.entry(name.clone()).or_default();
        let history = Self::sealed_history(versions);

        let (action, value) = match change {
            Change::Write(value) => (history.next_write_action(), Some(value)),
            Change::Delete if history.is_live() => (ChangeAction::Deleted, None),
            Change::Rotate if history.is_live() => (ChangeAction::Rotated, Some(cipher::generate_value())),
            Change::Delete | Change::Rotate => return Err(StoreError::not_found(name)),
        };

        let version = history.next_version();
        let ciphertext = value
            .as_deref()
            .map(|plaintext| self.cipher.encrypt(plaintext, &name))
            .transpose()?;
        versions.push(StoredVersion {
            version,
            action,
            ciphertext,
            created_by: self.actor.clone(),
            created: Utc::now(),
        });

        self.save(&document).await?;
        info!("{} {} version {}", action, name, version);
        Ok(version)
    }

    async fn record_change(&self, id: &SecretId, change: Change) -> Result<u64> {
        validate_id(id)?;
        let operation = change.operation();
        let span = info_span!(
            "file.secret.append",
            secret.name = %id,
            operation.name = operation,
            operation.version = field::Empty,
            operation.success = field::Empty,
            operation.duration_ms = field::Empty,
            error.kind = field::Empty
        );
        let start = Instant::now();

        let result = self.append(id, change).instrument(span.clone()).await;

        if let Ok(version) = &result {
            span.record("operation.version", *version);
        }
        observability::complete(&span, BACKEND, operation, start, &result);
        result
    }
}

#[async_trait]
impl Store for FileStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn supports_rotation(&self) -> bool {
        true
    }

    async fn write(&self, id: &SecretId, value: &str) -> Result<u64> {
        self.record_change(id, Change::Write(value.to_string())).await
    }

    async fn read(&self, id: &SecretId, version: i64) -> Result<Secret> {
        validate_id(id)?;
        let span = tracing::debug_span!(
            "file.secret.read",
            secret.name = %id,
            operation.version = version,
            operation.success = field::Empty,
            operation.duration_ms = field::Empty,
            error.kind = field::Empty
        );
        let start = Instant::now();

        let result: Result<Secret> = async {
            VersionHistory::check_selector(id, version)?;
            let document = self.load().await?;
            let versions = document
                .secrets
                .get(&id.name())
                .ok_or_else(|| StoreError::not_found(id.name()))?;
            let history = Self::sealed_history(versions);
            let entry = history.resolve(id, version)?;
            self.open_secret(id, entry)
        }
        .instrument(span.clone())
        .await;

        observability::complete(&span, BACKEND, "read", start, &result);
        result
    }

    async fn list(&self, service: &str, include_values: bool) -> Result<Vec<Secret>> {
        if !validate_name(service) {
            return Ok(Vec::new());
        }
        let span = tracing::debug_span!(
            "file.secret.list",
            service = service,
            operation.include_values = include_values,
            operation.success = field::Empty,
            operation.duration_ms = field::Empty,
            error.kind = field::Empty
        );
        let start = Instant::now();

        let result: Result<Vec<Secret>> = async {
            let document = self.load().await?;
            let mut secrets = Vec::new();
            // BTreeMap order is canonical name order, i.e. sorted by key within a service
            for (name, versions) in &document.secrets {
                let Some(id) = SecretId::from_name(name).filter(|id| id.service == service) else {
                    continue;
                };
                let history = Self::sealed_history(versions);
                let Some(latest) = history.latest_live() else {
                    continue;
                };
                let secret = if include_values {
                    self.open_secret(&id, latest)?
                } else {
                    let mut secret = latest.to_secret(&id);
                    secret.value = None;
                    secret
                };
                secrets.push(secret);
            }
            Ok(secrets)
        }
        .instrument(span.clone())
        .await;

        observability::complete(&span, BACKEND, "list", start, &result);
        result
    }

    fn list_raw<'a>(&'a self, service: &'a str) -> BoxStream<'a, Result<RawSecret>> {
        if !validate_name(service) {
            return stream::empty().boxed();
        }
        let prefix = format!("{service}{NAME_SEPARATOR}");

        stream::once(self.load())
            .map_ok(move |document| {
                let entries: Vec<RawSecret> = document
                    .secrets
                    .range(prefix.clone()..)
                    .take_while(|(name, _)| name.starts_with(&prefix))
                    .filter_map(|(name, versions)| {
                        let id = SecretId::from_name(name)?;
                        Some(RawSecret {
                            id,
                            name: name.clone(),
                            last_modified: versions.last().map(|v| v.created),
                        })
                    })
                    .collect();
                debug!("Listed {} raw entries under {}", entries.len(), prefix);
                stream::iter(entries.into_iter().map(Ok))
            })
            .try_flatten()
            .boxed()
    }

    async fn history(&self, id: &SecretId) -> Result<Vec<ChangeEvent>> {
        validate_id(id)?;
        let span = tracing::debug_span!(
            "file.secret.history",
            secret.name = %id,
            operation.success = field::Empty,
            operation.duration_ms = field::Empty,
            error.kind = field::Empty
        );
        let start = Instant::now();

        let result: Result<Vec<ChangeEvent>> = async {
            let document = self.load().await?;
            document
                .secrets
                .get(&id.name())
                .filter(|versions| !versions.is_empty())
                .map(|versions| Self::sealed_history(versions).change_events())
                .ok_or_else(|| StoreError::not_found(id.name()))
        }
        .instrument(span.clone())
        .await;

        observability::complete(&span, BACKEND, "history", start, &result);
        result
    }

    async fn delete(&self, id: &SecretId) -> Result<()> {
        self.record_change(id, Change::Delete).await.map(|_| ())
    }

    async fn rotate(&self, id: &SecretId) -> Result<()> {
        self.record_change(id, Change::Rotate).await.map(|_| ())
    }
}
