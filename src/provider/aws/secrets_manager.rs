//! # AWS Secrets Manager Store
//!
//! Stores each secret as one Secrets Manager secret named `{service}/{key}`.
//!
//! Every native revision written by this store carries a [`VersionRecord`]
//! envelope, so version numbers, actions, deletion markers and authors
//! survive alongside the value. Revisions written by a rotation function
//! have no envelope; they are recognised by their `rotate-` version id.

use crate::config::{resolve_key_reference, StoreConfig};
use crate::constants::{
    DEFAULT_SECRETS_MANAGER_KEY_ALIAS, KMS_ALIAS_PREFIX, LIST_PAGE_SIZE, NAME_SEPARATOR,
    ROTATION_TOKEN_PREFIX,
};
use crate::error::{Result, StoreError};
use crate::model::{ChangeAction, ChangeEvent, RawSecret, Secret, SecretId};
use crate::observability;
use crate::provider::aws::errors::map_sdk_error;
use crate::provider::aws::to_chrono;
use crate::store::record::revision_from_native;
use crate::store::{Idempotency, RetryPolicy, Store, VersionHistory, VersionRecord};
use crate::validation::{validate_id, validate_name};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_secretsmanager::operation::create_secret::CreateSecretError;
use aws_sdk_secretsmanager::types::{Filter, FilterNameStringType};
use aws_sdk_secretsmanager::Client;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::time::Instant;
use tracing::{debug, field, info, info_span, Instrument};
use uuid::Uuid;

const BACKEND: &str = "secretsmanager";

/// Store backed by AWS Secrets Manager
#[derive(Clone)]
pub struct SecretsManagerStore {
    client: Client,
    kms_key_id: String,
    actor: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for SecretsManagerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretsManagerStore")
            .field("kms_key_id", &self.kms_key_id)
            .field("actor", &self.actor)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Native revision id and creation time
struct NativeVersion {
    version_id: String,
    created: DateTime<Utc>,
}

impl SecretsManagerStore {
    pub fn new(sdk_config: &SdkConfig, config: &StoreConfig, actor: String) -> Self {
        let kms_key_id = resolve_key_reference(
            config.key_alias.as_deref(),
            DEFAULT_SECRETS_MANAGER_KEY_ALIAS,
            KMS_ALIAS_PREFIX,
        );
        info!(
            "Using AWS Secrets Manager with KMS key {} (retries: {})",
            kms_key_id, config.retries
        );
        Self {
            client: Client::new(sdk_config),
            kms_key_id,
            actor,
            retry: RetryPolicy::new(config.retries),
        }
    }

    pub fn kms_key_id(&self) -> &str {
        &self.kms_key_id
    }

    /// Native secret name for an id
    pub fn secret_name(id: &SecretId) -> String {
        id.name()
    }

    /// Reverse of [`Self::secret_name`]
    pub fn parse_secret_name(name: &str) -> Option<SecretId> {
        SecretId::from_name(name)
    }

    /// All native revision ids of a secret, deprecated ones included
    async fn version_ids(&self, name: &str) -> Result<Vec<NativeVersion>> {
        let mut versions = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let token = next_token.as_deref();
            let page = self
                .retry
                .run("list_secret_version_ids", Idempotency::Idempotent, move || async move {
                    self.client
                        .list_secret_version_ids()
                        .secret_id(name)
                        .include_deprecated(true)
                        .max_results(LIST_PAGE_SIZE)
                        .set_next_token(token.map(str::to_string))
                        .send()
                        .await
                        .map_err(|e| map_sdk_error("list_secret_version_ids", name, e))
                })
                .await?;

            for entry in page.versions() {
                let Some(version_id) = entry.version_id() else {
                    continue;
                };
                versions.push(NativeVersion {
                    version_id: version_id.to_string(),
                    created: entry
                        .created_date()
                        .and_then(to_chrono)
                        .unwrap_or_else(Utc::now),
                });
            }

            match page.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(versions)
    }

    /// Value of one native revision; `None` if it was purged or holds binary data
    async fn version_value(&self, name: &str, version_id: &str) -> Result<Option<String>> {
        let result = self
            .retry
            .run("get_secret_value", Idempotency::Idempotent, move || async move {
                self.client
                    .get_secret_value()
                    .secret_id(name)
                    .version_id(version_id)
                    .send()
                    .await
                    .map_err(|e| map_sdk_error("get_secret_value", name, e))
            })
            .await;

        match result {
            Ok(output) => Ok(output.secret_string().map(str::to_string)),
            Err(e) if e.is_not_found() => {
                debug!("Version {} of {} disappeared while reading history", version_id, name);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Numbered history of a secret; empty if the secret does not exist
    async fn load_history(&self, id: &SecretId) -> Result<VersionHistory> {
        let name = Self::secret_name(id);
        let versions = match self.version_ids(&name).await {
            Ok(versions) => versions,
            Err(e) if e.is_not_found() => return Ok(VersionHistory::default()),
            Err(e) => return Err(e),
        };

        let mut revisions = Vec::with_capacity(versions.len());
        for version in versions {
            let Some(raw) = self.version_value(&name, &version.version_id).await? else {
                continue;
            };
            let raw_action = if version.version_id.starts_with(ROTATION_TOKEN_PREFIX) {
                ChangeAction::Rotated
            } else {
                ChangeAction::Updated
            };
            revisions.push(revision_from_native(&raw, version.created, None, raw_action));
        }

        Ok(VersionHistory::from_revisions(revisions))
    }

    /// Append an envelope as a new native revision, creating the secret if needed
    async fn put_record(&self, name: &str, create: bool, record: &VersionRecord) -> Result<()> {
        let payload = record.encode()?;
        let payload = payload.as_str();
        // Reusing the token across retries lets AWS deduplicate a repeated request
        let token = Uuid::new_v4().to_string();
        let token = token.as_str();

        if create {
            let created = self
                .retry
                .run("create_secret", Idempotency::Mutating, move || async move {
                    match self
                        .client
                        .create_secret()
                        .name(name)
                        .kms_key_id(&self.kms_key_id)
                        .secret_string(payload)
                        .client_request_token(token)
                        .send()
                        .await
                    {
                        Ok(_) => Ok(true),
                        Err(e)
                            if e.as_service_error()
                                .is_some_and(CreateSecretError::is_resource_exists_exception) =>
                        {
                            Ok(false)
                        }
                        Err(e) => Err(map_sdk_error("create_secret", name, e)),
                    }
                })
                .await?;
            if created {
                return Ok(());
            }
            debug!("Secret {} was created concurrently, appending a version instead", name);
        }

        self.retry
            .run("put_secret_value", Idempotency::Mutating, move || async move {
                self.client
                    .put_secret_value()
                    .secret_id(name)
                    .secret_string(payload)
                    .client_request_token(token)
                    .send()
                    .await
                    .map_err(|e| map_sdk_error("put_secret_value", name, e))
            })
            .await?;
        Ok(())
    }

    async fn rotation_enabled(&self, name: &str) -> Result<bool> {
        let output = self
            .retry
            .run("describe_secret", Idempotency::Idempotent, move || async move {
                self.client
                    .describe_secret()
                    .secret_id(name)
                    .send()
                    .await
                    .map_err(|e| map_sdk_error("describe_secret", name, e))
            })
            .await?;
        Ok(output.rotation_enabled().unwrap_or(false))
    }

    /// One page of `ListSecrets` for a service
    async fn list_page(
        &self,
        service: &str,
        token: Option<String>,
    ) -> Result<(Vec<RawSecret>, Option<String>)> {
        let prefix = format!("{service}{NAME_SEPARATOR}");
        let prefix = prefix.as_str();
        let token = token.as_deref();

        let output = self
            .retry
            .run("list_secrets", Idempotency::Idempotent, move || async move {
                let filter = Filter::builder()
                    .key(FilterNameStringType::Name)
                    .values(prefix)
                    .build();
                self.client
                    .list_secrets()
                    .filters(filter)
                    .max_results(LIST_PAGE_SIZE)
                    .set_next_token(token.map(str::to_string))
                    .send()
                    .await
                    .map_err(|e| map_sdk_error("list_secrets", prefix, e))
            })
            .await?;

        // The name filter is a case-insensitive prefix match; keep exact service matches only
        let entries = output
            .secret_list()
            .iter()
            .filter_map(|entry| {
                let name = entry.name()?;
                let id = Self::parse_secret_name(name)?;
                (id.service == service).then(|| RawSecret {
                    id,
                    name: name.to_string(),
                    last_modified: entry.last_changed_date().and_then(to_chrono),
                })
            })
            .collect();

        Ok((entries, output.next_token().map(str::to_string)))
    }
}

#[async_trait]
impl Store for SecretsManagerStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn supports_rotation(&self) -> bool {
        true
    }

    async fn write(&self, id: &SecretId, value: &str) -> Result<u64> {
        validate_id(id)?;
        let name = Self::secret_name(id);
        let span = info_span!(
            "secretsmanager.secret.write",
            secret.name = %name,
            operation.version = field::Empty,
            operation.success = field::Empty,
            operation.duration_ms = field::Empty,
            error.kind = field::Empty
        );
        let start = Instant::now();

        let result: Result<u64> = async {
            let history = self.load_history(id).await?;
            let version = history.next_version();
            let action = history.next_write_action();
            let record = VersionRecord::new(version, action, value, &self.actor);
            self.put_record(&name, history.is_empty(), &record).await?;
            info!("Wrote {} version {} ({})", name, version, action);
            Ok(version)
        }
        .instrument(span.clone())
        .await;

        if let Ok(version) = &result {
            span.record("operation.version", *version);
        }
        observability::complete(&span, BACKEND, "write", start, &result);
        result
    }

    async fn read(&self, id: &SecretId, version: i64) -> Result<Secret> {
        validate_id(id)?;
        let name = Self::secret_name(id);
        let span = tracing::debug_span!(
            "secretsmanager.secret.read",
            secret.name = %name,
            operation.version = version,
            operation.success = field::Empty,
            operation.duration_ms = field::Empty,
            error.kind = field::Empty
        );
        let start = Instant::now();

        let result: Result<Secret> = async {
            VersionHistory::check_selector(id, version)?;
            let history = self.load_history(id).await?;
            history.resolve(id, version).map(|entry| entry.to_secret(id))
        }
        .instrument(span.clone())
        .await;

        observability::complete(&span, BACKEND, "read", start, &result);
        result
    }

    /// Latest live version of every secret in the service
    ///
    /// Numbering needs each secret's full revision history, so this costs one
    /// `ListSecretVersionIds` plus one `GetSecretValue` per native revision
    /// for every listed secret, whether or not values are returned. Use
    /// [`Store::list_raw`] when names are enough.
    async fn list(&self, service: &str, include_values: bool) -> Result<Vec<Secret>> {
        if !validate_name(service) {
            return Ok(Vec::new());
        }
        let span = tracing::debug_span!(
            "secretsmanager.secret.list",
            service = service,
            operation.include_values = include_values,
            operation.success = field::Empty,
            operation.duration_ms = field::Empty,
            error.kind = field::Empty
        );
        let start = Instant::now();

        let result: Result<Vec<Secret>> = async {
            let entries: Vec<RawSecret> = self.list_raw(service).try_collect().await?;
            let mut secrets = Vec::with_capacity(entries.len());
            for entry in entries {
                let history = self.load_history(&entry.id).await?;
                if let Some(latest) = history.latest_live() {
                    let mut secret = latest.to_secret(&entry.id);
                    if !include_values {
                        secret.value = None;
                    }
                    secrets.push(secret);
                }
            }
            secrets.sort_by(|a, b| a.meta.key.cmp(&b.meta.key));
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

        // State is the token of the next page to fetch; `None` once the last page is read
        stream::try_unfold(Some(None::<String>), move |state| async move {
            let Some(token) = state else {
                return Ok(None);
            };
            let (entries, next_token) = self.list_page(service, token).await?;
            Ok::<_, StoreError>(Some((entries, next_token.map(Some))))
        })
        .map_ok(|entries| stream::iter(entries.into_iter().map(Ok)))
        .try_flatten()
        .boxed()
    }

    async fn history(&self, id: &SecretId) -> Result<Vec<ChangeEvent>> {
        validate_id(id)?;
        let name = Self::secret_name(id);
        let span = tracing::debug_span!(
            "secretsmanager.secret.history",
            secret.name = %name,
            operation.success = field::Empty,
            operation.duration_ms = field::Empty,
            error.kind = field::Empty
        );
        let start = Instant::now();

        let result: Result<Vec<ChangeEvent>> = async {
            let history = self.load_history(id).await?;
            if history.is_empty() {
                return Err(StoreError::not_found(name.clone()));
            }
            Ok(history.change_events())
        }
        .instrument(span.clone())
        .await;

        observability::complete(&span, BACKEND, "history", start, &result);
        result
    }

    async fn delete(&self, id: &SecretId) -> Result<()> {
        validate_id(id)?;
        let name = Self::secret_name(id);
        let span = info_span!(
            "secretsmanager.secret.delete",
            secret.name = %name,
            operation.success = field::Empty,
            operation.duration_ms = field::Empty,
            error.kind = field::Empty
        );
        let start = Instant::now();

        let result: Result<()> = async {
            let history = self.load_history(id).await?;
            if !history.is_live() {
                return Err(StoreError::not_found(name.clone()));
            }
            let record = VersionRecord::tombstone(history.next_version(), &self.actor);
            self.put_record(&name, false, &record).await?;
            info!("Deleted {} at version {}", name, record.version);
            Ok(())
        }
        .instrument(span.clone())
        .await;

        observability::complete(&span, BACKEND, "delete", start, &result);
        result
    }

    async fn rotate(&self, id: &SecretId) -> Result<()> {
        validate_id(id)?;
        let name = Self::secret_name(id);
        let span = info_span!(
            "secretsmanager.secret.rotate",
            secret.name = %name,
            operation.success = field::Empty,
            operation.duration_ms = field::Empty,
            error.kind = field::Empty
        );
        let start = Instant::now();

        let result: Result<()> = async {
            let history = self.load_history(id).await?;
            if !history.is_live() {
                return Err(StoreError::not_found(name.clone()));
            }
            if !self.rotation_enabled(&name).await? {
                return Err(StoreError::NotSupported {
                    backend: BACKEND,
                    operation: "rotate",
                });
            }

            let name = name.as_str();
            let token = format!("{ROTATION_TOKEN_PREFIX}{}", Uuid::new_v4().simple());
            let token = token.as_str();
            self.retry
                .run("rotate_secret", Idempotency::Mutating, move || async move {
                    self.client
                        .rotate_secret()
                        .secret_id(name)
                        .client_request_token(token)
                        .rotate_immediately(true)
                        .send()
                        .await
                        .map_err(|e| map_sdk_error("rotate_secret", name, e))
                })
                .await?;
            info!("Triggered rotation of {} ({})", name, token);
            Ok(())
        }
        .instrument(span.clone())
        .await;

        observability::complete(&span, BACKEND, "rotate", start, &result);
        result
    }
}
