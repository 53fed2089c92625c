//! # AWS SSM Parameter Store
//!
//! Stores each secret as a `SecureString` parameter at `/{service}/{key}`,
//! encrypted with the configured KMS key.
//!
//! The parameter value is a [`VersionRecord`] envelope. SSM's own integer
//! version is the version counter; parameters are never deleted natively,
//! so the counter never resets and deletion is recorded as a tombstone.

use crate::config::{resolve_key_reference, StoreConfig};
use crate::constants::{
    DEFAULT_PARAMETER_STORE_KEY_ALIAS, KMS_ALIAS_PREFIX, LIST_PAGE_SIZE, NAME_SEPARATOR,
};
use crate::error::{BackendError, Result, StoreError};
use crate::model::{ChangeAction, ChangeEvent, RawSecret, Secret, SecretId};
use crate::observability;
use crate::provider::aws::errors::map_sdk_error;
use crate::provider::aws::to_chrono;
use crate::store::record::revision_from_native;
use crate::store::{Idempotency, RetryPolicy, Revision, Store, VersionHistory, VersionRecord};
use crate::validation::{validate_id, validate_name};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ssm::types::{ParameterStringFilter, ParameterType};
use aws_sdk_ssm::Client;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::time::Instant;
use tracing::{debug, field, info, info_span, Instrument};

const BACKEND: &str = "ssm";

/// Store backed by SSM Parameter Store
#[derive(Clone)]
pub struct ParameterStore {
    client: Client,
    kms_key_id: String,
    actor: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ParameterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterStore")
            .field("kms_key_id", &self.kms_key_id)
            .field("actor", &self.actor)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ParameterStore {
    pub fn new(sdk_config: &SdkConfig, config: &StoreConfig, actor: String) -> Self {
        let kms_key_id = resolve_key_reference(
            config.key_alias.as_deref(),
            DEFAULT_PARAMETER_STORE_KEY_ALIAS,
            KMS_ALIAS_PREFIX,
        );
        info!(
            "Using SSM Parameter Store with KMS key {} (retries: {})",
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

    /// Fully qualified parameter name: `/{service}/{key}`
    pub fn parameter_name(id: &SecretId) -> String {
        format!("{NAME_SEPARATOR}{}", id.name())
    }

    /// Reverse of [`Self::parameter_name`]
    pub fn parse_parameter_name(name: &str) -> Option<SecretId> {
        SecretId::from_name(name.strip_prefix(NAME_SEPARATOR)?)
    }

    fn service_path(service: &str) -> String {
        format!("{NAME_SEPARATOR}{service}")
    }

    /// Numbered history of a parameter; empty if it does not exist
    async fn load_history(&self, id: &SecretId) -> Result<VersionHistory> {
        let name = Self::parameter_name(id);
        let name = name.as_str();
        let mut revisions: Vec<(i64, Revision)> = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let token = next_token.as_deref();
            let page = self
                .retry
                .run("get_parameter_history", Idempotency::Idempotent, move || async move {
                    self.client
                        .get_parameter_history()
                        .name(name)
                        .with_decryption(true)
                        .max_results(LIST_PAGE_SIZE)
                        .set_next_token(token.map(str::to_string))
                        .send()
                        .await
                        .map_err(|e| map_sdk_error("get_parameter_history", name, e))
                })
                .await;

            let page = match page {
                Ok(page) => page,
                Err(e) if e.is_not_found() => return Ok(VersionHistory::default()),
                Err(e) => return Err(e),
            };

            for parameter in page.parameters() {
                let Some(raw) = parameter.value() else {
                    continue;
                };
                let created = parameter
                    .last_modified_date()
                    .and_then(to_chrono)
                    .unwrap_or_else(Utc::now);
                let mut revision = revision_from_native(
                    raw,
                    created,
                    parameter.last_modified_user(),
                    ChangeAction::Updated,
                );
                // The native counter is authoritative
                revision.recorded_version = u64::try_from(parameter.version()).ok();
                revisions.push((parameter.version(), revision));
            }

            match page.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        revisions.sort_by_key(|(native_version, _)| *native_version);
        Ok(VersionHistory::from_ordered(
            revisions.into_iter().map(|(_, revision)| revision).collect(),
        ))
    }

    /// Overwrite the parameter with an envelope; returns the native version
    async fn put_record(&self, name: &str, record: &VersionRecord) -> Result<u64> {
        let payload = record.encode()?;
        let payload = payload.as_str();

        let output = self
            .retry
            .run("put_parameter", Idempotency::Mutating, move || async move {
                self.client
                    .put_parameter()
                    .name(name)
                    .value(payload)
                    .r#type(ParameterType::SecureString)
                    .key_id(&self.kms_key_id)
                    .overwrite(true)
                    .send()
                    .await
                    .map_err(|e| map_sdk_error("put_parameter", name, e))
            })
            .await?;

        Ok(u64::try_from(output.version()).unwrap_or(record.version))
    }

    /// Latest value of every parameter directly under the service path
    async fn parameters_by_path(&self, service: &str) -> Result<Vec<Secret>> {
        let path = Self::service_path(service);
        let path = path.as_str();
        let mut secrets = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let token = next_token.as_deref();
            let page = self
                .retry
                .run("get_parameters_by_path", Idempotency::Idempotent, move || async move {
                    self.client
                        .get_parameters_by_path()
                        .path(path)
                        .recursive(false)
                        .with_decryption(true)
                        .set_next_token(token.map(str::to_string))
                        .send()
                        .await
                        .map_err(|e| map_sdk_error("get_parameters_by_path", path, e))
                })
                .await?;

            for parameter in page.parameters() {
                let (Some(name), Some(raw)) = (parameter.name(), parameter.value()) else {
                    continue;
                };
                let Some(id) = Self::parse_parameter_name(name) else {
                    debug!("Skipping parameter {} outside the store's naming scheme", name);
                    continue;
                };
                let created = parameter
                    .last_modified_date()
                    .and_then(to_chrono)
                    .unwrap_or_else(Utc::now);
                let mut revision = revision_from_native(raw, created, None, ChangeAction::Updated);
                revision.recorded_version = u64::try_from(parameter.version()).ok();
                // A single revision numbers from its recorded version
                let history = VersionHistory::from_ordered(vec![revision]);
                if let Some(latest) = history.latest_live() {
                    secrets.push(latest.to_secret(&id));
                }
            }

            match page.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(secrets)
    }

    /// One page of `DescribeParameters` for a service
    async fn describe_page(
        &self,
        service: &str,
        token: Option<String>,
    ) -> Result<(Vec<RawSecret>, Option<String>)> {
        let path = Self::service_path(service);
        let filter = ParameterStringFilter::builder()
            .key("Path")
            .option("OneLevel")
            .values(path.clone())
            .build()
            .map_err(|e| BackendError::permanent("describe_parameters", e.to_string()))?;
        let filter = &filter;
        let path = path.as_str();
        let token = token.as_deref();

        let output = self
            .retry
            .run("describe_parameters", Idempotency::Idempotent, move || async move {
                self.client
                    .describe_parameters()
                    .parameter_filters(filter.clone())
                    .max_results(LIST_PAGE_SIZE)
                    .set_next_token(token.map(str::to_string))
                    .send()
                    .await
                    .map_err(|e| map_sdk_error("describe_parameters", path, e))
            })
            .await?;

        let entries = output
            .parameters()
            .iter()
            .filter_map(|parameter| {
                let name = parameter.name()?;
                let id = Self::parse_parameter_name(name)?;
                (id.service == service).then(|| RawSecret {
                    id,
                    name: name.to_string(),
                    last_modified: parameter.last_modified_date().and_then(to_chrono),
                })
            })
            .collect();

        Ok((entries, output.next_token().map(str::to_string)))
    }
}

#[async_trait]
impl Store for ParameterStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn write(&self, id: &SecretId, value: &str) -> Result<u64> {
        validate_id(id)?;
        let name = Self::parameter_name(id);
        let span = info_span!(
            "ssm.parameter.write",
            secret.name = %name,
            operation.version = field::Empty,
            operation.success = field::Empty,
            operation.duration_ms = field::Empty,
            error.kind = field::Empty
        );
        let start = Instant::now();

        let result: Result<u64> = async {
            let history = self.load_history(id).await?;
            let action = history.next_write_action();
            let record = VersionRecord::new(history.next_version(), action, value, &self.actor);
            let version = self.put_record(&name, &record).await?;
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
        let name = Self::parameter_name(id);
        let span = tracing::debug_span!(
            "ssm.parameter.read",
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

    async fn list(&self, service: &str, include_values: bool) -> Result<Vec<Secret>> {
        if !validate_name(service) {
            return Ok(Vec::new());
        }
        let span = tracing::debug_span!(
            "ssm.parameter.list",
            service = service,
            operation.include_values = include_values,
            operation.success = field::Empty,
            operation.duration_ms = field::Empty,
            error.kind = field::Empty
        );
        let start = Instant::now();

        let result: Result<Vec<Secret>> = async {
            let mut secrets = self.parameters_by_path(service).await?;
            if !include_values {
                for secret in &mut secrets {
                    secret.value = None;
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

        stream::try_unfold(Some(None::<String>), move |state| async move {
            let Some(token) = state else {
                return Ok(None);
            };
            let (entries, next_token) = self.describe_page(service, token).await?;
            Ok::<_, StoreError>(Some((entries, next_token.map(Some))))
        })
        .map_ok(|entries| stream::iter(entries.into_iter().map(Ok)))
        .try_flatten()
        .boxed()
    }

    async fn history(&self, id: &SecretId) -> Result<Vec<ChangeEvent>> {
        validate_id(id)?;
        let name = Self::parameter_name(id);
        let span = tracing::debug_span!(
            "ssm.parameter.history",
            secret.name = %name,
            operation.success = field::Empty,
            operation.duration_ms = field::Empty,
            error.kind = field::Empty
        );
        let start = Instant::now();

        let result: Result<Vec<ChangeEvent>> = async {
            let history = self.load_history(id).await?;
            if history.is_empty() {
                return Err(StoreError::not_found(id.name()));
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
        let name = Self::parameter_name(id);
        let span = info_span!(
            "ssm.parameter.delete",
            secret.name = %name,
            operation.success = field::Empty,
            operation.duration_ms = field::Empty,
            error.kind = field::Empty
        );
        let start = Instant::now();

        let result: Result<()> = async {
            let history = self.load_history(id).await?;
            if !history.is_live() {
                return Err(StoreError::not_found(id.name()));
            }
            let record = VersionRecord::tombstone(history.next_version(), &self.actor);
            let version = self.put_record(&name, &record).await?;
            info!("Deleted {} at version {}", name, version);
            Ok(())
        }
        .instrument(span.clone())
        .await;

        observability::complete(&span, BACKEND, "delete", start, &result);
        result
    }

    async fn rotate(&self, id: &SecretId) -> Result<()> {
        validate_id(id)?;
        let result: Result<()> = Err(StoreError::NotSupported {
            backend: BACKEND,
            operation: "rotate",
        });
        observability::metrics::observe(BACKEND, "rotate", Instant::now(), &result);
        result
    }
}
