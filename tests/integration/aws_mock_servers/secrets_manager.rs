//! Secrets Manager store against a mock Secrets Manager
//!
//! The mock keeps every version of every secret, honours client request
//! tokens and runs a stand-in rotation function that writes a plain value
//! under the rotation token.

use super::common::{self, field, MockClock, MockError, MockResult, MockService};
use futures::TryStreamExt;
use secret_store::provider::aws::SecretsManagerStore;
use secret_store::{BackendKind, ChangeAction, SecretId, Store, StoreError, LATEST_VERSION};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Mutex;

struct MockVersion {
    id: String,
    /// `None` for binary-only versions
    value: Option<String>,
    created: f64,
}

#[derive(Default)]
struct MockSecret {
    versions: Vec<MockVersion>,
    rotation_enabled: bool,
}

#[derive(Default)]
pub struct MockSecretsManager {
    clock: MockClock,
    secrets: Mutex<BTreeMap<String, MockSecret>>,
}

fn arn(name: &str) -> String {
    format!("arn:aws:secretsmanager:us-east-1:000000000000:secret:{name}")
}

fn not_found(name: &str) -> MockError {
    MockError::bad_request(
        "ResourceNotFoundException",
        format!("Secrets Manager can't find the specified secret: {name}"),
    )
}

impl MockSecretsManager {
    /// Secret created outside the store, holding only binary data
    pub fn seed_binary(&self, name: &str) {
        let created = self.clock.tick();
        self.secrets.lock().unwrap().insert(
            name.to_string(),
            MockSecret {
                versions: vec![MockVersion {
                    id: "binary-1".to_string(),
                    value: None,
                    created,
                }],
                rotation_enabled: false,
            },
        );
    }

    /// Secret created outside the store with a plain string value
    pub fn seed_plain(&self, name: &str, value: &str) {
        let created = self.clock.tick();
        self.secrets.lock().unwrap().insert(
            name.to_string(),
            MockSecret {
                versions: vec![MockVersion {
                    id: "console-1".to_string(),
                    value: Some(value.to_string()),
                    created,
                }],
                rotation_enabled: false,
            },
        );
    }

    pub fn enable_rotation(&self, name: &str) {
        if let Some(secret) = self.secrets.lock().unwrap().get_mut(name) {
            secret.rotation_enabled = true;
        }
    }

    /// Stored string values of a secret, oldest first
    pub fn stored_values(&self, name: &str) -> Vec<String> {
        self.secrets
            .lock()
            .unwrap()
            .get(name)
            .map(|secret| secret.versions.iter().filter_map(|v| v.value.clone()).collect())
            .unwrap_or_default()
    }

    fn append(&self, secret: &mut MockSecret, id: &str, value: Option<String>) {
        if secret.versions.iter().any(|v| v.id == id) {
            return;
        }
        secret.versions.push(MockVersion {
            id: id.to_string(),
            value,
            created: self.clock.tick(),
        });
    }
}

impl MockService for MockSecretsManager {
    fn handle(&self, operation: &str, request: &Value) -> MockResult {
        let mut secrets = self.secrets.lock().unwrap();
        match operation {
            "CreateSecret" => {
                let name = field(request, "Name").unwrap_or_default().to_string();
                if secrets.contains_key(&name) {
                    return Err(MockError::bad_request(
                        "ResourceExistsException",
                        format!("The operation failed because the secret {name} already exists."),
                    ));
                }
                let token = field(request, "ClientRequestToken").unwrap_or("initial").to_string();
                let mut secret = MockSecret::default();
                self.append(
                    &mut secret,
                    &token,
                    field(request, "SecretString").map(str::to_string),
                );
                secrets.insert(name.clone(), secret);
                Ok(json!({ "ARN": arn(&name), "Name": name, "VersionId": token }))
            }
            "PutSecretValue" => {
                let name = field(request, "SecretId").unwrap_or_default();
                let secret = secrets.get_mut(name).ok_or_else(|| not_found(name))?;
                let token = field(request, "ClientRequestToken").unwrap_or("put").to_string();
                self.append(secret, &token, field(request, "SecretString").map(str::to_string));
                Ok(json!({
                    "ARN": arn(name),
                    "Name": name,
                    "VersionId": token,
                    "VersionStages": ["AWSCURRENT"]
                }))
            }
            "ListSecretVersionIds" => {
                let name = field(request, "SecretId").unwrap_or_default();
                let secret = secrets.get(name).ok_or_else(|| not_found(name))?;
                let versions: Vec<Value> = secret
                    .versions
                    .iter()
                    .map(|v| json!({ "VersionId": v.id, "CreatedDate": v.created }))
                    .collect();
                Ok(json!({ "ARN": arn(name), "Name": name, "Versions": versions }))
            }
            "GetSecretValue" => {
                let name = field(request, "SecretId").unwrap_or_default();
                let secret = secrets.get(name).ok_or_else(|| not_found(name))?;
                let version = match field(request, "VersionId") {
                    Some(id) => secret.versions.iter().find(|v| v.id == id),
                    None => secret.versions.last(),
                }
                .ok_or_else(|| not_found(name))?;
                let mut output = json!({
                    "ARN": arn(name),
                    "Name": name,
                    "VersionId": version.id,
                    "CreatedDate": version.created
                });
                match &version.value {
                    Some(value) => output["SecretString"] = json!(value),
                    None => output["SecretBinary"] = json!("AAEC"),
                }
                Ok(output)
            }
            "DescribeSecret" => {
                let name = field(request, "SecretId").unwrap_or_default();
                let secret = secrets.get(name).ok_or_else(|| not_found(name))?;
                Ok(json!({
                    "ARN": arn(name),
                    "Name": name,
                    "RotationEnabled": secret.rotation_enabled
                }))
            }
            "RotateSecret" => {
                let name = field(request, "SecretId").unwrap_or_default();
                let secret = secrets.get_mut(name).ok_or_else(|| not_found(name))?;
                if !secret.rotation_enabled {
                    return Err(MockError::bad_request(
                        "InvalidRequestException",
                        "No Lambda rotation function ARN is associated with this secret.",
                    ));
                }
                let token = field(request, "ClientRequestToken").unwrap_or("rotation").to_string();
                let value = format!("lambda-{}", secret.versions.len());
                self.append(secret, &token, Some(value));
                Ok(json!({ "ARN": arn(name), "Name": name, "VersionId": token }))
            }
            "ListSecrets" => {
                let prefixes: Vec<String> = request
                    .get("Filters")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter(|filter| field(filter, "Key") == Some("name"))
                    .filter_map(|filter| filter.get("Values").and_then(Value::as_array))
                    .flatten()
                    .filter_map(Value::as_str)
                    .map(str::to_lowercase)
                    .collect();
                let list: Vec<Value> = secrets
                    .iter()
                    .filter(|(name, _)| {
                        prefixes.is_empty()
                            || prefixes.iter().any(|p| name.to_lowercase().starts_with(p))
                    })
                    .map(|(name, secret)| {
                        json!({
                            "ARN": arn(name),
                            "Name": name,
                            "LastChangedDate": secret.versions.last().map_or(0.0, |v| v.created)
                        })
                    })
                    .collect();
                Ok(json!({ "SecretList": list }))
            }
            other => Err(MockError::bad_request(
                "UnknownOperationException",
                format!("unsupported operation {other}"),
            )),
        }
    }
}

async fn setup() -> (common::MockServer<MockSecretsManager>, SecretsManagerStore) {
    let server = common::start(MockSecretsManager::default()).await;
    let sdk_config = common::sdk_config(&server.endpoint).await;
    let config = common::store_config(BackendKind::SecretsManager, &server.endpoint);
    let store = SecretsManagerStore::new(&sdk_config, &config, "alice".to_string());
    (server, store)
}

fn api_key() -> SecretId {
    SecretId::new("billing", "api_key")
}

#[tokio::test]
async fn test_write_read_delete_and_rewrite() {
    let (server, store) = setup().await;
    let id = api_key();

    assert_eq!(store.write(&id, "sk_live_abc").await.unwrap(), 1);
    assert_eq!(store.write(&id, "sk_live_def").await.unwrap(), 2);

    let latest = store.read(&id, LATEST_VERSION).await.unwrap();
    assert_eq!(latest.value.as_deref(), Some("sk_live_def"));
    assert_eq!(latest.meta.version, 2);
    assert_eq!(latest.meta.key, "billing/api_key");
    assert_eq!(latest.meta.created_by, "alice");
    assert_eq!(store.read(&id, 1).await.unwrap().value.as_deref(), Some("sk_live_abc"));

    // Every native revision is an envelope, never the bare value
    let stored = server.service.stored_values("billing/api_key");
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|raw| raw.contains("secret-store/v1")));

    store.delete(&id).await.unwrap();
    assert!(store.read(&id, LATEST_VERSION).await.unwrap_err().is_not_found());
    assert!(store.read(&id, 3).await.unwrap_err().is_not_found());
    assert_eq!(store.read(&id, 2).await.unwrap().value.as_deref(), Some("sk_live_def"));
    assert!(store.delete(&id).await.unwrap_err().is_not_found());

    assert_eq!(store.write(&id, "sk_live_ghi").await.unwrap(), 4);
    let actions: Vec<ChangeAction> = store
        .history(&id)
        .await
        .unwrap()
        .into_iter()
        .map(|event| event.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            ChangeAction::Created,
            ChangeAction::Updated,
            ChangeAction::Deleted,
            ChangeAction::Created
        ]
    );
    assert_eq!(store.read(&id, LATEST_VERSION).await.unwrap().meta.version, 4);
}

#[tokio::test]
async fn test_first_write_to_existing_secret_appends_a_version() {
    let (server, store) = setup().await;
    server.service.seed_binary("billing/api_key");

    assert_eq!(store.write(&api_key(), "sk_live_abc").await.unwrap(), 1);

    let calls = server.calls();
    let create = calls.iter().position(|c| c == "CreateSecret").unwrap();
    let put = calls.iter().position(|c| c == "PutSecretValue").unwrap();
    assert!(create < put, "calls: {calls:?}");

    let secret = store.read(&api_key(), LATEST_VERSION).await.unwrap();
    assert_eq!(secret.value.as_deref(), Some("sk_live_abc"));
    assert_eq!(secret.meta.version, 1);
}

#[tokio::test]
async fn test_values_written_outside_the_store_are_numbered() {
    let (server, store) = setup().await;
    server.service.seed_plain("billing/api_key", "from-console");

    let first = store.read(&api_key(), LATEST_VERSION).await.unwrap();
    assert_eq!(first.value.as_deref(), Some("from-console"));
    assert_eq!(first.meta.version, 1);
    assert_eq!(first.meta.created_by, "unknown");

    assert_eq!(store.write(&api_key(), "sk_live_abc").await.unwrap(), 2);
}

#[tokio::test]
async fn test_rotation_requires_enabled_rotation() {
    let (server, store) = setup().await;
    let id = api_key();

    assert!(store.rotate(&id).await.unwrap_err().is_not_found());

    store.write(&id, "sk_live_abc").await.unwrap();
    assert!(matches!(
        store.rotate(&id).await,
        Err(StoreError::NotSupported { operation: "rotate", .. })
    ));

    server.service.enable_rotation("billing/api_key");
    store.rotate(&id).await.unwrap();

    let latest = store.read(&id, LATEST_VERSION).await.unwrap();
    assert_eq!(latest.meta.version, 2);
    assert!(latest.value.as_deref().unwrap().starts_with("lambda-"));

    let history = store.history(&id).await.unwrap();
    assert_eq!(history.last().unwrap().action, ChangeAction::Rotated);
    assert_eq!(history.last().unwrap().version, 2);
}

#[tokio::test]
async fn test_list_and_list_raw() {
    let (server, store) = setup().await;
    store.write(&api_key(), "sk_live_abc").await.unwrap();
    store
        .write(&SecretId::new("billing", "db_password"), "hunter2")
        .await
        .unwrap();
    store
        .write(&SecretId::new("payments", "token"), "tok")
        .await
        .unwrap();
    store.delete(&SecretId::new("billing", "db_password")).await.unwrap();
    // Matched by the case-insensitive name filter, but another service
    server.service.seed_plain("Billing/shadow", "x");

    let bare = store.list("billing", false).await.unwrap();
    let keys: Vec<&str> = bare.iter().map(|s| s.meta.key.as_str()).collect();
    assert_eq!(keys, vec!["billing/api_key"]);
    assert!(bare[0].value.is_none());
    assert_eq!(bare[0].meta.version, 1);

    let full = store.list("billing", true).await.unwrap();
    assert_eq!(full[0].value.as_deref(), Some("sk_live_abc"));

    let mut raw: Vec<String> = store
        .list_raw("billing")
        .map_ok(|entry| entry.name)
        .try_collect()
        .await
        .unwrap();
    raw.sort();
    assert_eq!(raw, vec!["billing/api_key", "billing/db_password"]);

    assert!(store.list("", true).await.unwrap().is_empty());
    assert!(store.list("no/such", true).await.unwrap().is_empty());
    assert!(store.list("unknown", false).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_non_positive_selector_makes_no_calls() {
    let (server, store) = setup().await;
    store.write(&api_key(), "sk_live_abc").await.unwrap();
    server.clear_calls();

    for version in [0, -2] {
        assert!(store.read(&api_key(), version).await.unwrap_err().is_not_found());
    }
    assert!(server.calls().is_empty(), "calls: {:?}", server.calls());
}

#[tokio::test]
async fn test_history_of_unknown_secret_is_not_found() {
    let (_server, store) = setup().await;
    assert!(store.history(&api_key()).await.unwrap_err().is_not_found());
}
