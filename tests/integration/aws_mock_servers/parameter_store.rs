//! Parameter Store against a mock SSM
//!
//! The mock keeps every native version of every parameter and answers the
//! history, by-path and describe calls the store issues.

use super::common::{self, field, MockClock, MockError, MockResult, MockService};
use futures::TryStreamExt;
use secret_store::provider::aws::ParameterStore;
use secret_store::{BackendKind, ChangeAction, SecretId, Store, StoreError, LATEST_VERSION};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Mutex;

const MOCK_USER: &str = "arn:aws:iam::000000000000:user/console";

struct MockParameterVersion {
    version: i64,
    value: String,
    created: f64,
}

#[derive(Default)]
pub struct MockParameterStore {
    clock: MockClock,
    parameters: Mutex<BTreeMap<String, Vec<MockParameterVersion>>>,
}

fn parameter_not_found(name: &str) -> MockError {
    MockError::bad_request("ParameterNotFound", format!("Parameter {name} not found."))
}

/// Direct child of `path`, as matched by a one-level path query
fn is_direct_child(name: &str, path: &str) -> bool {
    name.strip_prefix(path)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|leaf| !leaf.is_empty() && !leaf.contains('/'))
}

fn parameter_json(name: &str, latest: &MockParameterVersion) -> Value {
    json!({
        "Name": name,
        "Type": "SecureString",
        "Value": latest.value,
        "Version": latest.version,
        "LastModifiedDate": latest.created,
        "ARN": format!("arn:aws:ssm:us-east-1:000000000000:parameter{name}"),
        "DataType": "text"
    })
}

impl MockParameterStore {
    /// Parameter versions written outside the store
    pub fn seed(&self, name: &str, values: &[&str]) {
        let mut parameters = self.parameters.lock().unwrap();
        let versions = parameters.entry(name.to_string()).or_default();
        for value in values {
            let version = i64::try_from(versions.len()).unwrap() + 1;
            versions.push(MockParameterVersion {
                version,
                value: (*value).to_string(),
                created: self.clock.tick(),
            });
        }
    }

    pub fn native_versions(&self, name: &str) -> usize {
        self.parameters.lock().unwrap().get(name).map_or(0, Vec::len)
    }
}

impl MockService for MockParameterStore {
    fn handle(&self, operation: &str, request: &Value) -> MockResult {
        let mut parameters = self.parameters.lock().unwrap();
        match operation {
            "PutParameter" => {
                let name = field(request, "Name").unwrap_or_default().to_string();
                let overwrite = request.get("Overwrite").and_then(Value::as_bool).unwrap_or(false);
                if parameters.contains_key(&name) && !overwrite {
                    return Err(MockError::bad_request(
                        "ParameterAlreadyExists",
                        format!("The parameter {name} already exists."),
                    ));
                }
                if field(request, "Type") != Some("SecureString") {
                    return Err(MockError::bad_request(
                        "ValidationException",
                        "the store only writes SecureString parameters",
                    ));
                }
                let versions = parameters.entry(name).or_default();
                let version = i64::try_from(versions.len()).unwrap() + 1;
                versions.push(MockParameterVersion {
                    version,
                    value: field(request, "Value").unwrap_or_default().to_string(),
                    created: self.clock.tick(),
                });
                Ok(json!({ "Version": version, "Tier": "Standard" }))
            }
            "GetParameterHistory" => {
                let name = field(request, "Name").unwrap_or_default();
                let versions = parameters.get(name).ok_or_else(|| parameter_not_found(name))?;
                let history: Vec<Value> = versions
                    .iter()
                    .map(|v| {
                        let mut entry = parameter_json(name, v);
                        entry["LastModifiedUser"] = json!(MOCK_USER);
                        entry
                    })
                    .collect();
                Ok(json!({ "Parameters": history }))
            }
            "GetParametersByPath" => {
                let path = field(request, "Path").unwrap_or_default();
                let found: Vec<Value> = parameters
                    .iter()
                    .filter(|(name, _)| is_direct_child(name, path))
                    .filter_map(|(name, versions)| versions.last().map(|v| parameter_json(name, v)))
                    .collect();
                Ok(json!({ "Parameters": found }))
            }
            "DescribeParameters" => {
                let paths: Vec<&str> = request
                    .get("ParameterFilters")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter(|filter| {
                        field(filter, "Key") == Some("Path") && field(filter, "Option") == Some("OneLevel")
                    })
                    .filter_map(|filter| filter.get("Values").and_then(Value::as_array))
                    .flatten()
                    .filter_map(Value::as_str)
                    .collect();
                let found: Vec<Value> = parameters
                    .iter()
                    .filter(|(name, _)| paths.iter().any(|path| is_direct_child(name, path)))
                    .filter_map(|(name, versions)| {
                        versions.last().map(|v| {
                            json!({
                                "Name": name,
                                "Type": "SecureString",
                                "Version": v.version,
                                "LastModifiedDate": v.created
                            })
                        })
                    })
                    .collect();
                Ok(json!({ "Parameters": found }))
            }
            other => Err(MockError::bad_request(
                "UnknownOperationException",
                format!("unsupported operation {other}"),
            )),
        }
    }
}

async fn setup() -> (common::MockServer<MockParameterStore>, ParameterStore) {
    let server = common::start(MockParameterStore::default()).await;
    let sdk_config = common::sdk_config(&server.endpoint).await;
    let config = common::store_config(BackendKind::ParameterStore, &server.endpoint);
    let store = ParameterStore::new(&sdk_config, &config, "alice".to_string());
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

    store.delete(&id).await.unwrap();
    assert_eq!(server.service.native_versions("/billing/api_key"), 3);
    assert!(store.read(&id, LATEST_VERSION).await.unwrap_err().is_not_found());
    assert!(store.read(&id, 3).await.unwrap_err().is_not_found());
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
}

#[tokio::test]
async fn test_native_version_is_the_counter() {
    let (server, store) = setup().await;
    server.service.seed("/billing/api_key", &["plain-1", "plain-2"]);

    let first = store.read(&api_key(), 1).await.unwrap();
    assert_eq!(first.value.as_deref(), Some("plain-1"));
    assert_eq!(first.meta.created_by, MOCK_USER);

    assert_eq!(store.write(&api_key(), "sk_live_abc").await.unwrap(), 3);
    let latest = store.read(&api_key(), LATEST_VERSION).await.unwrap();
    assert_eq!(latest.meta.version, 3);
    assert_eq!(latest.value.as_deref(), Some("sk_live_abc"));
}

#[tokio::test]
async fn test_list_drops_deleted_parameters() {
    let (server, store) = setup().await;
    store.write(&api_key(), "sk_live_abc").await.unwrap();
    store.write(&api_key(), "sk_live_def").await.unwrap();
    let password = SecretId::new("billing", "db_password");
    store.write(&password, "hunter2").await.unwrap();
    store.delete(&password).await.unwrap();
    server.service.seed("/billing/nested/deep", &["x"]);
    server.service.seed("/payments/token", &["tok"]);

    let bare = store.list("billing", false).await.unwrap();
    let keys: Vec<&str> = bare.iter().map(|s| s.meta.key.as_str()).collect();
    assert_eq!(keys, vec!["billing/api_key"]);
    assert_eq!(bare[0].meta.version, 2);
    assert!(bare[0].value.is_none());

    let full = store.list("billing", true).await.unwrap();
    assert_eq!(full[0].value.as_deref(), Some("sk_live_def"));

    let mut raw: Vec<String> = store
        .list_raw("billing")
        .map_ok(|entry| entry.name)
        .try_collect()
        .await
        .unwrap();
    raw.sort();
    assert_eq!(raw, vec!["/billing/api_key", "/billing/db_password"]);

    assert!(store.list("", false).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rotate_is_not_supported() {
    let (server, store) = setup().await;
    store.write(&api_key(), "sk_live_abc").await.unwrap();
    server.clear_calls();

    assert!(!store.supports_rotation());
    assert!(matches!(
        store.rotate(&api_key()).await,
        Err(StoreError::NotSupported { backend: "ssm", operation: "rotate" })
    ));
    assert!(server.calls().is_empty());
    assert_eq!(server.service.native_versions("/billing/api_key"), 1);
}

#[tokio::test]
async fn test_non_positive_selector_makes_no_calls() {
    let (server, store) = setup().await;
    store.write(&api_key(), "sk_live_abc").await.unwrap();
    server.clear_calls();

    assert!(store.read(&api_key(), 0).await.unwrap_err().is_not_found());
    assert!(server.calls().is_empty(), "calls: {:?}", server.calls());
}
