//! # Store Contract
//!
//! The interface every backend implements, plus the machinery they share:
//!
//! - `versioning`: deterministic version numbering and latest/specific resolution
//! - `record`: the JSON envelope stored as each native revision's value
//! - `retry`: retry policy applied to every native call

pub mod record;
pub mod retry;
pub mod versioning;

use crate::error::Result;
use crate::model::{ChangeEvent, RawSecret, Secret, SecretId};
use async_trait::async_trait;
use futures::stream::BoxStream;

pub use record::VersionRecord;
pub use retry::{Idempotency, RetryPolicy};
pub use versioning::{Revision, VersionEntry, VersionHistory};

/// Uniform contract over a physical secret system
///
/// Implementations are safe to share across tasks. There is no
/// compare-and-swap: two concurrent writers both succeed and produce two
/// versions in backend order.
#[async_trait]
pub trait Store: Send + Sync + std::fmt::Debug {
    /// Short backend name used in logs, metrics and errors
    fn backend(&self) -> &'static str;

    /// Whether [`Store::rotate`] is available
    fn supports_rotation(&self) -> bool {
        false
    }

    /// Append a new version and return its number
    async fn write(&self, id: &SecretId, value: &str) -> Result<u64>;

    /// Read a version; [`crate::LATEST_VERSION`] selects the latest live one
    async fn read(&self, id: &SecretId, version: i64) -> Result<Secret>;

    /// Latest version of every live secret in a service, sorted by key
    async fn list(&self, service: &str, include_values: bool) -> Result<Vec<Secret>>;

    /// Lazily enumerate native entries for a service without decrypting values
    fn list_raw<'a>(&'a self, service: &'a str) -> BoxStream<'a, Result<RawSecret>>;

    /// Audit trail, oldest first
    async fn history(&self, id: &SecretId) -> Result<Vec<ChangeEvent>>;

    /// Append a deletion marker
    async fn delete(&self, id: &SecretId) -> Result<()>;

    /// Trigger the backend's native rotation
    async fn rotate(&self, id: &SecretId) -> Result<()>;
}
