//! # Secret Store
//!
//! A versioned secret store with interchangeable backends.
//!
//! Secrets are addressed by a [`SecretId`] (`service/key`) and every write
//! appends a new version. Callers obtain a [`Store`] from
//! [`provider::create_store`] and never branch on the backend in use:
//!
//! - **AWS Secrets Manager** - native revisions carry a JSON version envelope
//! - **AWS SSM Parameter Store** - `SecureString` parameters, native version counter
//! - **Local file** - AES-256-GCM encrypted JSON document
//!
//! ## Usage
//!
//! ```no_run
//! use secret_store::{provider, SecretId, StoreConfig, LATEST_VERSION};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let store = provider::create_store(&StoreConfig::from_env()).await?;
//! let id = SecretId::new("billing", "api_key");
//! store.write(&id, "sk_live_abc").await?;
//! let secret = store.read(&id, LATEST_VERSION).await?;
//! assert_eq!(secret.value.as_deref(), Some("sk_live_abc"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod model;
pub mod observability;
pub mod provider;
pub mod store;
pub mod validation;

pub use config::{BackendKind, StoreConfig};
pub use constants::LATEST_VERSION;
pub use error::{BackendError, Result, StoreError};
pub use model::{ChangeAction, ChangeEvent, RawSecret, Secret, SecretId, SecretMetadata};
pub use store::Store;
