//! # Backend Providers
//!
//! Concrete [`Store`] implementations and the factory that picks one:
//!
//! - `aws`: Secrets Manager and SSM Parameter Store
//! - `file`: local AES-GCM encrypted JSON document

pub mod aws;
pub mod file;

use crate::config::{BackendKind, StoreConfig};
use crate::error::Result;
use crate::store::Store;
use tracing::info;

/// Build the store selected by `config.backend`
///
/// AWS backends share one SDK configuration and resolve the caller identity
/// once at construction.
///
/// # Errors
///
/// Returns an error if the backend cannot be initialized (for the file
/// backend, if the key file cannot be read or created).
pub async fn create_store(config: &StoreConfig) -> Result<Box<dyn Store>> {
    info!("Creating {} secret store", config.backend);

    match config.backend {
        BackendKind::SecretsManager => {
            let sdk_config = aws::auth::create_sdk_config(config).await;
            let actor = aws::auth::resolve_actor(config, &sdk_config).await;
            Ok(Box::new(aws::SecretsManagerStore::new(&sdk_config, config, actor)))
        }
        BackendKind::ParameterStore => {
            let sdk_config = aws::auth::create_sdk_config(config).await;
            let actor = aws::auth::resolve_actor(config, &sdk_config).await;
            Ok(Box::new(aws::ParameterStore::new(&sdk_config, config, actor)))
        }
        BackendKind::File => Ok(Box::new(file::FileStore::open(config).await?)),
    }
}
