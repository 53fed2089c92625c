//! # AWS Authentication
//!
//! Builds the shared SDK configuration and resolves the identity recorded
//! as the author of new versions.

use crate::config::StoreConfig;
use crate::constants::UNKNOWN_ACTOR;
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_secretsmanager::error::DisplayErrorContext;
use tracing::{debug, info, warn};

/// Create AWS SDK config using the default credential chain
///
/// The SDK's own retry layer is disabled; every call goes through the
/// store's [`crate::store::RetryPolicy`] instead.
pub async fn create_sdk_config(config: &StoreConfig) -> SdkConfig {
    let mut builder =
        aws_config::defaults(BehaviorVersion::latest()).retry_config(RetryConfig::disabled());

    if let Some(region) = &config.region {
        builder = builder.region(aws_config::Region::new(region.clone()));
    }

    if let Some(endpoint) = &config.endpoint {
        info!("Routing AWS requests to endpoint override {}", endpoint);
        builder = builder.endpoint_url(endpoint);
    }

    builder.load().await
}

/// Identity recorded on new versions
///
/// An explicit actor wins. Otherwise the caller ARN from STS is used, and
/// `"unknown"` if that lookup fails.
pub async fn resolve_actor(config: &StoreConfig, sdk_config: &SdkConfig) -> String {
    if let Some(actor) = &config.actor {
        return actor.clone();
    }

    let client = aws_sdk_sts::Client::new(sdk_config);
    match client.get_caller_identity().send().await {
        Ok(identity) => match identity.arn() {
            Some(arn) => {
                debug!("Resolved caller identity {}", arn);
                arn.to_string()
            }
            None => UNKNOWN_ACTOR.to_string(),
        },
        Err(e) => {
            warn!(
                "Failed to resolve caller identity, recording '{}' as author: {}",
                UNKNOWN_ACTOR,
                DisplayErrorContext(&e)
            );
            UNKNOWN_ACTOR.to_string()
        }
    }
}
