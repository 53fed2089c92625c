//! # Constants
//!
//! Defaults and well-known names shared across backends.

/// Version selector meaning "the latest live version"
pub const LATEST_VERSION: i64 = -1;

/// Separator between service and key in canonical secret names
pub const NAME_SEPARATOR: char = '/';

/// Prefix required on KMS key aliases
pub const KMS_ALIAS_PREFIX: &str = "alias/";

/// Default KMS key alias for AWS Secrets Manager
pub const DEFAULT_SECRETS_MANAGER_KEY_ALIAS: &str = "alias/secrets_manager_key";

/// Default KMS key alias for SSM Parameter Store
pub const DEFAULT_PARAMETER_STORE_KEY_ALIAS: &str = "alias/parameter_store_key";

/// Prefix required on local key file references
pub const FILE_KEY_PREFIX: &str = "file:";

/// Extension appended to the store path to locate the default key file
pub const DEFAULT_FILE_KEY_EXTENSION: &str = "key";

/// Default path of the local encrypted store
pub const DEFAULT_FILE_PATH: &str = "secrets.json";

/// Default number of retries for backend calls
pub const DEFAULT_RETRIES: u32 = 10;

/// Base delay between retries (milliseconds)
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 100;

/// Upper bound on the delay between retries (milliseconds)
pub const MAX_RETRY_DELAY_MS: u64 = 5_000;

/// Author recorded when no identity can be resolved
pub const UNKNOWN_ACTOR: &str = "unknown";

/// Version id prefix used for rotation requests in AWS Secrets Manager
pub const ROTATION_TOKEN_PREFIX: &str = "rotate-";

/// Page size for paginated listing calls
pub const LIST_PAGE_SIZE: i32 = 50;

/// Length in bytes of values generated by local rotation
pub const ROTATED_VALUE_BYTES: usize = 32;

// Environment variables read by `StoreConfig::from_env`
pub const ENV_BACKEND: &str = "SECRET_STORE_BACKEND";
pub const ENV_KMS_KEY_ALIAS: &str = "SECRET_STORE_KMS_KEY_ALIAS";
pub const ENV_RETRIES: &str = "SECRET_STORE_RETRIES";
pub const ENV_REGION: &str = "SECRET_STORE_REGION";
pub const ENV_ENDPOINT: &str = "SECRET_STORE_ENDPOINT";
pub const ENV_FILE: &str = "SECRET_STORE_FILE";
pub const ENV_ACTOR: &str = "SECRET_STORE_ACTOR";
