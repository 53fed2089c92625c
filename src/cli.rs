//! # SECRETCTL CLI
//!
//! Command-line interface over any configured secret store backend.
//!
//! Settings come from `SECRET_STORE_*` environment variables; the global
//! flags below override them.
//!
//! ## Usage
//!
//! ```bash
//! # Store a value (use "-" to read it from stdin)
//! secretctl write billing api_key sk_live_abc
//!
//! # Read the latest or a specific version
//! secretctl read billing api_key
//! secretctl read billing api_key --version 1
//!
//! # Inspect a service and a secret's audit trail
//! secretctl --backend ssm list billing --values
//! secretctl history billing api_key
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use secret_store::observability::metrics;
use secret_store::{provider, BackendKind, SecretId, Store, StoreConfig, LATEST_VERSION};
use std::path::PathBuf;
use tokio::io::AsyncReadExt;

/// Secret Store CLI
#[derive(Parser)]
#[command(name = "secretctl")]
#[command(about = "Versioned secret store CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend to use: secretsmanager, ssm or file
    #[arg(short, long, global = true)]
    backend: Option<BackendKind>,

    /// AWS region
    #[arg(long, global = true)]
    region: Option<String>,

    /// Endpoint override (e.g. localstack)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Maximum retries per backend call
    #[arg(long, global = true)]
    retries: Option<u32>,

    /// KMS key alias, or `file:<path>` for the file backend
    #[arg(long, global = true)]
    kms_key_alias: Option<String>,

    /// Path of the local encrypted store
    #[arg(long, global = true)]
    file: Option<PathBuf>,

    /// Print Prometheus metrics to stderr on exit
    #[arg(long, global = true)]
    metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a new version of a secret
    Write {
        service: String,
        key: String,
        /// Secret value; "-" or omitted reads from stdin
        value: Option<String>,
    },
    /// Read a secret
    Read {
        service: String,
        key: String,
        /// Version to read (defaults to latest)
        #[arg(short, long, allow_negative_numbers = true, default_value_t = LATEST_VERSION)]
        version: i64,
        /// Print only the value
        #[arg(short, long)]
        quiet: bool,
    },
    /// List the latest version of every secret in a service
    List {
        service: String,
        /// Include secret values
        #[arg(long)]
        values: bool,
    },
    /// List native entries for a service without reading values
    ListRaw { service: String },
    /// Show the change history of a secret
    History { service: String, key: String },
    /// Delete a secret (history is kept)
    Delete { service: String, key: String },
    /// Trigger rotation of a secret
    Rotate { service: String, key: String },
}

impl Cli {
    fn store_config(&self) -> StoreConfig {
        let mut config = StoreConfig::from_env();
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(region) = &self.region {
            config.region = Some(region.clone());
        }
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = Some(endpoint.clone());
        }
        if let Some(retries) = self.retries {
            config.retries = retries;
        }
        if let Some(alias) = &self.kms_key_alias {
            config.key_alias = Some(alias.clone());
        }
        if let Some(file) = &self.file {
            config.file_path = file.clone();
        }
        if config.actor.is_none() && config.backend == BackendKind::File {
            config.actor = std::env::var("USER").ok().filter(|u| !u.is_empty());
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "secretctl=info,secret_store=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    metrics::register_metrics().context("Failed to register metrics")?;

    let cli = Cli::parse();
    let config = cli.store_config();

    let store = provider::create_store(&config)
        .await
        .with_context(|| format!("Failed to initialize {} store", config.backend))?;

    let result = match cli.command {
        Commands::Write { service, key, value } => {
            write_command(store.as_ref(), SecretId::new(service, key), value).await
        }
        Commands::Read {
            service,
            key,
            version,
            quiet,
        } => read_command(store.as_ref(), SecretId::new(service, key), version, quiet).await,
        Commands::List { service, values } => list_command(store.as_ref(), &service, values).await,
        Commands::ListRaw { service } => list_raw_command(store.as_ref(), &service).await,
        Commands::History { service, key } => {
            history_command(store.as_ref(), SecretId::new(service, key)).await
        }
        Commands::Delete { service, key } => {
            delete_command(store.as_ref(), SecretId::new(service, key)).await
        }
        Commands::Rotate { service, key } => {
            rotate_command(store.as_ref(), SecretId::new(service, key)).await
        }
    };

    if cli.metrics {
        eprintln!("{}", metrics::encode_metrics()?);
    }

    result
}

async fn write_command(store: &dyn Store, id: SecretId, value: Option<String>) -> Result<()> {
    let value = match value.as_deref() {
        Some(value) if value != "-" => value.to_string(),
        _ => {
            let mut buffer = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buffer)
                .await
                .context("Failed to read secret value from stdin")?;
            buffer.trim_end_matches(['\r', '\n']).to_string()
        }
    };

    let version = store
        .write(&id, &value)
        .await
        .with_context(|| format!("Failed to write '{id}'"))?;

    println!("Wrote {} version {}", id, version);
    Ok(())
}

async fn read_command(store: &dyn Store, id: SecretId, version: i64, quiet: bool) -> Result<()> {
    let secret = store
        .read(&id, version)
        .await
        .with_context(|| format!("Failed to read '{id}'"))?;
    let value = secret.value.as_deref().unwrap_or_default();

    if quiet {
        println!("{}", value);
        return Ok(());
    }

    println!("Key:        {}", secret.meta.key);
    println!("Version:    {}", secret.meta.version);
    println!("Created:    {}", secret.meta.created.to_rfc3339());
    println!("Created By: {}", secret.meta.created_by);
    println!("Value:      {}", value);
    Ok(())
}

async fn list_command(store: &dyn Store, service: &str, values: bool) -> Result<()> {
    let secrets = store
        .list(service, values)
        .await
        .with_context(|| format!("Failed to list secrets in '{service}'"))?;

    if secrets.is_empty() {
        println!("No secrets found in '{}'.", service);
        return Ok(());
    }

    if values {
        println!("{:<30} {:<8} {:<26} {:<30} {}", "KEY", "VERSION", "CREATED", "CREATED BY", "VALUE");
        println!("{}", "-".repeat(110));
    } else {
        println!("{:<30} {:<8} {:<26} {:<30}", "KEY", "VERSION", "CREATED", "CREATED BY");
        println!("{}", "-".repeat(96));
    }

    for secret in secrets {
        let created = secret.meta.created.format("%Y-%m-%d %H:%M:%S UTC").to_string();
        match secret.value {
            Some(value) if values => println!(
                "{:<30} {:<8} {:<26} {:<30} {}",
                secret.meta.key, secret.meta.version, created, secret.meta.created_by, value
            ),
            _ => println!(
                "{:<30} {:<8} {:<26} {:<30}",
                secret.meta.key, secret.meta.version, created, secret.meta.created_by
            ),
        }
    }

    Ok(())
}

async fn list_raw_command(store: &dyn Store, service: &str) -> Result<()> {
    let mut entries = store.list_raw(service);
    let mut count = 0usize;

    println!("{:<40} {:<26}", "NAME", "LAST MODIFIED");
    println!("{}", "-".repeat(66));

    while let Some(entry) = entries
        .try_next()
        .await
        .with_context(|| format!("Failed to list entries in '{service}'"))?
    {
        let modified = entry
            .last_modified
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<40} {:<26}", entry.name, modified);
        count += 1;
    }

    if count == 0 {
        println!("No entries found in '{}'.", service);
    }
    Ok(())
}

async fn history_command(store: &dyn Store, id: SecretId) -> Result<()> {
    let events = store
        .history(&id)
        .await
        .with_context(|| format!("Failed to read history of '{id}'"))?;

    println!("History for '{}':\n", id);
    println!("{:<8} {:<10} {:<26} {}", "VERSION", "ACTION", "TIME", "USER");
    println!("{}", "-".repeat(80));
    for event in events {
        println!(
            "{:<8} {:<10} {:<26} {}",
            event.version,
            event.action,
            event.time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            event.user
        );
    }
    Ok(())
}

async fn delete_command(store: &dyn Store, id: SecretId) -> Result<()> {
    store
        .delete(&id)
        .await
        .with_context(|| format!("Failed to delete '{id}'"))?;
    println!("Deleted {}", id);
    println!("\nEarlier versions remain readable with --version.");
    Ok(())
}

async fn rotate_command(store: &dyn Store, id: SecretId) -> Result<()> {
    if !store.supports_rotation() {
        anyhow::bail!("The {} backend does not support rotation", store.backend());
    }
    store
        .rotate(&id)
        .await
        .with_context(|| format!("Failed to rotate '{id}'"))?;
    println!("Rotation triggered for {}", id);
    Ok(())
}
