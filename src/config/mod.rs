// clickvault/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

// Structs for deserializing config.json
#[derive(Debug, Clone, Deserialize)]
pub struct JsonS3StorageConfig {
    pub bucket_name: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint_url: Option<String>,
    pub folder_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonClickhouseConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRemoteConfig {
    pub namespace: Option<String>,
    pub pod_prefix: Option<String>,
    pub container: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawJsonConfig {
    pub environment: Option<String>,
    pub clickhouse: Option<JsonClickhouseConfig>,
    pub database_list: Option<Vec<String>>,
    pub retention_days: Option<i64>,
    pub local_backup_dir: Option<PathBuf>,
    pub temp_staging_root: Option<PathBuf>,
    pub max_parallel_tables: Option<usize>,
    pub fail_on_table_errors: Option<bool>,
    pub s3_storage: Option<JsonS3StorageConfig>,
    pub remote: Option<JsonRemoteConfig>,
}

// Application's internal configuration structs
#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint_url: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    pub folder_prefix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClickhouseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub namespace: String,
    pub pod_prefix: String,
    pub container: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: String,
    pub clickhouse: ClickhouseConfig,
    /// Empty means "all databases" (minus the system denylist).
    pub database_list: Vec<String>,
    pub retention_days: i64,
    pub local_backup_dir: PathBuf,
    pub temp_staging_root: Option<PathBuf>,
    pub max_parallel_tables: usize,
    pub fail_on_table_errors: bool,
    pub s3_config: Option<S3Config>,
    pub remote: Option<RemoteConfig>,
}

const DEFAULT_RETENTION_DAYS: i64 = 14;
const DEFAULT_MAX_PARALLEL_TABLES: usize = 4;

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let raw: RawJsonConfig = serde_json::from_str(&config_content).with_context(|| {
            format!(
                "Failed to parse JSON from config file at {}",
                config_path.display()
            )
        })?;
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RawJsonConfig) -> Result<Self> {
        let environment = raw
            .environment
            .filter(|s| !s.trim().is_empty())
            .context("'environment' must be set in config (used to name backup artifacts)")?;

        if environment.contains('_') || environment.contains('/') {
            anyhow::bail!(
                "'environment' must not contain '_' or '/' (it is embedded in artifact names): {}",
                environment
            );
        }

        let ch_raw = raw.clickhouse.unwrap_or(JsonClickhouseConfig {
            host: None,
            port: None,
            user: None,
            password: None,
        });
        let clickhouse = ClickhouseConfig {
            host: ch_raw.host.unwrap_or_else(|| "127.0.0.1".to_string()),
            port: ch_raw.port.unwrap_or(9000),
            user: ch_raw.user.unwrap_or_else(|| "default".to_string()),
            password: ch_raw.password.unwrap_or_default(),
        };

        let local_backup_dir = raw
            .local_backup_dir
            .context("'local_backup_dir' must be set in config")?;
        if local_backup_dir.to_string_lossy().is_empty() {
            anyhow::bail!("'local_backup_dir' cannot be empty in config");
        }

        let retention_days = raw.retention_days.unwrap_or(DEFAULT_RETENTION_DAYS);
        if retention_days < 1 {
            anyhow::bail!("'retention_days' must be at least 1, got {}", retention_days);
        }

        let max_parallel_tables = match raw.max_parallel_tables {
            Some(0) => anyhow::bail!("'max_parallel_tables' must be at least 1"),
            Some(n) => n,
            None => DEFAULT_MAX_PARALLEL_TABLES,
        };

        let s3_config = parse_s3_config(raw.s3_storage.as_ref());

        let remote = match raw.remote {
            Some(r) => {
                let namespace = r
                    .namespace
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "default".to_string());
                let pod_prefix = r
                    .pod_prefix
                    .filter(|s| !s.is_empty())
                    .context("'remote.pod_prefix' must be set when a remote target is configured")?;
                Some(RemoteConfig {
                    namespace,
                    pod_prefix,
                    container: r.container.filter(|s| !s.is_empty()),
                })
            }
            None => None,
        };

        Ok(AppConfig {
            environment,
            clickhouse,
            database_list: raw.database_list.unwrap_or_default(),
            retention_days,
            local_backup_dir,
            temp_staging_root: raw.temp_staging_root,
            max_parallel_tables,
            fail_on_table_errors: raw.fail_on_table_errors.unwrap_or(false),
            s3_config,
            remote,
        })
    }
}

/// Builds the validated S3 configuration, or None when the section is missing
/// or incomplete. An incomplete section gets a warning so a typo'd field does
/// not silently disable uploads.
fn parse_s3_config(s3_raw: Option<&JsonS3StorageConfig>) -> Option<S3Config> {
    let s3_raw = s3_raw?;
    if let (Some(bucket), Some(region), Some(key_id), Some(secret), Some(endpoint)) = (
        s3_raw.bucket_name.as_ref().filter(|s| !s.is_empty()),
        s3_raw.region.as_ref().filter(|s| !s.is_empty()),
        s3_raw.access_key_id.as_ref().filter(|s| !s.is_empty()),
        s3_raw.secret_access_key.as_ref().filter(|s| !s.is_empty()),
        s3_raw.endpoint_url.as_ref().filter(|s| !s.is_empty()),
    ) {
        Some(S3Config {
            bucket_name: bucket.clone(),
            region: region.clone(),
            access_key_id: key_id.clone(),
            secret_access_key: secret.clone(),
            endpoint_url: endpoint.clone(),
            folder_prefix: s3_raw.folder_prefix.clone().filter(|s| !s.is_empty()),
        })
    } else {
        if s3_raw.bucket_name.is_some()
            || s3_raw.region.is_some()
            || s3_raw.access_key_id.is_some()
            || s3_raw.secret_access_key.is_some()
            || s3_raw.endpoint_url.is_some()
        {
            println!(
                "⚠ s3_storage is present in the config but some required fields (bucket_name, \
                 region, access_key_id, secret_access_key, endpoint_url) are missing or empty. \
                 Object storage operations will be disabled."
            );
        }
        None
    }
}

/// Writes a commented sample config for `create-config`.
pub fn write_sample_config(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!(
            "Refusing to overwrite existing config at {}",
            path.display()
        );
    }
    let sample = serde_json::json!({
        "environment": "prod",
        "clickhouse": {
            "host": "127.0.0.1",
            "port": 9000,
            "user": "default",
            "password": ""
        },
        "database_list": [],
        "retention_days": DEFAULT_RETENTION_DAYS,
        "local_backup_dir": "./backups",
        "temp_staging_root": null,
        "max_parallel_tables": DEFAULT_MAX_PARALLEL_TABLES,
        "fail_on_table_errors": false,
        "s3_storage": {
            "bucket_name": "",
            "region": "",
            "access_key_id": "",
            "secret_access_key": "",
            "endpoint_url": "",
            "folder_prefix": "clickvault"
        },
        "remote": {
            "namespace": "default",
            "pod_prefix": "clickhouse-",
            "container": null
        }
    });
    fs::write(path, serde_json::to_string_pretty(&sample)?)
        .with_context(|| format!("Failed to write sample config to {}", path.display()))?;
    println!("✅ Sample configuration written to {}", path.display());
    Ok(())
}
