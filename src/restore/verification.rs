// clickvault/src/restore/verification.rs
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::backup::archive;
use crate::backup::logic::{table_name_from_schema_file, DATA_SUFFIX, SNAPSHOT_SUFFIX};
use crate::config::AppConfig;
use crate::errors::AppError;
use crate::restore::logic::resolve_artifact_ref;
use crate::storage::BlobStore;

/// Structural verification of a backup artifact without touching a database:
/// the archive must unpack, contain at least one database directory, and each
/// database must carry something restorable (a bulk snapshot or at least one
/// schema file). Tables with a schema but no data file are reported as
/// warnings, matching the backup engine's "absence means extraction failure"
/// rule.
pub async fn verify_artifact<S: BlobStore>(
    config: &AppConfig,
    store: Option<&S>,
    artifact_ref: &str,
) -> Result<()> {
    let scratch = tempfile::Builder::new()
        .prefix("clickvault-verify-")
        .tempdir()
        .context("Failed to create verification scratch dir")?;

    let archive_path =
        resolve_artifact_ref(artifact_ref, &config.local_backup_dir, store, scratch.path())
            .await?;
    println!("🔎 Verifying artifact: {}", archive_path.display());

    let tree = scratch.path().join("tree");
    archive::unpack_archive(&archive_path, &tree)
        .context("Archive is corrupt or not a backup artifact")?;

    let mut database_count = 0usize;
    let mut table_count = 0usize;
    let mut warnings = 0usize;

    let mut entries: Vec<_> = fs::read_dir(&tree)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let db = entry.file_name().to_string_lossy().to_string();
        database_count += 1;
        let (tables, db_warnings) = verify_database_dir(&entry.path(), &db)?;
        table_count += tables;
        warnings += db_warnings;
    }

    if database_count == 0 {
        return Err(AppError::Verification(format!(
            "artifact '{}' contains no database directories",
            artifact_ref
        ))
        .into());
    }

    println!(
        "✓ Artifact verified: {} databases, {} tables, {} warnings",
        database_count, table_count, warnings
    );
    Ok(())
}

fn verify_database_dir(dir: &Path, db: &str) -> Result<(usize, usize)> {
    let has_snapshot = dir.join(format!("{db}{SNAPSHOT_SUFFIX}")).is_file();

    let schema_tables: Vec<String> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter_map(|e| table_name_from_schema_file(&e.path()))
        .collect();

    if !has_snapshot && schema_tables.is_empty() {
        return Err(AppError::Verification(format!(
            "database directory '{}' contains no snapshot and no schema files",
            db
        ))
        .into());
    }

    let mut warnings = 0usize;
    if !has_snapshot {
        for table in &schema_tables {
            if !dir.join(format!("{table}{DATA_SUFFIX}")).is_file() {
                println!(
                    "⚠ {}.{}: schema present but no data file (extraction failed at backup time)",
                    db, table
                );
                warnings += 1;
            }
        }
    }

    Ok((schema_tables.len(), warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClickhouseConfig;
    use crate::storage::fake::FakeStore;
    use std::path::PathBuf;

    fn test_config(dir: &Path) -> AppConfig {
        AppConfig {
            environment: "test".to_string(),
            clickhouse: ClickhouseConfig {
                host: "localhost".to_string(),
                port: 9000,
                user: "default".to_string(),
                password: String::new(),
            },
            database_list: Vec::new(),
            retention_days: 14,
            local_backup_dir: dir.join("backups"),
            temp_staging_root: None,
            max_parallel_tables: 2,
            fail_on_table_errors: false,
            s3_config: None,
            remote: None,
        }
    }

    fn make_artifact(config: &AppConfig, name: &str, files: &[(&str, &str)]) -> PathBuf {
        let staging = tempfile::tempdir().unwrap();
        for (rel, contents) in files {
            let path = staging.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }
        fs::create_dir_all(&config.local_backup_dir).unwrap();
        let dest = config.local_backup_dir.join(name);
        archive::pack_directory(staging.path(), &dest).unwrap();
        dest
    }

    #[tokio::test]
    async fn test_verify_accepts_well_formed_artifact() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let config = test_config(dir.path());
        make_artifact(
            &config,
            "test_backup_20250101_000000.tar.gz",
            &[
                ("db1/events.schema", "CREATE TABLE ..."),
                ("db1/events.data", "id\n1\n"),
            ],
        );
        verify_artifact(&config, None::<&FakeStore>, "test_backup_20250101_000000").await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_verify_accepts_snapshot_only_database() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let config = test_config(dir.path());
        make_artifact(
            &config,
            "test_backup_20250101_000000.tar.gz",
            &[("db1/db1-backup.snapshot", "SNAPSHOT")],
        );
        verify_artifact(&config, None::<&FakeStore>, "test_backup_20250101_000000").await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_verify_rejects_database_with_nothing_restorable() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let config = test_config(dir.path());
        make_artifact(
            &config,
            "test_backup_20250101_000000.tar.gz",
            &[("db1/notes.txt", "not a backup")],
        );
        let result = verify_artifact(&config, None::<&FakeStore>, "test_backup_20250101_000000").await;
        assert!(result.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_verify_rejects_corrupt_archive() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let config = test_config(dir.path());
        fs::create_dir_all(&config.local_backup_dir)?;
        fs::write(
            config.local_backup_dir.join("test_backup_20250101_000000.tar.gz"),
            "definitely not gzip",
        )?;
        let result = verify_artifact(&config, None::<&FakeStore>, "test_backup_20250101_000000").await;
        assert!(result.is_err());
        Ok(())
    }
}
