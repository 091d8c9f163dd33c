// clickvault/src/restore/logic.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::backup::archive;
use crate::backup::logic::{
    table_name_from_schema_file, DATA_SUFFIX, SNAPSHOT_SUFFIX, TARGET_SCRATCH_DIR,
};
use crate::backup::Strategy;
use crate::catalog::ARCHIVE_SUFFIX;
use crate::config::AppConfig;
use crate::errors::AppError;
use crate::executor::Executor;
use crate::storage::{parse_s3_uri, BlobStore};

#[derive(Debug, Clone)]
pub struct TableRestore {
    pub table: String,
    pub schema_ok: bool,
    /// None when the artifact carried no data file for this table (a recorded
    /// warning, not a failure).
    pub data_ok: Option<bool>,
    pub errors: Vec<String>,
}

impl TableRestore {
    pub fn failed(&self) -> bool {
        !self.schema_ok || self.data_ok == Some(false)
    }
}

#[derive(Debug)]
pub struct DatabaseRestore {
    pub name: String,
    pub strategy: Strategy,
    pub tables: Vec<TableRestore>,
    pub errors: Vec<String>,
}

#[derive(Debug)]
pub struct RestoreReport {
    pub artifact: String,
    pub databases: Vec<DatabaseRestore>,
}

impl RestoreReport {
    pub fn has_recoverable_failures(&self) -> bool {
        self.databases
            .iter()
            .any(|d| !d.errors.is_empty() || d.tables.iter().any(|t| t.failed()))
    }

    pub fn print_summary(&self) {
        println!("\n===== Restore summary =====");
        println!("Artifact: {}", self.artifact);
        for db in &self.databases {
            println!(
                "  - {}: strategy {}, {} tables",
                db.name,
                db.strategy,
                db.tables.len()
            );
            for err in &db.errors {
                println!("      ❌ {}", err);
            }
            for t in &db.tables {
                if t.failed() {
                    println!("      ❌ {}.{}: {}", db.name, t.table, t.errors.join("; "));
                } else if t.data_ok.is_none() && db.strategy == Strategy::PerTable {
                    println!("      ⚠ {}.{}: no data file in artifact", db.name, t.table);
                }
            }
        }
        println!("===========================");
    }
}

/// Resolves an artifact reference to a local archive file, in priority order:
/// literal path, then the local catalog directory, then the remote store.
/// The first hit wins; local resolution never touches the blob store.
pub(crate) async fn resolve_artifact_ref<S: BlobStore>(
    artifact_ref: &str,
    backup_dir: &Path,
    store: Option<&S>,
    scratch: &Path,
) -> Result<PathBuf> {
    let literal = Path::new(artifact_ref);
    if literal.is_file() {
        return Ok(literal.to_path_buf());
    }

    let mut candidates = vec![backup_dir.join(artifact_ref)];
    if !artifact_ref.ends_with(ARCHIVE_SUFFIX) {
        candidates.push(backup_dir.join(format!("{artifact_ref}{ARCHIVE_SUFFIX}")));
    }
    for candidate in candidates {
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    if let Some(store) = store {
        let name = remote_artifact_name(artifact_ref)?;
        if store.exists(&name).await? {
            let destination = scratch.join(&name);
            println!("⬇ Fetching {} from object storage", name);
            store.get(&name, &destination).await?;
            return Ok(destination);
        }
    }

    Err(AppError::ArtifactNotFound(artifact_ref.to_string()).into())
}

/// Normalizes a reference into the remote object name: `s3://` URIs are
/// reduced to their final path segment, bare names get the archive suffix.
fn remote_artifact_name(artifact_ref: &str) -> Result<String> {
    let name = if artifact_ref.starts_with("s3://") {
        let (_, key) = parse_s3_uri(artifact_ref)?;
        key.rsplit('/')
            .next()
            .unwrap_or(key.as_str())
            .to_string()
    } else {
        artifact_ref.to_string()
    };
    if name.ends_with(ARCHIVE_SUFFIX) {
        Ok(name)
    } else {
        Ok(format!("{name}{ARCHIVE_SUFFIX}"))
    }
}

/// Runs one restore: resolve, unpack into an ephemeral tree, recreate
/// databases and tables, replay data. The restore tree is removed on every
/// exit path. Fatal: artifact not found, unpack failure, cancellation.
pub async fn perform_restore_orchestration<S: BlobStore>(
    config: &AppConfig,
    executor: Arc<dyn Executor>,
    store: Option<&S>,
    artifact_ref: &str,
    cancel: &CancellationToken,
) -> Result<RestoreReport> {
    println!(
        "🔄 Starting restore of '{}' against {}",
        artifact_ref,
        executor.describe()
    );

    let scratch = match &config.temp_staging_root {
        Some(root) => {
            fs::create_dir_all(root)?;
            tempfile::Builder::new()
                .prefix("clickvault-restore-")
                .tempdir_in(root)?
        }
        None => tempfile::Builder::new()
            .prefix("clickvault-restore-")
            .tempdir()?,
    };

    let archive_path =
        resolve_artifact_ref(artifact_ref, &config.local_backup_dir, store, scratch.path())
            .await?;
    println!("📦 Resolved artifact: {}", archive_path.display());

    let restore_tree = scratch.path().join("tree");
    {
        let archive_path = archive_path.clone();
        let restore_tree = restore_tree.clone();
        tokio::task::spawn_blocking(move || archive::unpack_archive(&archive_path, &restore_tree))
            .await
            .context("unpack task panicked")?
            .context("Failed to unpack backup archive")?;
    }

    let mut db_dirs: Vec<(String, PathBuf)> = fs::read_dir(&restore_tree)
        .with_context(|| format!("Failed to read restore tree {}", restore_tree.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| (entry.file_name().to_string_lossy().to_string(), entry.path()))
        .collect();
    db_dirs.sort_by(|a, b| a.0.cmp(&b.0));

    if db_dirs.is_empty() {
        anyhow::bail!(
            "Archive {} contains no database directories",
            archive_path.display()
        );
    }

    let semaphore = Arc::new(Semaphore::new(config.max_parallel_tables));
    let mut report = RestoreReport {
        artifact: artifact_ref.to_string(),
        databases: Vec::new(),
    };

    for (db, dir) in db_dirs {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled(format!(
                "restore interrupted before database '{}'",
                db
            ))
            .into());
        }
        let database =
            restore_database(executor.clone(), &db, &dir, &semaphore, cancel).await;
        report.databases.push(database);
    }

    drop(scratch);
    Ok(report)
}

/// Restores one database from its unpacked directory. Bulk-native always
/// takes priority when a snapshot file is present; per-table files are the
/// fallback, never a supplement.
async fn restore_database(
    executor: Arc<dyn Executor>,
    db: &str,
    dir: &Path,
    semaphore: &Arc<Semaphore>,
    cancel: &CancellationToken,
) -> DatabaseRestore {
    println!("🔍 Restoring database: {}", db);
    let mut report = DatabaseRestore {
        name: db.to_string(),
        strategy: Strategy::PerTable,
        tables: Vec::new(),
        errors: Vec::new(),
    };

    let created = {
        let executor = executor.clone();
        let db_owned = db.to_string();
        tokio::task::spawn_blocking(move || {
            executor.run_query(&format!("CREATE DATABASE IF NOT EXISTS \"{db_owned}\""))
        })
        .await
    };
    match created {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            eprintln!("❌ Failed to create database {}: {}", db, e);
            report.errors.push(format!("create database: {e}"));
            return report;
        }
        Err(e) => {
            report.errors.push(format!("create database task panicked: {e}"));
            return report;
        }
    }

    let snapshot_path = dir.join(format!("{db}{SNAPSHOT_SUFFIX}"));
    if snapshot_path.is_file() {
        let bulk_result = {
            let executor = executor.clone();
            let db_owned = db.to_string();
            tokio::task::spawn_blocking(move || {
                attempt_bulk_restore(executor.as_ref(), &db_owned, &snapshot_path)
            })
            .await
        };
        match bulk_result {
            Ok(Ok(())) => {
                println!("✓ Bulk-native restore of {} succeeded", db);
                report.strategy = Strategy::BulkNative;
                return report;
            }
            Ok(Err(e)) => {
                println!(
                    "⚠ Bulk-native restore failed for {}, falling back to per-table restore: {}",
                    db, e
                );
            }
            Err(e) => {
                report.errors.push(format!("bulk restore task panicked: {e}"));
            }
        }
    }

    let mut schema_files: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| table_name_from_schema_file(p).is_some())
            .collect(),
        Err(e) => {
            report.errors.push(format!("reading database directory: {e}"));
            return report;
        }
    };
    schema_files.sort();

    let mut workers: JoinSet<TableRestore> = JoinSet::new();
    for schema_path in schema_files {
        if cancel.is_cancelled() {
            report
                .errors
                .push("cancelled before all tables were dispatched".to_string());
            break;
        }
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                report.errors.push("worker pool closed".to_string());
                break;
            }
        };
        let executor = executor.clone();
        let db_owned = db.to_string();
        workers.spawn(async move {
            let _permit = permit;
            let table = table_name_from_schema_file(&schema_path)
                .unwrap_or_else(|| "<unknown>".to_string());
            let table_for_error = table.clone();
            let handle = tokio::task::spawn_blocking(move || {
                restore_table(executor.as_ref(), &db_owned, &table, &schema_path)
            });
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => TableRestore {
                    table: table_for_error,
                    schema_ok: false,
                    data_ok: None,
                    errors: vec![format!("restore task panicked: {e}")],
                },
            }
        });
    }

    while let Some(result) = workers.join_next().await {
        match result {
            Ok(outcome) => report.tables.push(outcome),
            Err(e) => report.errors.push(format!("table worker failed: {e}")),
        }
    }
    report.tables.sort_by(|a, b| a.table.cmp(&b.table));

    println!(
        "✅ Finished database {}: strategy {}, {} tables",
        db,
        report.strategy,
        report.tables.len()
    );
    report
}

fn attempt_bulk_restore(
    executor: &dyn Executor,
    db: &str,
    snapshot_path: &Path,
) -> crate::errors::Result<()> {
    let remote_path = format!("{TARGET_SCRATCH_DIR}/{db}{SNAPSHOT_SUFFIX}");
    executor.run_shell(&format!(
        "mkdir -p {TARGET_SCRATCH_DIR} && rm -rf {remote_path}"
    ))?;
    executor.copy_in(snapshot_path, &remote_path)?;
    executor.run_query(&format!("RESTORE DATABASE \"{db}\" FROM File('{remote_path}')"))?;
    if let Err(e) = executor.run_shell(&format!("rm -rf {remote_path}")) {
        eprintln!("⚠ Failed to clean up target-side snapshot {}: {}", remote_path, e);
    }
    Ok(())
}

/// Drop-then-recreate one table, then replay its data if the artifact carried
/// any. A schema failure aborts only this table; a missing data file is a
/// warning.
fn restore_table(
    executor: &dyn Executor,
    db: &str,
    table: &str,
    schema_path: &Path,
) -> TableRestore {
    let mut outcome = TableRestore {
        table: table.to_string(),
        schema_ok: false,
        data_ok: None,
        errors: Vec::new(),
    };

    let schema_text = match fs::read_to_string(schema_path) {
        Ok(text) => text,
        Err(e) => {
            outcome.errors.push(format!("reading schema file: {e}"));
            return outcome;
        }
    };

    if let Err(e) = executor.run_query(&format!("DROP TABLE IF EXISTS \"{db}\".\"{table}\"")) {
        eprintln!("    ❌ Drop of {}.{} failed: {}", db, table, e);
        outcome.errors.push(format!("drop table: {e}"));
        return outcome;
    }

    if let Err(e) = executor.run_query(&schema_text) {
        eprintln!("    ❌ Schema restore failed for {}.{}: {}", db, table, e);
        outcome.errors.push(format!("schema restore: {e}"));
        return outcome;
    }
    outcome.schema_ok = true;

    let data_path = schema_path.with_file_name(format!("{table}{DATA_SUFFIX}"));
    if !data_path.is_file() {
        println!("    ⚠ No data file for {}.{} in artifact", db, table);
        return outcome;
    }

    match executor.run_query_with_input(
        &format!("INSERT INTO \"{db}\".\"{table}\" FORMAT TabSeparatedWithNames"),
        &data_path,
    ) {
        Ok(_) => outcome.data_ok = Some(true),
        Err(e) => {
            eprintln!("    ❌ Data replay failed for {}.{}: {}", db, table, e);
            outcome.data_ok = Some(false);
            outcome.errors.push(format!("data replay: {e}"));
        }
    }
    outcome
}
