// clickvault/src/backup/logic.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::backup::archive;
use crate::backup::manifest::{BackupManifest, DatabaseSnapshot, Strategy, TableArtifact};
use crate::catalog::ArtifactName;
use crate::config::AppConfig;
use crate::errors::AppError;
use crate::executor::Executor;
use crate::storage::BlobStore;

/// Databases that are never backed up, even when explicitly selected.
pub const SYSTEM_DATABASES: &[&str] = &["system", "information_schema", "INFORMATION_SCHEMA"];

pub const SCHEMA_SUFFIX: &str = ".schema";
pub const DATA_SUFFIX: &str = ".data";
pub const SNAPSHOT_SUFFIX: &str = "-backup.snapshot";

/// Scratch directory on the execution target for bulk snapshots in flight.
pub(crate) const TARGET_SCRATCH_DIR: &str = "/tmp/clickvault";

/// Runs one backup: enumerate, extract into a staging tree, archive, and
/// optionally push to object storage. The staging tree is a tempdir owned by
/// this function; it is removed on every exit path, including fatal ones.
///
/// Recoverable failures (a single table, a single database, the upload) are
/// recorded in the manifest and never abort the run. Fatal: unreachable
/// executor, archive pack failure, cancellation.
pub async fn perform_backup_orchestration<S: BlobStore>(
    config: &AppConfig,
    executor: Arc<dyn Executor>,
    store: Option<&S>,
    cancel: &CancellationToken,
) -> Result<BackupManifest> {
    let timestamp = Local::now().naive_local();
    let artifact = ArtifactName::new(&config.environment, timestamp);
    println!(
        "🚀 Starting backup run {} against {}",
        artifact.file_name(),
        executor.describe()
    );

    let staging = create_staging_dir(config)?;
    println!("📂 Staging tree: {}", staging.path().display());

    let databases = {
        let executor = executor.clone();
        let selection = config.database_list.clone();
        tokio::task::spawn_blocking(move || select_databases(executor.as_ref(), &selection))
            .await
            .context("database enumeration task panicked")??
    };
    println!("Databases to back up: {:?}", databases);

    let semaphore = Arc::new(Semaphore::new(config.max_parallel_tables));
    let mut snapshots = Vec::new();

    // Source order is preserved; no re-sorting of databases.
    for db in &databases {
        if cancel.is_cancelled() {
            // Staging tree is dropped on return; no new work is issued.
            return Err(AppError::Cancelled(format!(
                "backup interrupted before database '{}'",
                db
            ))
            .into());
        }
        let snapshot =
            backup_database(executor.clone(), staging.path(), db, &semaphore, cancel).await;
        snapshots.push(snapshot);
    }

    if cancel.is_cancelled() {
        return Err(AppError::Cancelled("backup interrupted".to_string()).into());
    }

    fs::create_dir_all(&config.local_backup_dir).with_context(|| {
        format!(
            "Failed to create local backup directory {}",
            config.local_backup_dir.display()
        )
    })?;
    let archive_path = config.local_backup_dir.join(artifact.file_name());
    let staging_path = staging.path().to_path_buf();
    let pack_dest = archive_path.clone();
    let packed = tokio::task::spawn_blocking(move || archive::pack_directory(&staging_path, &pack_dest))
        .await
        .context("archive task panicked")?
        .context("Failed to pack backup archive")?;
    println!("🗜 Packed backup archive: {}", packed.display());

    let uploaded = match store {
        Some(store) => match store.put(&packed, &artifact.file_name()).await {
            Ok(_) => {
                println!("✅ Uploaded {} to object storage", artifact.file_name());
                true
            }
            Err(e) => {
                // The local artifact remains the recovery path.
                eprintln!("⚠ Upload of {} failed: {:#}", artifact.file_name(), e);
                false
            }
        },
        None => false,
    };

    drop(staging);

    Ok(BackupManifest {
        environment: config.environment.clone(),
        timestamp,
        archive_path: Some(packed),
        uploaded,
        databases: snapshots,
    })
}

fn create_staging_dir(config: &AppConfig) -> Result<tempfile::TempDir> {
    match &config.temp_staging_root {
        Some(root) => {
            fs::create_dir_all(root)
                .with_context(|| format!("Failed to create staging root {}", root.display()))?;
            tempfile::Builder::new()
                .prefix("clickvault-staging-")
                .tempdir_in(root)
                .with_context(|| format!("Failed to create staging dir under {}", root.display()))
        }
        None => tempfile::Builder::new()
            .prefix("clickvault-staging-")
            .tempdir()
            .context("Failed to create staging dir"),
    }
}

/// Resolves the run's database set: the explicit selection, or everything the
/// server reports, always minus the system denylist.
fn select_databases(executor: &dyn Executor, selection: &[String]) -> Result<Vec<String>> {
    let candidates: Vec<String> = if selection.is_empty() {
        let output = executor
            .run_query("SHOW DATABASES")
            .context("Failed to enumerate databases (is the executor reachable?)")?;
        output
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect()
    } else {
        selection.to_vec()
    };

    let databases: Vec<String> = candidates
        .into_iter()
        .filter(|db| {
            if SYSTEM_DATABASES.contains(&db.as_str()) {
                println!("⏭ Skipping system database: {}", db);
                false
            } else {
                true
            }
        })
        .collect();

    if databases.is_empty() {
        anyhow::bail!("No databases to back up after filtering system databases");
    }
    Ok(databases)
}

/// Backs up one database into `staging_root/<db>/`. All failures below the
/// database level are recorded in the returned snapshot, never propagated.
async fn backup_database(
    executor: Arc<dyn Executor>,
    staging_root: &Path,
    db: &str,
    semaphore: &Arc<Semaphore>,
    cancel: &CancellationToken,
) -> DatabaseSnapshot {
    println!("🔍 Backing up database: {}", db);

    let tables = match executor.run_query(&format!("SHOW TABLES FROM \"{db}\"")) {
        Ok(output) => output
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect::<Vec<String>>(),
        Err(e) => {
            eprintln!("❌ Failed to list tables in {}: {}", db, e);
            let mut snapshot = DatabaseSnapshot::skipped(db);
            snapshot.skipped = false;
            snapshot.errors.push(format!("table enumeration failed: {e}"));
            return snapshot;
        }
    };

    if tables.is_empty() {
        println!("⏭ Database {} has no tables, skipping", db);
        return DatabaseSnapshot::skipped(db);
    }

    let db_dir = staging_root.join(db);
    let mut snapshot = DatabaseSnapshot {
        name: db.to_string(),
        strategy: Strategy::PerTable,
        skipped: false,
        tables: Vec::new(),
        errors: Vec::new(),
    };
    if let Err(e) = fs::create_dir_all(&db_dir) {
        snapshot.errors.push(format!("creating staging dir: {e}"));
        return snapshot;
    }

    // Bulk-native first; per-table is the fallback, never a supplement.
    let bulk_result = {
        let executor = executor.clone();
        let db_owned = db.to_string();
        let db_dir_owned = db_dir.clone();
        tokio::task::spawn_blocking(move || {
            attempt_bulk_snapshot(executor.as_ref(), &db_owned, &db_dir_owned)
        })
        .await
    };
    match bulk_result {
        Ok(Ok(())) => {
            println!("✓ Bulk-native snapshot of {} succeeded", db);
            snapshot.strategy = Strategy::BulkNative;
        }
        Ok(Err(e)) => {
            // Expected degraded path, not a failure of the run.
            println!(
                "⚠ Bulk-native snapshot unavailable for {}, falling back to per-table extraction: {}",
                db, e
            );
        }
        Err(e) => {
            snapshot.errors.push(format!("bulk snapshot task panicked: {e}"));
        }
    }

    // Schemas always travel with the artifact; data files only when falling
    // back to per-table. Each table is its own failure domain.
    let include_data = snapshot.strategy == Strategy::PerTable;
    let mut workers: JoinSet<TableArtifact> = JoinSet::new();
    for table in tables {
        if cancel.is_cancelled() {
            snapshot
                .errors
                .push("cancelled before all tables were dispatched".to_string());
            break;
        }
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                snapshot.errors.push("worker pool closed".to_string());
                break;
            }
        };
        let executor = executor.clone();
        let db_owned = db.to_string();
        let db_dir_owned = db_dir.clone();
        workers.spawn(async move {
            let _permit = permit;
            let db_for_error = db_owned.clone();
            let table_for_error = table.clone();
            let handle = tokio::task::spawn_blocking(move || {
                extract_table(executor.as_ref(), &db_dir_owned, &db_owned, &table, include_data)
            });
            match handle.await {
                Ok(artifact) => artifact,
                Err(e) => TableArtifact {
                    database: db_for_error,
                    table: table_for_error,
                    schema_ok: false,
                    data_ok: include_data.then_some(false),
                    errors: vec![format!("extraction task panicked: {e}")],
                },
            }
        });
    }

    // Cleanup of the staging tree must not race in-flight workers.
    while let Some(result) = workers.join_next().await {
        match result {
            Ok(artifact) => snapshot.tables.push(artifact),
            Err(e) => snapshot.errors.push(format!("table worker failed: {e}")),
        }
    }
    snapshot.tables.sort_by(|a, b| a.table.cmp(&b.table));

    println!(
        "✅ Finished database {}: strategy {}, {} tables",
        db,
        snapshot.strategy,
        snapshot.tables.len()
    );
    snapshot
}

/// One privileged whole-database export, copied back into staging. Any step
/// failing makes the caller fall back to per-table extraction.
fn attempt_bulk_snapshot(
    executor: &dyn Executor,
    db: &str,
    db_dir: &Path,
) -> crate::errors::Result<()> {
    let remote_path = format!("{TARGET_SCRATCH_DIR}/{db}{SNAPSHOT_SUFFIX}");
    executor.run_shell(&format!("mkdir -p {TARGET_SCRATCH_DIR} && rm -rf {remote_path}"))?;
    executor.run_query(&format!("BACKUP DATABASE \"{db}\" TO File('{remote_path}')"))?;
    executor.copy_out(&remote_path, &db_dir.join(format!("{db}{SNAPSHOT_SUFFIX}")))?;
    if let Err(e) = executor.run_shell(&format!("rm -rf {remote_path}")) {
        eprintln!("⚠ Failed to clean up target-side snapshot {}: {}", remote_path, e);
    }
    Ok(())
}

/// Extracts schema, then data, for one table. Schema is attempted (and its
/// outcome recorded) before data, but a schema failure does not prevent the
/// data attempt; the two operations are independent.
fn extract_table(
    executor: &dyn Executor,
    db_dir: &Path,
    db: &str,
    table: &str,
    include_data: bool,
) -> TableArtifact {
    let mut artifact = TableArtifact {
        database: db.to_string(),
        table: table.to_string(),
        schema_ok: false,
        data_ok: include_data.then_some(false),
        errors: Vec::new(),
    };

    match executor.run_query(&format!("SHOW CREATE TABLE \"{db}\".\"{table}\"")) {
        Ok(ddl) => {
            // clickhouse-client escapes newlines in its TSV output.
            let ddl = unescape_tsv(ddl.trim_end());
            match fs::write(db_dir.join(format!("{table}{SCHEMA_SUFFIX}")), ddl) {
                Ok(_) => artifact.schema_ok = true,
                Err(e) => artifact.errors.push(format!("writing schema file: {e}")),
            }
        }
        Err(e) => {
            eprintln!("    ❌ Schema extraction failed for {}.{}: {}", db, table, e);
            artifact.errors.push(format!("schema extraction: {e}"));
        }
    }

    if include_data {
        match executor.run_query(&format!(
            "SELECT * FROM \"{db}\".\"{table}\" FORMAT TabSeparatedWithNames"
        )) {
            Ok(data) => {
                // An empty table still gets a data file; a missing data file
                // strictly means extraction failure.
                match fs::write(db_dir.join(format!("{table}{DATA_SUFFIX}")), data) {
                    Ok(_) => artifact.data_ok = Some(true),
                    Err(e) => artifact.errors.push(format!("writing data file: {e}")),
                }
            }
            Err(e) => {
                eprintln!("    ❌ Data extraction failed for {}.{}: {}", db, table, e);
                artifact.errors.push(format!("data extraction: {e}"));
            }
        }
    }

    artifact
}

/// Undoes clickhouse-client's TSV escaping on single-value query output.
pub(crate) fn unescape_tsv(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

pub(crate) fn table_name_from_schema_file(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    file_name
        .strip_suffix(SCHEMA_SUFFIX)
        .map(|s| s.to_string())
}
