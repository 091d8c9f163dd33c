pub(crate) mod archive;
pub(crate) mod logic;
pub(crate) mod manifest;

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::catalog;
use crate::config::AppConfig;
use crate::executor::Executor;
use crate::storage::BlobStore;

pub use manifest::{BackupManifest, Strategy};

/// Public entry point for the backup process: runs the engine, then the
/// retention sweep over both tiers. Retention runs whether or not the backup
/// itself succeeded; an interrupted run must not stall expiry.
pub async fn run_backup_flow<S: BlobStore>(
    config: &AppConfig,
    executor: Arc<dyn Executor>,
    store: Option<&S>,
    cancel: &CancellationToken,
) -> Result<BackupManifest> {
    let result = logic::perform_backup_orchestration(config, executor, store, cancel).await;

    let (local_removed, remote_removed) =
        catalog::run_retention(&config.local_backup_dir, config.retention_days, store).await;
    if local_removed + remote_removed > 0 {
        println!(
            "🧹 Retention removed {} local and {} remote artifacts",
            local_removed, remote_removed
        );
    }

    let manifest = result?;
    manifest.print_summary();
    Ok(manifest)
}
