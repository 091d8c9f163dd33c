pub(crate) mod logic;
pub(crate) mod verification;

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::executor::Executor;
use crate::storage::BlobStore;

pub use logic::RestoreReport;
pub use verification::verify_artifact;

/// Public entry point for the restore process.
pub async fn run_restore_flow<S: BlobStore>(
    config: &AppConfig,
    executor: Arc<dyn Executor>,
    store: Option<&S>,
    artifact_ref: &str,
    cancel: &CancellationToken,
) -> Result<RestoreReport> {
    let report =
        logic::perform_restore_orchestration(config, executor, store, artifact_ref, cancel)
            .await?;
    report.print_summary();
    Ok(report)
}
