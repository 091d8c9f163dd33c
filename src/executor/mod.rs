// clickvault/src/executor/mod.rs
pub(crate) mod local;
pub(crate) mod remote;

#[cfg(test)]
pub(crate) mod fake;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::{AppConfig, ClickhouseConfig};
use crate::errors::AppError;

pub use local::LocalExecutor;
pub use remote::RemoteExecutor;

/// Where database commands run. Resolved once per run, immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Local,
    Remote,
}

/// The single seam between the engines and the database host.
///
/// Implementations run queries through the `clickhouse-client` binary and move
/// files to/from wherever that binary runs. Individual command failures are
/// returned as errors, never retried here; the caller decides whether to skip,
/// abort, or fall back.
pub trait Executor: Send + Sync {
    /// Runs a single query and returns its stdout.
    fn run_query(&self, query: &str) -> crate::errors::Result<String>;

    /// Runs a query with the contents of a local file piped to its stdin.
    /// Used for data replay (`INSERT ... FORMAT ...`).
    fn run_query_with_input(&self, query: &str, input: &Path) -> crate::errors::Result<()>;

    /// Runs an arbitrary shell command on the execution target.
    fn run_shell(&self, cmd: &str) -> crate::errors::Result<String>;

    /// Copies a local file to a path on the execution target.
    fn copy_in(&self, local: &Path, remote: &str) -> crate::errors::Result<()>;

    /// Copies a file on the execution target to a local path.
    fn copy_out(&self, remote: &str, local: &Path) -> crate::errors::Result<()>;

    /// Human-readable description of the bound target, for run banners.
    fn describe(&self) -> String;
}

/// Binds the configured execution target. Remote resolution happens here, so
/// a down or misconfigured environment fails the run before any work starts.
pub fn bind_executor(kind: TargetKind, config: &AppConfig) -> Result<Arc<dyn Executor>> {
    match kind {
        TargetKind::Local => {
            let executor = LocalExecutor::new(config.clickhouse.clone())?;
            Ok(Arc::new(executor))
        }
        TargetKind::Remote => {
            let remote_config = config
                .remote
                .as_ref()
                .context("Remote target selected but 'remote' section is missing from config")?;
            let executor = RemoteExecutor::bind(config.clickhouse.clone(), remote_config.clone())?;
            Ok(Arc::new(executor))
        }
    }
}

/// Connection flags shared by both executors when invoking clickhouse-client.
pub(crate) fn client_args(ch: &ClickhouseConfig) -> Vec<String> {
    let mut args = vec![
        "--host".to_string(),
        ch.host.clone(),
        "--port".to_string(),
        ch.port.to_string(),
        "--user".to_string(),
        ch.user.clone(),
    ];
    if !ch.password.is_empty() {
        args.push("--password".to_string());
        args.push(ch.password.clone());
    }
    args
}

pub(crate) fn command_result(output: std::process::Output) -> crate::errors::Result<String> {
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if output.status.success() {
        Ok(stdout)
    } else {
        Err(AppError::Command {
            stdout,
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_args_omit_empty_password() {
        let ch = ClickhouseConfig {
            host: "db.internal".to_string(),
            port: 9440,
            user: "backup".to_string(),
            password: String::new(),
        };
        let args = client_args(&ch);
        assert!(args.contains(&"db.internal".to_string()));
        assert!(args.contains(&"9440".to_string()));
        assert!(!args.contains(&"--password".to_string()));

        let with_password = ClickhouseConfig {
            password: "s3cret".to_string(),
            ..ch
        };
        let args = client_args(&with_password);
        assert!(args.contains(&"--password".to_string()));
    }
}
