// clickvault/src/executor/remote.rs
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use which::which;

use crate::config::{ClickhouseConfig, RemoteConfig};
use crate::errors::AppError;
use crate::executor::{client_args, command_result, Executor};

/// Runs queries inside a remote compute unit (a Kubernetes pod) through
/// `kubectl exec`; file transfer goes through `kubectl cp`.
///
/// The pod is discovered once at bind time by matching a name prefix against
/// running pods in the configured namespace; the resolved identity is cached
/// for the lifetime of the run.
pub struct RemoteExecutor {
    kubectl_path: PathBuf,
    clickhouse: ClickhouseConfig,
    remote: RemoteConfig,
    pod_name: String,
}

impl RemoteExecutor {
    pub fn bind(clickhouse: ClickhouseConfig, remote: RemoteConfig) -> Result<Self> {
        let kubectl_path = which("kubectl").context(
            "kubectl executable not found in PATH. Please ensure kubectl is installed and \
             in your PATH for remote-target operations.",
        )?;

        let output = Command::new(&kubectl_path)
            .args([
                "get",
                "pods",
                "-n",
                &remote.namespace,
                "--no-headers",
                "-o",
                "custom-columns=NAME:.metadata.name,STATUS:.status.phase",
            ])
            .output()
            .with_context(|| {
                format!(
                    "Failed to run kubectl to list pods in namespace '{}'",
                    remote.namespace
                )
            })?;

        if !output.status.success() {
            anyhow::bail!(
                "kubectl pod listing in namespace '{}' failed: {}",
                remote.namespace,
                String::from_utf8_lossy(&output.stderr)
            );
        }

        let listing = String::from_utf8_lossy(&output.stdout).to_string();
        let pod_name = resolve_pod(&listing, &remote.pod_prefix).map_err(|e| {
            anyhow::anyhow!(
                "{} (namespace '{}', prefix '{}')",
                e,
                remote.namespace,
                remote.pod_prefix
            )
        })?;

        println!("✓ Resolved remote execution target: pod '{}'", pod_name);

        Ok(RemoteExecutor {
            kubectl_path,
            clickhouse,
            remote,
            pod_name,
        })
    }

    fn exec_command(&self, interactive: bool) -> Command {
        let mut cmd = Command::new(&self.kubectl_path);
        cmd.arg("exec");
        if interactive {
            cmd.arg("-i");
        }
        cmd.args(["-n", &self.remote.namespace, &self.pod_name]);
        if let Some(container) = &self.remote.container {
            cmd.args(["-c", container]);
        }
        cmd.arg("--");
        cmd
    }

    fn pod_path(&self, remote_path: &str) -> String {
        format!("{}/{}:{}", self.remote.namespace, self.pod_name, remote_path)
    }
}

/// Picks the pod to exec into: the first running pod whose name matches the
/// prefix. No running match is fatal; the environment is down or misconfigured.
fn resolve_pod(listing: &str, prefix: &str) -> crate::errors::Result<String> {
    let matches: Vec<&str> = listing
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let name = parts.next()?;
            let status = parts.next()?;
            (name.starts_with(prefix) && status == "Running").then_some(name)
        })
        .collect();

    match matches.as_slice() {
        [] => Err(AppError::TargetUnresolvable(format!(
            "no running pod matches prefix '{}'",
            prefix
        ))),
        [only] => Ok(only.to_string()),
        [first, ..] => {
            println!(
                "⚠ {} running pods match prefix '{}', using '{}'",
                matches.len(),
                prefix,
                first
            );
            Ok(first.to_string())
        }
    }
}

impl Executor for RemoteExecutor {
    fn run_query(&self, query: &str) -> crate::errors::Result<String> {
        let output = self
            .exec_command(false)
            .arg("clickhouse-client")
            .args(client_args(&self.clickhouse))
            .arg("--query")
            .arg(query)
            .output()
            .map_err(AppError::Io)?;
        command_result(output)
    }

    fn run_query_with_input(&self, query: &str, input: &Path) -> crate::errors::Result<()> {
        let input_file = File::open(input)?;
        let output = self
            .exec_command(true)
            .arg("clickhouse-client")
            .args(client_args(&self.clickhouse))
            .arg("--query")
            .arg(query)
            .stdin(Stdio::from(input_file))
            .output()
            .map_err(AppError::Io)?;
        command_result(output).map(|_| ())
    }

    fn run_shell(&self, cmd: &str) -> crate::errors::Result<String> {
        let output = self
            .exec_command(false)
            .args(["sh", "-c", cmd])
            .output()
            .map_err(AppError::Io)?;
        command_result(output)
    }

    fn copy_in(&self, local: &Path, remote: &str) -> crate::errors::Result<()> {
        let mut cmd = Command::new(&self.kubectl_path);
        cmd.args(["cp", &local.to_string_lossy(), &self.pod_path(remote)]);
        if let Some(container) = &self.remote.container {
            cmd.args(["-c", container]);
        }
        let output = cmd.output().map_err(AppError::Io)?;
        command_result(output).map(|_| ())
    }

    fn copy_out(&self, remote: &str, local: &Path) -> crate::errors::Result<()> {
        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut cmd = Command::new(&self.kubectl_path);
        cmd.args(["cp", &self.pod_path(remote), &local.to_string_lossy()]);
        if let Some(container) = &self.remote.container {
            cmd.args(["-c", container]);
        }
        let output = cmd.output().map_err(AppError::Io)?;
        command_result(output).map(|_| ())
    }

    fn describe(&self) -> String {
        format!(
            "pod '{}' in namespace '{}'",
            self.pod_name, self.remote.namespace
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_pod_picks_running_match() {
        let listing = "clickhouse-0   Running\nclickhouse-init-xyz   Completed\nother-db-0   Running\n";
        let pod = resolve_pod(listing, "clickhouse-").unwrap();
        assert_eq!(pod, "clickhouse-0");
    }

    #[test]
    fn test_resolve_pod_skips_non_running() {
        let listing = "clickhouse-0   Pending\nclickhouse-1   CrashLoopBackOff\n";
        let err = resolve_pod(listing, "clickhouse-").unwrap_err();
        assert!(matches!(err, AppError::TargetUnresolvable(_)));
    }

    #[test]
    fn test_resolve_pod_no_match_is_fatal() {
        let err = resolve_pod("other-db-0   Running\n", "clickhouse-").unwrap_err();
        assert!(matches!(err, AppError::TargetUnresolvable(_)));
    }

    #[test]
    fn test_resolve_pod_multiple_matches_uses_first() {
        let listing = "clickhouse-0   Running\nclickhouse-1   Running\n";
        let pod = resolve_pod(listing, "clickhouse-").unwrap();
        assert_eq!(pod, "clickhouse-0");
    }
}
