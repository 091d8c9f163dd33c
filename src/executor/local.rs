// clickvault/src/executor/local.rs
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use which::which;

use crate::config::ClickhouseConfig;
use crate::errors::AppError;
use crate::executor::{client_args, command_result, Executor};

/// Runs queries against a locally reachable database endpoint. File transfer
/// degrades to plain filesystem copies.
pub struct LocalExecutor {
    client_path: PathBuf,
    clickhouse: ClickhouseConfig,
}

impl LocalExecutor {
    pub fn new(clickhouse: ClickhouseConfig) -> Result<Self> {
        let client_path = which("clickhouse-client").context(
            "clickhouse-client executable not found in PATH. Please ensure the ClickHouse \
             client tools are installed and in your PATH.",
        )?;
        Ok(LocalExecutor {
            client_path,
            clickhouse,
        })
    }

    fn client_command(&self) -> Command {
        let mut cmd = Command::new(&self.client_path);
        cmd.args(client_args(&self.clickhouse));
        cmd
    }
}

impl Executor for LocalExecutor {
    fn run_query(&self, query: &str) -> crate::errors::Result<String> {
        let output = self
            .client_command()
            .arg("--query")
            .arg(query)
            .output()
            .map_err(AppError::Io)?;
        command_result(output)
    }

    fn run_query_with_input(&self, query: &str, input: &Path) -> crate::errors::Result<()> {
        let input_file = File::open(input)?;
        let output = self
            .client_command()
            .arg("--query")
            .arg(query)
            .stdin(Stdio::from(input_file))
            .output()
            .map_err(AppError::Io)?;
        command_result(output).map(|_| ())
    }

    fn run_shell(&self, cmd: &str) -> crate::errors::Result<String> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .output()
            .map_err(AppError::Io)?;
        command_result(output)
    }

    fn copy_in(&self, local: &Path, remote: &str) -> crate::errors::Result<()> {
        if let Some(parent) = Path::new(remote).parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(local, remote)?;
        Ok(())
    }

    fn copy_out(&self, remote: &str, local: &Path) -> crate::errors::Result<()> {
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(remote, local)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "local clickhouse-client at {}:{}",
            self.clickhouse.host, self.clickhouse.port
        )
    }
}
