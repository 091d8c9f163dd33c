// clickvault/src/executor/fake.rs
//! In-memory executor for engine tests: canned query responses, recorded
//! call log, no subprocesses.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crate::errors::AppError;
use crate::executor::Executor;

#[derive(Default)]
pub struct FakeExecutor {
    responses: Mutex<HashMap<String, Result<String, String>>>,
    pub queries: Mutex<Vec<String>>,
    pub inputs: Mutex<Vec<(String, Vec<u8>)>>,
    pub copied_out: Mutex<Vec<String>>,
    /// Bytes written by `copy_out`; None makes `copy_out` fail.
    pub snapshot_payload: Option<Vec<u8>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, query: &str, stdout: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(query.to_string(), Ok(stdout.to_string()));
    }

    pub fn fail(&self, query: &str, stderr: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(query.to_string(), Err(stderr.to_string()));
    }

    pub fn ran(&self, query: &str) -> bool {
        self.queries.lock().unwrap().iter().any(|q| q == query)
    }
}

impl Executor for FakeExecutor {
    fn run_query(&self, query: &str) -> crate::errors::Result<String> {
        self.queries.lock().unwrap().push(query.to_string());
        match self.responses.lock().unwrap().get(query) {
            Some(Ok(stdout)) => Ok(stdout.clone()),
            Some(Err(stderr)) => Err(AppError::Command {
                stdout: String::new(),
                stderr: stderr.clone(),
            }),
            None => Err(AppError::Command {
                stdout: String::new(),
                stderr: format!("no fake response registered for query: {query}"),
            }),
        }
    }

    fn run_query_with_input(&self, query: &str, input: &Path) -> crate::errors::Result<()> {
        self.queries.lock().unwrap().push(query.to_string());
        let bytes = std::fs::read(input)?;
        match self.responses.lock().unwrap().get(query) {
            Some(Err(stderr)) => {
                return Err(AppError::Command {
                    stdout: String::new(),
                    stderr: stderr.clone(),
                })
            }
            // Replay queries default to success unless a failure is registered.
            _ => {}
        }
        self.inputs.lock().unwrap().push((query.to_string(), bytes));
        Ok(())
    }

    fn run_shell(&self, cmd: &str) -> crate::errors::Result<String> {
        self.queries.lock().unwrap().push(format!("shell: {cmd}"));
        Ok(String::new())
    }

    fn copy_in(&self, local: &Path, remote: &str) -> crate::errors::Result<()> {
        std::fs::read(local)?;
        self.queries
            .lock()
            .unwrap()
            .push(format!("copy_in: {remote}"));
        Ok(())
    }

    fn copy_out(&self, remote: &str, local: &Path) -> crate::errors::Result<()> {
        self.copied_out.lock().unwrap().push(remote.to_string());
        match &self.snapshot_payload {
            Some(payload) => {
                if let Some(parent) = local.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(local, payload)?;
                Ok(())
            }
            None => Err(AppError::Command {
                stdout: String::new(),
                stderr: format!("nothing to copy out from {remote}"),
            }),
        }
    }

    fn describe(&self) -> String {
        "fake executor".to_string()
    }
}
