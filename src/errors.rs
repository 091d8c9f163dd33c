use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Executor command failed: {stderr}")]
    Command { stdout: String, stderr: String },

    #[error("Execution target not resolvable: {0}")]
    TargetUnresolvable(String),

    #[error("Backup artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Invalid artifact name: {0}")]
    ArtifactName(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Verification failed: {0}")]
    Verification(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
