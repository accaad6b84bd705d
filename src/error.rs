// ABOUTME: Application-wide error types for deckhand.
// ABOUTME: Maps every failure class onto the documented process exit codes.

use std::path::PathBuf;
use thiserror::Error;

use crate::history::HistoryError;
use crate::lock::LockError;
use crate::rollback::RollbackError;
use crate::shell::ShellError;
use crate::transport::TransportError;
use crate::version::VersionError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("SSH error: {0}")]
    Ssh(#[from] crate::ssh::Error),

    #[error(transparent)]
    Shell(#[from] ShellError),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Rollback(#[from] RollbackError),
}

impl Error {
    /// Rollback failures need manual intervention and exit 2; everything
    /// else exits 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Rollback(_) => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
