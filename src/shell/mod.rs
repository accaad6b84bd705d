// ABOUTME: Command execution abstraction shared by the SSH session and the local host.
// ABOUTME: Every deployment phase talks to hosts exclusively through the Shell trait.

mod local;
mod unreachable;

pub use local::LocalShell;
pub use unreachable::UnreachableShell;

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Output from a command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code of the command.
    pub exit_code: u32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("`{command}` exited with status {exit_code}: {stderr}")]
    Failed {
        command: String,
        exit_code: u32,
        stderr: String,
    },

    #[error("failed to spawn command: {0}")]
    Spawn(String),

    #[error("upload to {path} failed: {reason}")]
    Upload { path: String, reason: String },

    #[error("{host} unreachable: {reason}")]
    Unreachable { host: String, reason: String },

    #[error("SSH error: {0}")]
    Ssh(#[from] crate::ssh::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShellError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ShellError::Timeout(_))
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, ShellError::Unreachable { .. })
    }
}

/// A host that commands can be run on.
///
/// Implementations enforce a timeout on every call; a timed-out call is
/// reported as [`ShellError::Timeout`] and treated like any other failure.
#[async_trait]
pub trait Shell: Send + Sync {
    /// Human-readable host label used in status lines.
    fn host(&self) -> &str;

    /// Timeout applied by [`Shell::exec`].
    fn default_timeout(&self) -> Duration;

    /// Execute a command with an explicit timeout.
    async fn exec_with_timeout(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, ShellError>;

    /// Execute a command, feeding `input` to its stdin.
    async fn exec_with_input(
        &self,
        command: &str,
        input: &[u8],
    ) -> Result<CommandOutput, ShellError>;

    /// Copy a local file to `remote_path` on this host.
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<(), ShellError>;

    /// Execute a command with the default timeout.
    async fn exec(&self, command: &str) -> Result<CommandOutput, ShellError> {
        self.exec_with_timeout(command, self.default_timeout()).await
    }

    /// Execute a command and turn a non-zero exit into an error.
    async fn run(&self, command: &str) -> Result<CommandOutput, ShellError> {
        let output = self.exec(command).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(ShellError::Failed {
                command: command.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    /// Check if a file or directory exists.
    async fn file_exists(&self, path: &str) -> Result<bool, ShellError> {
        let output = self
            .exec(&format!("test -e {} && echo exists", quote(path)))
            .await?;
        Ok(output.success() && output.stdout.trim() == "exists")
    }
}

/// Quote a value for POSIX sh using single quotes.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_wraps_plain_values() {
        assert_eq!(quote("/opt/shop"), "'/opt/shop'");
    }

    #[test]
    fn quote_escapes_single_quotes() {
        assert_eq!(quote("it's"), "'it'\\''s'");
    }
}
