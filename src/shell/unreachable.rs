// ABOUTME: Stand-in shell for a target that could not be connected to.
// ABOUTME: Every call fails with the original connection error.

use super::{CommandOutput, Shell, ShellError};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// A target the session could not be opened to.
///
/// Lets a deployment still resolve its version, report preflight and
/// record the failed attempt locally.
#[derive(Debug, Clone)]
pub struct UnreachableShell {
    host: String,
    reason: String,
}

impl UnreachableShell {
    pub fn new(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            reason: reason.into(),
        }
    }

    fn error(&self) -> ShellError {
        ShellError::Unreachable {
            host: self.host.clone(),
            reason: self.reason.clone(),
        }
    }
}

#[async_trait]
impl Shell for UnreachableShell {
    fn host(&self) -> &str {
        &self.host
    }

    fn default_timeout(&self) -> Duration {
        Duration::ZERO
    }

    async fn exec_with_timeout(
        &self,
        _command: &str,
        _timeout: Duration,
    ) -> Result<CommandOutput, ShellError> {
        Err(self.error())
    }

    async fn exec_with_input(
        &self,
        _command: &str,
        _input: &[u8],
    ) -> Result<CommandOutput, ShellError> {
        Err(self.error())
    }

    async fn upload(&self, _local_path: &Path, _remote_path: &str) -> Result<(), ShellError> {
        Err(self.error())
    }
}
