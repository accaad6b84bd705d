// ABOUTME: Shell implementation backed by local processes.
// ABOUTME: Runs operator-side docker/git commands and same-host deployments.

use super::{CommandOutput, Shell, ShellError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Runs commands through `sh -c` on the machine deckhand runs on.
#[derive(Debug, Clone)]
pub struct LocalShell {
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl LocalShell {
    pub fn new(timeout: Duration) -> Self {
        Self {
            working_dir: None,
            timeout,
        }
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn command(&self, command: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl Default for LocalShell {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

fn into_output(output: std::process::Output) -> CommandOutput {
    CommandOutput {
        // Killed by a signal: no code, report as a generic failure.
        exit_code: output.status.code().map(|c| c as u32).unwrap_or(1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    }
}

#[async_trait]
impl Shell for LocalShell {
    fn host(&self) -> &str {
        "localhost"
    }

    fn default_timeout(&self) -> Duration {
        self.timeout
    }

    async fn exec_with_timeout(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, ShellError> {
        tracing::debug!(command, "local exec");
        let child = self
            .command(command)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| ShellError::Spawn(e.to_string()))?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => Ok(into_output(output?)),
            Err(_) => Err(ShellError::Timeout(timeout)),
        }
    }

    async fn exec_with_input(
        &self,
        command: &str,
        input: &[u8],
    ) -> Result<CommandOutput, ShellError> {
        let mut child = self
            .command(command)
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| ShellError::Spawn(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input).await?;
        }

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => Ok(into_output(output?)),
            Err(_) => Err(ShellError::Timeout(self.timeout)),
        }
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<(), ShellError> {
        tokio::fs::copy(local_path, remote_path)
            .await
            .map_err(|e| ShellError::Upload {
                path: remote_path.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}
