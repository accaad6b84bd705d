// ABOUTME: Remote deploy lock preventing concurrent runs against one target.
// ABOUTME: Created atomically with noclobber under <root>/.deploy, broken when stale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::shell::{Shell, ShellError, quote};
use crate::state::RemoteLayout;
use crate::types::ProjectName;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("deploy lock held by {holder} (pid {pid}) since {started_at}; use --break-lock to override")]
    Held {
        holder: String,
        pid: u32,
        started_at: DateTime<Utc>,
    },

    #[error("deploy lock was taken by another run while breaking it")]
    Contended,

    #[error("failed to acquire deploy lock: {0}")]
    Shell(#[from] ShellError),

    #[error("failed to serialize lock info: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Information about who holds a deploy lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// Process ID of the lock holder.
    pub pid: u32,
    /// When the lock was acquired.
    pub started_at: DateTime<Utc>,
    /// Project being deployed.
    pub project: String,
}

impl LockInfo {
    /// Create new lock info for the current process.
    pub fn new(project: &ProjectName) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            project: project.to_string(),
        }
    }

    /// Whether the lock is at least `stale_after` old.
    pub fn is_stale(&self, stale_after: Duration) -> bool {
        let age = Utc::now() - self.started_at;
        age.to_std().map(|age| age >= stale_after).unwrap_or(false)
    }
}

/// A held deploy lock. Must be released explicitly with [`DeployLock::release`].
pub struct DeployLock<'a> {
    shell: &'a dyn Shell,
    path: String,
}

impl std::fmt::Debug for DeployLock<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployLock")
            .field("path", &self.path)
            .finish()
    }
}

impl<'a> DeployLock<'a> {
    /// Acquire the deploy lock on the target.
    ///
    /// Uses shell noclobber mode for atomic acquisition. Stale locks are
    /// broken with a warning; a live lock is only broken when `break_lock`.
    pub async fn acquire(
        shell: &'a dyn Shell,
        layout: &RemoteLayout,
        project: &ProjectName,
        stale_after: Duration,
        break_lock: bool,
    ) -> Result<Self, LockError> {
        let path = layout.lock_file();
        shell
            .run(&format!("mkdir -p {}", quote(&layout.state_dir())))
            .await?;

        let info = serde_json::to_string(&LockInfo::new(project))?;
        // set -C makes > fail if the file already exists
        let acquire_cmd = format!("(set -C; echo {} > {}) 2>/dev/null", quote(&info), quote(&path));

        if shell.exec(&acquire_cmd).await?.success() {
            tracing::debug!("acquired deploy lock {}", path);
            return Ok(Self { shell, path });
        }

        let existing = Self::read(shell, &path).await?;
        match &existing {
            Some(held) if break_lock => tracing::warn!(
                "breaking deploy lock held by {} (pid {}) since {}",
                held.holder,
                held.pid,
                held.started_at
            ),
            Some(held) if held.is_stale(stale_after) => tracing::warn!(
                "breaking stale deploy lock held by {} (pid {}) since {}",
                held.holder,
                held.pid,
                held.started_at
            ),
            Some(held) => {
                return Err(LockError::Held {
                    holder: held.holder.clone(),
                    pid: held.pid,
                    started_at: held.started_at,
                });
            }
            None => tracing::warn!("deploy lock unreadable, breaking it"),
        }

        shell.exec(&format!("rm -f {}", quote(&path))).await?;
        if !shell.exec(&acquire_cmd).await?.success() {
            return Err(LockError::Contended);
        }
        Ok(Self { shell, path })
    }

    /// Current lock contents; `None` when missing or corrupted.
    async fn read(shell: &dyn Shell, path: &str) -> Result<Option<LockInfo>, ShellError> {
        let output = shell.exec(&format!("cat {}", quote(path))).await?;
        if !output.success() {
            return Ok(None);
        }
        Ok(serde_json::from_str(output.stdout.trim()).ok())
    }

    /// Release the lock.
    pub async fn release(self) -> Result<(), ShellError> {
        self.shell.run(&format!("rm -f {}", quote(&self.path))).await?;
        Ok(())
    }
}
