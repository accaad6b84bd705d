// ABOUTME: Backup coordinator invoking the external backup program on the target.
// ABOUTME: A backup at or below the size floor counts as failed, whatever its exit code.

use crate::config::Config;
use crate::diagnostics::{Diagnostics, Warning};
use crate::shell::{Shell, ShellError, quote};
use thiserror::Error;

/// Touched before the backup runs; entries newer than it are this run's.
const MARKER: &str = ".deckhand-backup-start";

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backup command could not be run: {0}")]
    Shell(#[from] ShellError),
}

/// Outcome of one backup run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupResult {
    pub ok: bool,
    pub size_bytes: u64,
    /// Newest backup entry, if one was produced.
    pub path: Option<String>,
    /// Why the backup was rejected.
    pub detail: Option<String>,
}

impl BackupResult {
    fn rejected(size_bytes: u64, path: Option<String>, detail: String) -> Self {
        Self {
            ok: false,
            size_bytes,
            path,
            detail: Some(detail),
        }
    }
}

/// Apply the size floor to a measured backup.
pub fn judge(size_bytes: u64, min_size_bytes: u64, path: Option<String>) -> BackupResult {
    if size_bytes > min_size_bytes {
        BackupResult {
            ok: true,
            size_bytes,
            path,
            detail: None,
        }
    } else {
        BackupResult::rejected(
            size_bytes,
            path,
            format!(
                "backup is {} bytes, must exceed {} bytes",
                size_bytes, min_size_bytes
            ),
        )
    }
}

pub struct BackupCoordinator<'a> {
    shell: &'a dyn Shell,
    config: &'a Config,
}

impl<'a> BackupCoordinator<'a> {
    pub fn new(shell: &'a dyn Shell, config: &'a Config) -> Self {
        Self { shell, config }
    }

    fn marker(&self) -> String {
        format!("{}/{}", self.config.backup_dir(), MARKER)
    }

    /// Run the backup program and measure what it produced.
    ///
    /// The start marker is removed on every path once created; failing to
    /// remove it is a warning.
    pub async fn run(&self, diag: &mut Diagnostics) -> Result<BackupResult, BackupError> {
        let dir = self.config.backup_dir();

        // Entries newer than the marker were created by this run.
        self.shell
            .run(&format!(
                "mkdir -p {} && touch {}",
                quote(&dir),
                quote(&self.marker())
            ))
            .await?;

        let result = self.produce(&dir).await;
        self.remove_marker(diag).await;
        result
    }

    /// Remove the start marker left by a run that was cut short.
    pub async fn remove_marker(&self, diag: &mut Diagnostics) {
        let marker = self.marker();
        let failure = match self.shell.exec(&format!("rm -f {}", quote(&marker))).await {
            Ok(output) if output.success() => return,
            Ok(output) => output.stderr.trim().to_string(),
            Err(e) => e.to_string(),
        };
        diag.warn(Warning::cleanup(format!(
            "failed to remove backup marker {}: {}",
            marker, failure
        )));
    }

    async fn produce(&self, dir: &str) -> Result<BackupResult, BackupError> {
        let backup = &self.config.backup;
        let command = format!(
            "cd {} && {} {} {}",
            quote(&self.config.target.root),
            backup.command,
            quote(dir),
            backup.retention_days
        );
        tracing::info!("running backup into {}", dir);
        let output = self
            .shell
            .exec_with_timeout(&command, backup.timeout)
            .await?;
        if !output.success() {
            return Ok(BackupResult::rejected(
                0,
                None,
                format!(
                    "backup command exited with {}: {}",
                    output.exit_code,
                    output.stderr.trim()
                ),
            ));
        }

        let newest = self
            .shell
            .run(&format!(
                "find {} -mindepth 1 -maxdepth 1 -newer {} ! -name {} -printf '%T@ %p\\n' | sort -n | tail -n 1 | cut -d' ' -f2-",
                quote(dir),
                quote(&self.marker()),
                MARKER
            ))
            .await?;

        let path = newest.stdout.trim();
        if path.is_empty() {
            return Ok(BackupResult::rejected(
                0,
                None,
                format!("backup command produced nothing in {}", dir),
            ));
        }

        let size = self
            .shell
            .run(&format!("du -sb {} | cut -f1", quote(path)))
            .await?;
        let size_bytes = size.stdout.trim().parse::<u64>().unwrap_or(0);
        Ok(judge(size_bytes, backup.min_size_bytes, Some(path.to_string())))
    }
}
