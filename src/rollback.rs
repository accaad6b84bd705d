// ABOUTME: Rollback controller restoring the previously current version.
// ABOUTME: A missing previous version or artifact is a loud, distinct failure.

use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::executor::{Executor, ExecutorError};
use crate::health::HealthChecker;
use crate::shell::{Shell, ShellError};
use crate::transport;
use crate::version::Version;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RollbackError {
    #[error("no previous version recorded on the target, nothing to roll back to")]
    NoPreviousVersion,

    #[error("previous version {version} cannot be restored, images missing on target: {}", images.join(", "))]
    MissingArtifact { version: String, images: Vec<String> },

    #[error("could not inspect images of {version}: {source}")]
    Inspect {
        version: String,
        #[source]
        source: ShellError,
    },

    #[error("restoring {version} failed: {source}")]
    Start {
        version: String,
        #[source]
        source: ExecutorError,
    },

    #[error("restored version {version} is unhealthy: {summary}")]
    Unhealthy { version: String, summary: String },

    #[error("restored {version} but the target still names another current version: {reason}")]
    Unrecorded { version: String, reason: String },
}

impl RollbackError {
    /// Rollback was not even attempted.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            RollbackError::NoPreviousVersion
                | RollbackError::MissingArtifact { .. }
                | RollbackError::Inspect { .. }
        )
    }
}

pub struct RollbackController<'a> {
    shell: &'a dyn Shell,
    config: &'a Config,
    checker: &'a HealthChecker,
}

impl<'a> RollbackController<'a> {
    pub fn new(shell: &'a dyn Shell, config: &'a Config, checker: &'a HealthChecker) -> Self {
        Self {
            shell,
            config,
            checker,
        }
    }

    /// The version to restore, if it can be restored.
    pub async fn check_preconditions(
        &self,
        previous: Option<&Version>,
    ) -> Result<Version, RollbackError> {
        let version = previous.ok_or(RollbackError::NoPreviousVersion)?;

        let mut missing = Vec::new();
        for image in self.config.images.iter() {
            let reference = image.tagged(version.as_str());
            let id = transport::image_id(self.shell, &reference)
                .await
                .map_err(|source| RollbackError::Inspect {
                    version: version.to_string(),
                    source,
                })?;
            if id.is_none() {
                missing.push(reference);
            }
        }

        if !missing.is_empty() {
            return Err(RollbackError::MissingArtifact {
                version: version.to_string(),
                images: missing,
            });
        }
        Ok(version.clone())
    }

    /// Stop the failed stack, start `previous` and verify it.
    pub async fn rollback(
        &self,
        previous: Option<&Version>,
        diag: &mut Diagnostics,
    ) -> Result<Version, RollbackError> {
        let version = self.check_preconditions(previous).await?;
        tracing::warn!("rolling back to {}", version);

        let executor = Executor::new(self.shell, self.config);
        executor.stop_current(diag).await;
        executor
            .start_version(&version)
            .await
            .map_err(|source| RollbackError::Start {
                version: version.to_string(),
                source,
            })?;

        let checks: Vec<_> = self.config.health.checks.iter().cloned().collect();
        let report = self.checker.verify(self.shell, &checks).await;
        if !report.is_healthy() {
            return Err(RollbackError::Unhealthy {
                version: version.to_string(),
                summary: report.failure_summary(),
            });
        }

        tracing::info!("rolled back to {}", version);
        Ok(version)
    }
}
