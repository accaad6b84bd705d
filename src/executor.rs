// ABOUTME: Remote deployment executor: frees ports, stops and starts the compose stack.
// ABOUTME: Starting a version is the point of no return for an attempt.

use crate::config::Config;
use crate::diagnostics::{Diagnostics, Warning};
use crate::shell::{Shell, ShellError, quote};
use crate::version::Version;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to tag {image} as latest: {source}")]
    Tag {
        image: String,
        #[source]
        source: ShellError,
    },

    #[error("failed to start version {version}: {source}")]
    Start {
        version: String,
        #[source]
        source: ShellError,
    },
}

/// Runs the compose stack of one project on the target.
pub struct Executor<'a> {
    shell: &'a dyn Shell,
    config: &'a Config,
}

impl<'a> Executor<'a> {
    pub fn new(shell: &'a dyn Shell, config: &'a Config) -> Self {
        Self { shell, config }
    }

    fn compose(&self) -> String {
        format!(
            "docker compose -p {} -f {}",
            quote(self.config.project.as_str()),
            quote(&self.config.compose_path())
        )
    }

    /// Kill whatever holds the stack's ports. Only those ports are touched.
    pub async fn free_ports(&self, diag: &mut Diagnostics) {
        for port in &self.config.ports {
            // fuser exits 1 when nothing is bound, which is the common case.
            match self.shell.exec(&format!("fuser -k {}/tcp", port)).await {
                Ok(output) if output.success() => {
                    tracing::info!("freed port {} on {}", port, self.shell.host());
                }
                Ok(_) => tracing::debug!("port {} already free", port),
                Err(e) => diag.warn(Warning::stop_failed(format!(
                    "could not free port {}: {}",
                    port, e
                ))),
            }
        }
    }

    /// Tear down the running stack. Failure is a warning: nothing may be running.
    pub async fn stop_current(&self, diag: &mut Diagnostics) {
        let command = format!("{} down", self.compose());
        match self.shell.run(&command).await {
            Ok(_) => tracing::info!("stopped running stack"),
            Err(e) => diag.warn(Warning::stop_failed(format!(
                "stopping the running stack failed: {}",
                e
            ))),
        }
    }

    /// Bring up the stack on `version`'s images.
    pub async fn start_version(&self, version: &Version) -> Result<(), ExecutorError> {
        for image in self.config.images.iter() {
            let source = image.tagged(version.as_str());
            let latest = image.tagged("latest");
            self.shell
                .run(&format!("docker tag {} {}", quote(&source), quote(&latest)))
                .await
                .map_err(|source_err| ExecutorError::Tag {
                    image: source.clone(),
                    source: source_err,
                })?;
        }

        let command = format!(
            "cd {} && APP_VERSION={} {} up -d",
            quote(&self.config.target.root),
            quote(version.as_str()),
            self.compose()
        );
        self.shell
            .run(&command)
            .await
            .map_err(|source| ExecutorError::Start {
                version: version.to_string(),
                source,
            })?;
        tracing::info!("started version {}", version);
        Ok(())
    }
}
