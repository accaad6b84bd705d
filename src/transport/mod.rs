// ABOUTME: Artifact transport strategies moving versioned images to the target.
// ABOUTME: tar, registry and local implement one trait and are chosen once per run.

mod error;
mod local;
mod registry;
mod tar;

pub use error::{TransportError, TransportErrorKind};
pub use local::LocalTransport;
pub use registry::RegistryTransport;
pub use tar::TarTransport;

use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::shell::{Shell, ShellError, quote};
use crate::version::Version;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

/// How built images reach the target host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMethod {
    /// `docker save` archive copied over SSH and loaded remotely.
    #[default]
    Tar,
    /// Push to a registry, pull on the target.
    Registry,
    /// Same-host deploy; images are already where they need to be.
    Local,
}

impl fmt::Display for TransportMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportMethod::Tar => "tar",
            TransportMethod::Registry => "registry",
            TransportMethod::Local => "local",
        })
    }
}

impl FromStr for TransportMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tar" => Ok(TransportMethod::Tar),
            "registry" => Ok(TransportMethod::Registry),
            "local" => Ok(TransportMethod::Local),
            _ => Err(format!(
                "unknown transport method: {} (expected tar, registry or local)",
                s
            )),
        }
    }
}

/// Moves the images of one version to the target.
#[async_trait]
pub trait Transport: Send + Sync {
    fn method(&self) -> TransportMethod;

    /// Checks that must pass before anything is moved.
    fn validate(&self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Deliver every configured image tagged `version` to the target.
    ///
    /// On success the target has `<image>:<version>` for each image.
    async fn deliver(
        &self,
        version: &Version,
        local: &dyn Shell,
        remote: &dyn Shell,
        diag: &mut Diagnostics,
    ) -> Result<(), TransportError>;

    /// Remove anything staged on the target for `version`.
    ///
    /// [`Transport::deliver`] cleans up after itself; this is for deliveries
    /// that were cancelled part way.
    async fn cleanup(&self, _version: &Version, _remote: &dyn Shell, _diag: &mut Diagnostics) {}
}

/// Build the strategy for `method` from the config.
pub fn for_method(method: TransportMethod, config: &Config) -> Box<dyn Transport> {
    let images = config.images.iter().cloned().collect();
    match method {
        TransportMethod::Tar => Box::new(TarTransport::new(config.project.clone(), images)),
        TransportMethod::Registry => {
            Box::new(RegistryTransport::new(images, config.registry.clone()))
        }
        TransportMethod::Local => Box::new(LocalTransport::new(images, config.target.local)),
    }
}

/// `docker image inspect` command printing the image id.
pub(crate) fn image_id_command(reference: &str) -> String {
    let mut command = String::from("docker image inspect --format '{{.Id}}' ");
    command.push_str(&quote(reference));
    command
}

/// Image id of `reference` on `shell`, `None` if the image is absent.
pub async fn image_id(shell: &dyn Shell, reference: &str) -> Result<Option<String>, ShellError> {
    let output = shell.exec(&image_id_command(reference)).await?;
    if !output.success() {
        return Ok(None);
    }
    let id = output.stdout.trim();
    Ok((!id.is_empty()).then(|| id.to_string()))
}
