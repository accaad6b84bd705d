// ABOUTME: Tar transport: docker save locally, copy over SSH, docker load remotely.
// ABOUTME: Delivery is verified by comparing image ids on both ends.

use super::error::{
    DigestMismatchSnafu, ExportSnafu, LoadSnafu, MissingImageSnafu, StagingSnafu, UploadSnafu,
};
use super::{Transport, TransportError, TransportMethod, image_id};
use crate::diagnostics::{Diagnostics, Warning};
use crate::shell::{Shell, quote};
use crate::types::{ImageName, ProjectName};
use crate::version::Version;
use async_trait::async_trait;
use snafu::{OptionExt, ResultExt, ensure};

pub struct TarTransport {
    project: ProjectName,
    images: Vec<ImageName>,
}

impl TarTransport {
    pub fn new(project: ProjectName, images: Vec<ImageName>) -> Self {
        Self { project, images }
    }

    /// Where the archive is staged on the target.
    pub fn remote_archive(&self, version: &Version) -> String {
        format!("/tmp/deckhand-{}-{}.tar.gz", self.project, version)
    }

    fn references(&self, version: &Version) -> Vec<String> {
        self.images
            .iter()
            .map(|image| image.tagged(version.as_str()))
            .collect()
    }

    async fn transfer(
        &self,
        version: &Version,
        local: &dyn Shell,
        remote: &dyn Shell,
        archive: &str,
        diag: &mut Diagnostics,
    ) -> Result<(), TransportError> {
        let references = self.references(version);
        let joined = references.join(" ");

        let staging = tempfile::Builder::new()
            .prefix("deckhand-")
            .tempdir()
            .context(StagingSnafu)?;
        let local_archive = staging
            .path()
            .join(format!("{}-{}.tar", self.project, version));
        let local_archive_str = local_archive.to_string_lossy();

        let refs_quoted: Vec<String> = references.iter().map(|r| quote(r)).collect();
        let save = format!(
            "docker save -o {} {} && gzip -f {}",
            quote(&local_archive_str),
            refs_quoted.join(" "),
            quote(&local_archive_str)
        );
        tracing::info!("exporting {}", joined);
        local
            .run(&save)
            .await
            .context(ExportSnafu { images: joined.clone() })?;

        let gzipped = local_archive.with_extension("tar.gz");
        tracing::info!("copying archive to {}:{}", remote.host(), archive);
        remote
            .upload(&gzipped, archive)
            .await
            .context(UploadSnafu { host: remote.host() })?;

        remote
            .run(&format!("docker load -i {}", quote(archive)))
            .await
            .context(LoadSnafu { host: remote.host() })?;

        for reference in &references {
            let expected = image_id(local, reference)
                .await
                .context(ExportSnafu { images: reference.clone() })?
                .context(MissingImageSnafu {
                    image: reference.clone(),
                    host: local.host(),
                })?;
            let actual = image_id(remote, reference)
                .await
                .context(LoadSnafu { host: remote.host() })?
                .context(MissingImageSnafu {
                    image: reference.clone(),
                    host: remote.host(),
                })?;
            ensure!(
                expected == actual,
                DigestMismatchSnafu {
                    image: reference.clone(),
                    local: expected,
                    remote: actual,
                }
            );
        }

        if let Err(e) = staging.close() {
            diag.warn(Warning::cleanup(format!(
                "failed to remove local staging directory: {}",
                e
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for TarTransport {
    fn method(&self) -> TransportMethod {
        TransportMethod::Tar
    }

    async fn deliver(
        &self,
        version: &Version,
        local: &dyn Shell,
        remote: &dyn Shell,
        diag: &mut Diagnostics,
    ) -> Result<(), TransportError> {
        let archive = self.remote_archive(version);
        let result = self.transfer(version, local, remote, &archive, diag).await;
        self.cleanup(version, remote, diag).await;
        result
    }

    async fn cleanup(&self, version: &Version, remote: &dyn Shell, diag: &mut Diagnostics) {
        let archive = self.remote_archive(version);
        let failure = match remote.exec(&format!("rm -f {}", quote(&archive))).await {
            Ok(output) if output.success() => return,
            Ok(output) => output.stderr.trim().to_string(),
            Err(e) => e.to_string(),
        };
        diag.warn(Warning::cleanup(format!(
            "failed to remove {} on {}: {}",
            archive,
            remote.host(),
            failure
        )));
    }
}
