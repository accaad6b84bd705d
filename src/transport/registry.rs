// ABOUTME: Registry transport: tag and push locally, pull and retag on the target.
// ABOUTME: Credentials are validated before anything is pushed.

use super::error::{
    LoginSnafu, MissingCredentialsSnafu, PullSnafu, PushSnafu, TagSnafu,
};
use super::{Transport, TransportError, TransportMethod};
use crate::config::RegistryCredentials;
use crate::diagnostics::Diagnostics;
use crate::shell::{Shell, ShellError, quote};
use crate::types::ImageName;
use crate::version::Version;
use async_trait::async_trait;
use secrecy::ExposeSecret;
use snafu::{ResultExt, ensure};

pub struct RegistryTransport {
    images: Vec<ImageName>,
    credentials: RegistryCredentials,
}

impl RegistryTransport {
    pub fn new(images: Vec<ImageName>, credentials: RegistryCredentials) -> Self {
        Self {
            images,
            credentials,
        }
    }

    fn registry_host(&self) -> &str {
        let url = self.credentials.url.trim();
        let url = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .unwrap_or(url);
        url.trim_end_matches('/')
    }

    async fn login(&self, shell: &dyn Shell) -> Result<(), ShellError> {
        let command = format!(
            "docker login {} -u {} --password-stdin",
            quote(self.registry_host()),
            quote(&self.credentials.user)
        );
        let output = shell
            .exec_with_input(&command, self.credentials.token.expose_secret().as_bytes())
            .await?;
        if output.success() {
            Ok(())
        } else {
            Err(ShellError::Failed {
                command,
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl Transport for RegistryTransport {
    fn method(&self) -> TransportMethod {
        TransportMethod::Registry
    }

    fn validate(&self) -> Result<(), TransportError> {
        let missing = self.credentials.missing();
        ensure!(missing.is_empty(), MissingCredentialsSnafu { missing });
        Ok(())
    }

    async fn deliver(
        &self,
        version: &Version,
        local: &dyn Shell,
        remote: &dyn Shell,
        _diag: &mut Diagnostics,
    ) -> Result<(), TransportError> {
        self.validate()?;

        self.login(local)
            .await
            .context(LoginSnafu { host: local.host() })?;
        for image in &self.images {
            let source = image.tagged(version.as_str());
            let pushed = image.in_registry(self.registry_host()).tagged(version.as_str());
            local
                .run(&format!("docker tag {} {}", quote(&source), quote(&pushed)))
                .await
                .context(TagSnafu { image: source.clone() })?;
            tracing::info!("pushing {}", pushed);
            local
                .run(&format!("docker push {}", quote(&pushed)))
                .await
                .context(PushSnafu { image: pushed.clone() })?;
        }

        self.login(remote)
            .await
            .context(LoginSnafu { host: remote.host() })?;
        for image in &self.images {
            let target = image.tagged(version.as_str());
            let pushed = image.in_registry(self.registry_host()).tagged(version.as_str());
            tracing::info!("pulling {} on {}", pushed, remote.host());
            remote
                .run(&format!("docker pull {}", quote(&pushed)))
                .await
                .context(PullSnafu {
                    image: pushed.clone(),
                    host: remote.host(),
                })?;
            remote
                .run(&format!("docker tag {} {}", quote(&pushed), quote(&target)))
                .await
                .context(TagSnafu { image: pushed.clone() })?;
        }

        Ok(())
    }
}
