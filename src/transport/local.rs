// ABOUTME: Local transport for same-host deployments.
// ABOUTME: Nothing is copied; the images only have to exist already.

use super::error::{MissingImageSnafu, NotLocalTargetSnafu, LoadSnafu};
use super::{Transport, TransportError, TransportMethod, image_id};
use crate::diagnostics::Diagnostics;
use crate::shell::Shell;
use crate::types::ImageName;
use crate::version::Version;
use async_trait::async_trait;
use snafu::{OptionExt, ResultExt, ensure};

pub struct LocalTransport {
    images: Vec<ImageName>,
    target_is_local: bool,
}

impl LocalTransport {
    pub fn new(images: Vec<ImageName>, target_is_local: bool) -> Self {
        Self {
            images,
            target_is_local,
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn method(&self) -> TransportMethod {
        TransportMethod::Local
    }

    fn validate(&self) -> Result<(), TransportError> {
        ensure!(self.target_is_local, NotLocalTargetSnafu);
        Ok(())
    }

    async fn deliver(
        &self,
        version: &Version,
        _local: &dyn Shell,
        remote: &dyn Shell,
        _diag: &mut Diagnostics,
    ) -> Result<(), TransportError> {
        self.validate()?;
        for image in &self.images {
            let reference = image.tagged(version.as_str());
            image_id(remote, &reference)
                .await
                .context(LoadSnafu { host: remote.host() })?
                .context(MissingImageSnafu {
                    image: reference.clone(),
                    host: remote.host(),
                })?;
        }
        Ok(())
    }
}
