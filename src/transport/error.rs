// ABOUTME: Transport error types with SNAFU context selectors.
// ABOUTME: Each variant names the image and host a failing step was working on.

use crate::shell::ShellError;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TransportError {
    #[snafu(display("registry credentials incomplete, missing: {}", missing.join(", ")))]
    MissingCredentials { missing: Vec<&'static str> },

    #[snafu(display("local transport requires a local target (set target.local: true)"))]
    NotLocalTarget,

    #[snafu(display("failed to create local staging directory: {source}"))]
    Staging { source: std::io::Error },

    #[snafu(display("failed to export {images} locally: {source}"))]
    Export { images: String, source: ShellError },

    #[snafu(display("failed to copy archive to {host}: {source}"))]
    Upload { host: String, source: ShellError },

    #[snafu(display("failed to load archive on {host}: {source}"))]
    Load { host: String, source: ShellError },

    #[snafu(display("image {image} is not present on {host}"))]
    MissingImage { image: String, host: String },

    #[snafu(display("image {image} on the target has id {remote}, expected {local}"))]
    DigestMismatch {
        image: String,
        local: String,
        remote: String,
    },

    #[snafu(display("registry login failed on {host}: {source}"))]
    Login { host: String, source: ShellError },

    #[snafu(display("failed to tag {image}: {source}"))]
    Tag { image: String, source: ShellError },

    #[snafu(display("failed to push {image}: {source}"))]
    Push { image: String, source: ShellError },

    #[snafu(display("failed to pull {image} on {host}: {source}"))]
    Pull {
        image: String,
        host: String,
        source: ShellError,
    },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Rejected before anything was moved.
    Validation,
    /// Failed while moving or loading images.
    Delivery,
    /// Images arrived but do not match what was sent.
    Integrity,
}

impl TransportError {
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            TransportError::MissingCredentials { .. } | TransportError::NotLocalTarget => {
                TransportErrorKind::Validation
            }
            TransportError::DigestMismatch { .. } | TransportError::MissingImage { .. } => {
                TransportErrorKind::Integrity
            }
            _ => TransportErrorKind::Delivery,
        }
    }
}
