// ABOUTME: Untagged image repository names.
// ABOUTME: Versions are appended as tags, so a configured name must not carry one.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageNameError {
    #[error("image name cannot be empty")]
    Empty,

    #[error("image name must not include a tag or digest: {0}")]
    Tagged(String),

    #[error("invalid character in image name: '{0}'")]
    InvalidChar(char),
}

/// An image repository such as `shop-api` or `ghcr.io/acme/shop-api`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageName(String);

impl ImageName {
    pub fn new(value: &str) -> Result<Self, ImageNameError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ImageNameError::Empty);
        }

        for c in value.chars() {
            if !c.is_ascii_lowercase()
                && !c.is_ascii_digit()
                && !matches!(c, '/' | '.' | '-' | '_' | ':' | '@')
            {
                return Err(ImageNameError::InvalidChar(c));
            }
        }

        // A colon is only allowed as a registry port ("host:5000/app").
        let last_segment = value.rsplit('/').next().unwrap_or(value);
        if value.contains('@') || last_segment.contains(':') {
            return Err(ImageNameError::Tagged(value.to_string()));
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reference to this image at the given tag.
    pub fn tagged(&self, tag: &str) -> String {
        format!("{}:{}", self.0, tag)
    }

    /// The same image under a registry prefix, e.g. `registry.example.com/shop-api`.
    pub fn in_registry(&self, registry: &str) -> ImageName {
        ImageName(format!("{}/{}", registry.trim_end_matches('/'), self.0))
    }
}

impl fmt::Display for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
