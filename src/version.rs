// ABOUTME: Deployment version identifiers and the version manager.
// ABOUTME: Versions are `{short-hash}-{YYYYMMDD-HHMMSS}` unless pinned explicitly.

use crate::shell::{Shell, ShellError};
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("version cannot be empty")]
    Empty,

    #[error("version exceeds maximum length of 128 characters")]
    TooLong,

    #[error("version cannot start with '{0}'")]
    BadStart(char),

    #[error("invalid character in version: '{0}'")]
    InvalidChar(char),

    #[error("invalid source revision: {0:?}")]
    InvalidRevision(String),

    #[error("cannot determine source revision: {0}")]
    Revision(#[source] ShellError),
}

/// Immutable identifier for one deployment attempt's artifact set.
///
/// Used verbatim as the image tag, so it follows docker tag rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version(String);

impl Version {
    pub fn parse(value: &str) -> Result<Self, VersionError> {
        let value = value.trim();
        let first = value.chars().next().ok_or(VersionError::Empty)?;

        if value.len() > 128 {
            return Err(VersionError::TooLong);
        }
        if first == '.' || first == '-' {
            return Err(VersionError::BadStart(first));
        }
        if let Some(c) = value
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '_' | '.' | '-'))
        {
            return Err(VersionError::InvalidChar(c));
        }

        Ok(Self(value.to_string()))
    }

    /// Build a version from a revision short hash and a point in time.
    pub fn generate(short_hash: &str, at: DateTime<Utc>) -> Result<Self, VersionError> {
        let hash = short_hash.trim();
        if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(VersionError::InvalidRevision(hash.to_string()));
        }
        Self::parse(&format!(
            "{}-{}",
            hash.to_ascii_lowercase(),
            at.format(TIMESTAMP_FORMAT)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of wall-clock time, injectable for deterministic tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// The version an attempt deploys, and whether it was pinned by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    pub version: Version,
    /// A pinned version refers to artifacts that already exist, so the build
    /// phase is skipped.
    pub pinned: bool,
}

/// Generates and resolves deployment versions.
pub struct VersionManager<'a> {
    clock: &'a dyn Clock,
}

impl<'a> VersionManager<'a> {
    pub fn new(clock: &'a dyn Clock) -> Self {
        Self { clock }
    }

    /// Derive a fresh version from the working tree's revision and the clock.
    pub async fn new_version(&self, local: &dyn Shell) -> Result<Version, VersionError> {
        let output = local
            .run("git rev-parse --short HEAD")
            .await
            .map_err(VersionError::Revision)?;
        Version::generate(output.stdout.trim(), self.clock.now())
    }

    /// Use `explicit` when given (pinning or rolling back to it), otherwise
    /// generate a new version.
    pub async fn resolve(
        &self,
        explicit: Option<&str>,
        local: &dyn Shell,
    ) -> Result<ResolvedVersion, VersionError> {
        match explicit {
            Some(v) => Ok(ResolvedVersion {
                version: Version::parse(v)?,
                pinned: true,
            }),
            None => Ok(ResolvedVersion {
                version: self.new_version(local).await?,
                pinned: false,
            }),
        }
    }
}
