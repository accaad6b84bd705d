// ABOUTME: Compose project name validation.
// ABOUTME: Project names prefix every container the stack creates on the target.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectNameError {
    #[error("project name cannot be empty")]
    Empty,

    #[error("project name exceeds maximum length of 63 characters")]
    TooLong,

    #[error("project name must start with a lowercase letter or digit")]
    BadStart,

    #[error("project name must be lowercase")]
    NotLowercase,

    #[error("invalid character in project name: '{0}'")]
    InvalidChar(char),
}

/// Name of the compose project deployed on the target host.
///
/// Docker Compose accepts lowercase alphanumerics, `-` and `_`, and requires
/// the first character to be alphanumeric.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectName(String);

impl ProjectName {
    pub fn new(value: &str) -> Result<Self, ProjectNameError> {
        let first = value.chars().next().ok_or(ProjectNameError::Empty)?;

        if value.len() > 63 {
            return Err(ProjectNameError::TooLong);
        }

        if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
            return Err(if first.is_ascii_uppercase() {
                ProjectNameError::NotLowercase
            } else {
                ProjectNameError::BadStart
            });
        }

        for c in value.chars() {
            if c.is_ascii_uppercase() {
                return Err(ProjectNameError::NotLowercase);
            }
            if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' && c != '_' {
                return Err(ProjectNameError::InvalidChar(c));
            }
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a container name belongs to this project.
    ///
    /// Compose v2 names containers `<project>-<service>-<n>`, v1 used
    /// underscores.
    pub fn owns_container(&self, container_name: &str) -> bool {
        let name = container_name.trim_start_matches('/');
        name.strip_prefix(self.0.as_str())
            .is_some_and(|rest| rest.starts_with('-') || rest.starts_with('_'))
    }
}

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
