// ABOUTME: Environment variable value types with interpolation support.
// ABOUTME: Handles literal values and references to environment variables.

use crate::error::{Error, Result};
use serde::Deserialize;

/// A config value given literally or looked up from the environment once at load.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    FromEnv {
        #[serde(rename = "env")]
        var: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl EnvValue {
    pub fn resolve(&self) -> Result<String> {
        match self {
            EnvValue::Literal(s) => Ok(s.clone()),
            EnvValue::FromEnv { var, default } => match std::env::var(var) {
                Ok(val) => Ok(val),
                Err(_) => default
                    .clone()
                    .ok_or_else(|| Error::MissingEnvVar(var.clone())),
            },
        }
    }

    /// Resolve, treating an unset variable without default as empty.
    ///
    /// Used for credentials that are only required by some transport
    /// methods; emptiness is reported by the method that needs them.
    pub fn resolve_or_empty(&self) -> String {
        self.resolve().unwrap_or_else(|e| {
            tracing::debug!("{e}; treating as empty");
            String::new()
        })
    }
}
