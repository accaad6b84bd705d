// ABOUTME: Registry credentials for the registry transport.
// ABOUTME: Resolved from literals or env vars once while the config is loaded.

use super::EnvValue;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

#[derive(Debug, Deserialize)]
struct RegistrySection {
    #[serde(default)]
    url: Option<EnvValue>,
    #[serde(default)]
    user: Option<EnvValue>,
    #[serde(default)]
    token: Option<EnvValue>,
}

/// Registry URL, user and token. Any of them may be empty until the
/// registry transport validates them.
#[derive(Debug, Clone, Default)]
pub struct RegistryCredentials {
    pub url: String,
    pub user: String,
    pub token: SecretString,
}

impl RegistryCredentials {
    pub fn new(url: impl Into<String>, user: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user: user.into(),
            token: SecretString::from(token.into()),
        }
    }

    /// Names of the credentials that are empty.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.url.trim().is_empty() {
            missing.push("url");
        }
        if self.user.trim().is_empty() {
            missing.push("user");
        }
        if self.token.expose_secret().trim().is_empty() {
            missing.push("token");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }
}

pub fn deserialize_registry<'de, D>(deserializer: D) -> Result<RegistryCredentials, D::Error>
where
    D: Deserializer<'de>,
{
    let section = RegistrySection::deserialize(deserializer)?;
    let resolve = |value: Option<EnvValue>| {
        value
            .map(|v| v.resolve_or_empty())
            .unwrap_or_default()
    };
    Ok(RegistryCredentials::new(
        resolve(section.url),
        resolve(section.user),
        resolve(section.token),
    ))
}
