// ABOUTME: Deployment target configuration.
// ABOUTME: One host, the deploy root on it, and how to reach it over SSH.

use crate::ssh::SessionConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    /// Directory on the target holding the compose file and `.deploy/` state.
    pub root: String,
    /// Deploy to the machine deckhand runs on instead of connecting over SSH.
    #[serde(default)]
    pub local: bool,
    #[serde(default)]
    pub trust_first_connection: bool,
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,
}

fn default_port() -> u16 {
    22
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(600)
}

impl TargetConfig {
    /// SSH user, falling back to `$USER` and then `root`.
    pub fn user(&self) -> String {
        self.user
            .clone()
            .unwrap_or_else(|| std::env::var("USER").unwrap_or_else(|_| "root".to_string()))
    }

    /// Label for status lines, e.g. `deploy@prod.example.com:/opt/shop`.
    pub fn display(&self) -> String {
        if self.local {
            format!("localhost:{}", self.root)
        } else {
            format!("{}@{}:{}", self.user(), self.host, self.root)
        }
    }

    pub fn ssh_session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::new(&self.host, self.user())
            .port(self.port)
            .trust_on_first_use(self.trust_first_connection)
            .connect_timeout(self.connect_timeout)
            .command_timeout(self.command_timeout);
        if let Some(key) = &self.key_path {
            config = config.key_path(key);
        }
        config
    }
}
