// ABOUTME: Configuration types and parsing for deckhand.yml.
// ABOUTME: Builds the single immutable Config every deployment phase receives.

mod deserialize;
mod env_value;
mod health;
mod init;
mod registry;
mod target;

pub use env_value::EnvValue;
pub use health::HealthConfig;
pub use init::init_config;
pub use registry::RegistryCredentials;
pub use target::TargetConfig;

use crate::error::{Error, Result};
use crate::health::{EndpointCheck, Probe};
use crate::types::{ImageName, ProjectName};
use deserialize::{deserialize_images, deserialize_project_name};
use nonempty::NonEmpty;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "deckhand.yml";
pub const CONFIG_FILENAME_ALT: &str = "deckhand.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".deckhand/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(deserialize_with = "deserialize_project_name")]
    pub project: ProjectName,

    pub target: TargetConfig,

    #[serde(deserialize_with = "deserialize_images")]
    pub images: NonEmpty<ImageName>,

    #[serde(default = "default_compose_file")]
    pub compose_file: String,

    /// Files relative to the deploy root that must exist before deploying.
    #[serde(default)]
    pub required_files: Vec<String>,

    /// Host ports the stack binds.
    #[serde(default)]
    pub ports: Vec<u16>,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default, deserialize_with = "registry::deserialize_registry")]
    pub registry: RegistryCredentials,

    #[serde(default)]
    pub backup: BackupConfig,

    pub health: HealthConfig,

    #[serde(default)]
    pub preflight: PreflightConfig,

    #[serde(default)]
    pub lock: LockConfig,

    /// Operator-local state directory; defaults to
    /// `~/.local/state/deckhand/<project>`.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

fn default_compose_file() -> String {
    "docker-compose.yml".to_string()
}

/// Delegated image build, run on the operator's machine.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    /// Run with `APP_VERSION` set; must produce `<image>:<version>` for
    /// every configured image.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default = "default_build_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_build_timeout() -> Duration {
    Duration::from_secs(1800)
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: None,
            timeout: default_build_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackupConfig {
    /// Backup program run on the target as `<command> <dir> <retention_days>`.
    #[serde(default = "default_backup_command")]
    pub command: String,
    /// Backup directory, relative to the deploy root unless absolute.
    #[serde(default = "default_backup_dir")]
    pub dir: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// A backup at or below this size is a failed backup.
    #[serde(default = "default_min_size_bytes")]
    pub min_size_bytes: u64,
    #[serde(default = "default_backup_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_backup_command() -> String {
    "./scripts/backup.sh".to_string()
}

fn default_backup_dir() -> String {
    "backups".to_string()
}

fn default_retention_days() -> u32 {
    7
}

fn default_min_size_bytes() -> u64 {
    100 * 1024
}

fn default_backup_timeout() -> Duration {
    Duration::from_secs(1800)
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            command: default_backup_command(),
            dir: default_backup_dir(),
            retention_days: default_retention_days(),
            min_size_bytes: default_min_size_bytes(),
            timeout: default_backup_timeout(),
        }
    }
}

/// What a running container outside the configured project means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameMismatchPolicy {
    /// Advisory: shown to the operator, who may proceed.
    #[default]
    Warn,
    /// Blocking: treated like any other failed check.
    Fail,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreflightConfig {
    #[serde(default)]
    pub name_mismatch: NameMismatchPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockConfig {
    /// Locks older than this are broken automatically.
    #[serde(default = "default_stale_after", with = "humantime_serde")]
    pub stale_after: Duration,
}

fn default_stale_after() -> Duration {
    Duration::from_secs(3600)
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_after: default_stale_after(),
        }
    }
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    fn validate(&self) -> Result<()> {
        if !self.target.root.starts_with('/') {
            return Err(Error::InvalidConfig(format!(
                "target.root must be an absolute path, got {}",
                self.target.root
            )));
        }
        if self.health.attempts == 0 {
            return Err(Error::InvalidConfig(
                "health.attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Absolute path of the compose file on the target.
    pub fn compose_path(&self) -> String {
        self.remote_path(&self.compose_file)
    }

    /// Absolute backup directory on the target.
    pub fn backup_dir(&self) -> String {
        self.remote_path(&self.backup.dir)
    }

    /// Resolve a path relative to the deploy root.
    pub fn remote_path(&self, path: &str) -> String {
        if path.starts_with('/') {
            path.to_string()
        } else {
            format!("{}/{}", self.target.root.trim_end_matches('/'), path)
        }
    }

    /// Local state directory for history and pointer mirrors.
    pub fn local_state_dir(&self) -> PathBuf {
        if let Some(dir) = &self.state_dir {
            return dir.clone();
        }
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home)
            .join(".local/state/deckhand")
            .join(self.project.as_str())
    }

    /// A minimal valid config, used by `deckhand init` and tests.
    pub fn template() -> Self {
        Config {
            project: ProjectName::new("myapp").expect("template project name is valid"),
            target: TargetConfig {
                host: "server.example.com".to_string(),
                port: 22,
                user: Some("deploy".to_string()),
                key_path: None,
                root: "/opt/myapp".to_string(),
                local: false,
                trust_first_connection: false,
                connect_timeout: Duration::from_secs(10),
                command_timeout: Duration::from_secs(600),
            },
            images: NonEmpty::from((
                ImageName::new("myapp-api").expect("template image name is valid"),
                vec![ImageName::new("myapp-web").expect("template image name is valid")],
            )),
            compose_file: default_compose_file(),
            required_files: vec![".env".to_string()],
            ports: vec![3000, 8080],
            build: BuildConfig::default(),
            registry: RegistryCredentials::default(),
            backup: BackupConfig::default(),
            health: HealthConfig::new(NonEmpty::from((
                EndpointCheck::new(
                    "api",
                    "http://localhost:3000/health",
                    Probe::JsonField {
                        field: "status".to_string(),
                        equals: "healthy".to_string(),
                    },
                ),
                vec![EndpointCheck::new(
                    "web",
                    "http://localhost:8080/",
                    Probe::HttpOk,
                )],
            ))),
            preflight: PreflightConfig::default(),
            lock: LockConfig::default(),
            state_dir: None,
        }
    }
}
