// ABOUTME: Remote persisted layout and live target state queries.
// ABOUTME: RemoteTargetState is read fresh on every call and never cached.

use crate::shell::{Shell, ShellError, quote};
use crate::types::ProjectName;
use serde::Deserialize;

/// Paths of deckhand's state files under the deploy root on the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    root: String,
}

impl RemoteLayout {
    pub fn new(root: &str) -> Self {
        Self {
            root: root.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// `<root>/.deploy`
    pub fn state_dir(&self) -> String {
        format!("{}/.deploy", self.root)
    }

    pub fn current_version(&self) -> String {
        format!("{}/current_version", self.state_dir())
    }

    pub fn current_method(&self) -> String {
        format!("{}/current_method", self.state_dir())
    }

    pub fn versions_log(&self) -> String {
        format!("{}/versions.log", self.state_dir())
    }

    pub fn lock_file(&self) -> String {
        format!("{}/deploy.lock", self.state_dir())
    }
}

/// One container as reported by `docker ps`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContainerState {
    #[serde(rename = "Names")]
    pub name: String,
    #[serde(rename = "Image")]
    pub image: String,
    /// `running`, `exited`, `created`, ...
    #[serde(rename = "State")]
    pub state: String,
}

impl ContainerState {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// Containers present on the target at the moment of the query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteTargetState {
    pub containers: Vec<ContainerState>,
}

impl RemoteTargetState {
    /// Query the target with a single `docker ps` call.
    pub async fn query(shell: &dyn Shell) -> Result<Self, ShellError> {
        let output = shell.run("docker ps -a --format '{{json .}}'").await?;
        Ok(Self::parse(&output.stdout))
    }

    /// Parse `docker ps --format '{{json .}}'` output, one object per line.
    pub fn parse(stdout: &str) -> Self {
        let containers = stdout
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<ContainerState>(line) {
                Ok(c) => Some(c),
                Err(e) => {
                    tracing::warn!("skipping unparseable docker ps line: {}", e);
                    None
                }
            })
            .collect();
        Self { containers }
    }

    pub fn running(&self) -> impl Iterator<Item = &ContainerState> {
        self.containers.iter().filter(|c| c.is_running())
    }

    /// Running containers that belong to `project`.
    pub fn running_in_project<'a>(
        &'a self,
        project: &'a ProjectName,
    ) -> impl Iterator<Item = &'a ContainerState> {
        self.running().filter(|c| project.owns_container(&c.name))
    }

    /// Running containers that do not belong to `project`.
    pub fn running_outside_project<'a>(
        &'a self,
        project: &'a ProjectName,
    ) -> impl Iterator<Item = &'a ContainerState> {
        self.running().filter(|c| !project.owns_container(&c.name))
    }
}

/// Read a single-line file on the target; `None` when missing or empty.
pub async fn read_remote_line(shell: &dyn Shell, path: &str) -> Result<Option<String>, ShellError> {
    let output = shell
        .exec(&format!("cat {} 2>/dev/null", quote(path)))
        .await?;
    if !output.success() {
        return Ok(None);
    }
    let line = output.stdout.lines().next().unwrap_or("").trim().to_string();
    Ok((!line.is_empty()).then_some(line))
}
