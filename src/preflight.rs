// ABOUTME: Preflight validator running non-mutating checks before a deployment.
// ABOUTME: Every check runs and is reported; the caller decides what failures mean.

use crate::config::{Config, NameMismatchPolicy};
use crate::shell::{Shell, quote};
use crate::state::RemoteTargetState;
use crate::transport::{self, Transport, TransportMethod};
use crate::version::Version;
use serde::Serialize;
use std::fmt;

/// Whether a failed check stops the deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Aborts in non-interactive mode, needs confirmation otherwise.
    Blocking,
    /// Shown to the operator; proceeds under `--force`.
    Advisory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub check: &'static str,
    pub ok: bool,
    pub detail: String,
    pub severity: Severity,
}

impl CheckResult {
    fn pass(check: &'static str, detail: impl Into<String>) -> Self {
        Self {
            check,
            ok: true,
            detail: detail.into(),
            severity: Severity::Blocking,
        }
    }

    fn fail(check: &'static str, detail: impl Into<String>) -> Self {
        Self {
            check,
            ok: false,
            detail: detail.into(),
            severity: Severity::Blocking,
        }
    }

    fn advisory(mut self) -> Self {
        self.severity = Severity::Advisory;
        self
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = match (self.ok, self.severity) {
            (true, _) => "ok",
            (false, Severity::Blocking) => "FAIL",
            (false, Severity::Advisory) => "warn",
        };
        write!(f, "[{:>4}] {}: {}", mark, self.check, self.detail)
    }
}

/// Results of one preflight pass, in the order the checks ran.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PreflightReport {
    pub results: Vec<CheckResult>,
}

impl PreflightReport {
    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| !r.ok)
    }

    pub fn blocking_failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.failures()
            .filter(|r| r.severity == Severity::Blocking)
    }

    pub fn advisory_failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.failures()
            .filter(|r| r.severity == Severity::Advisory)
    }

    pub fn has_blocking_failures(&self) -> bool {
        self.blocking_failures().next().is_some()
    }

    pub fn is_clear(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn get(&self, check: &str) -> Option<&CheckResult> {
        self.results.iter().find(|r| r.check == check)
    }
}

/// What the attempt is about to do, as far as preflight cares.
pub struct PreflightPlan<'a> {
    pub version: &'a Version,
    pub transport: &'a dyn Transport,
    /// The build phase is skipped, so the artifacts must already exist.
    pub expect_artifacts: bool,
}

pub struct PreflightValidator<'a> {
    config: &'a Config,
    local: &'a dyn Shell,
    remote: &'a dyn Shell,
}

impl<'a> PreflightValidator<'a> {
    pub fn new(config: &'a Config, local: &'a dyn Shell, remote: &'a dyn Shell) -> Self {
        Self {
            config,
            local,
            remote,
        }
    }

    pub async fn run(&self, plan: &PreflightPlan<'_>) -> PreflightReport {
        let mut report = PreflightReport::default();

        report.results.push(self.check_transport(plan.transport));

        let reachable = self.check_reachability().await;
        let reached = reachable.ok;
        report.results.push(reachable);

        if plan.expect_artifacts {
            report.results.push(
                self.check_artifacts(plan.version, plan.transport.method(), reached)
                    .await,
            );
        }

        if !reached {
            tracing::warn!("target unreachable, skipping remote checks");
            return report;
        }

        match RemoteTargetState::query(self.remote).await {
            Ok(state) => {
                report.results.push(self.check_naming(&state));
                report.results.push(self.check_ports(&state).await);
            }
            Err(e) => {
                report.results.push(CheckResult::fail(
                    "naming",
                    format!("could not list containers: {}", e),
                ));
            }
        }
        report.results.push(self.check_remote_paths().await);

        report
    }

    fn check_transport(&self, transport: &dyn Transport) -> CheckResult {
        match transport.validate() {
            Ok(()) => CheckResult::pass("transport", format!("{} transport ready", transport.method())),
            Err(e) => CheckResult::fail("transport", e.to_string()),
        }
    }

    async fn check_reachability(&self) -> CheckResult {
        let timeout = self.config.target.connect_timeout;
        match self.remote.exec_with_timeout("true", timeout).await {
            Ok(output) if output.success() => {
                CheckResult::pass("reachability", format!("{} reachable", self.remote.host()))
            }
            Ok(output) => CheckResult::fail(
                "reachability",
                format!(
                    "{} answered with exit {}",
                    self.remote.host(),
                    output.exit_code
                ),
            ),
            Err(e) => CheckResult::fail(
                "reachability",
                format!("{} unreachable: {}", self.remote.host(), e),
            ),
        }
    }

    async fn check_artifacts(
        &self,
        version: &Version,
        method: TransportMethod,
        reached: bool,
    ) -> CheckResult {
        // Local deploys load nothing, so the images must already sit on the target.
        let shell = match method {
            TransportMethod::Local if !reached => {
                return CheckResult::fail("artifacts", "target unreachable");
            }
            TransportMethod::Local => self.remote,
            TransportMethod::Tar | TransportMethod::Registry => self.local,
        };

        let mut missing = Vec::new();
        for image in self.config.images.iter() {
            let reference = image.tagged(version.as_str());
            match transport::image_id(shell, &reference).await {
                Ok(Some(_)) => {}
                Ok(None) => missing.push(reference),
                Err(e) => missing.push(format!("{} ({})", reference, e)),
            }
        }

        if missing.is_empty() {
            CheckResult::pass(
                "artifacts",
                format!("all images tagged {} present on {}", version, shell.host()),
            )
        } else {
            CheckResult::fail(
                "artifacts",
                format!("missing on {}: {}", shell.host(), missing.join(", ")),
            )
        }
    }

    fn check_naming(&self, state: &RemoteTargetState) -> CheckResult {
        let project = &self.config.project;
        let strangers: Vec<&str> = state
            .running_outside_project(project)
            .map(|c| c.name.as_str())
            .collect();

        if strangers.is_empty() {
            return CheckResult::pass(
                "naming",
                format!("all running containers belong to {}", project),
            );
        }

        let result = CheckResult::fail(
            "naming",
            format!(
                "running containers not named after {}: {}",
                project,
                strangers.join(", ")
            ),
        );
        match self.config.preflight.name_mismatch {
            NameMismatchPolicy::Warn => result.advisory(),
            NameMismatchPolicy::Fail => result,
        }
    }

    async fn check_ports(&self, state: &RemoteTargetState) -> CheckResult {
        if state
            .running_in_project(&self.config.project)
            .next()
            .is_some()
        {
            return CheckResult::pass("ports", "stack running, ports will be taken over");
        }

        let mut busy = Vec::new();
        for port in &self.config.ports {
            let command = format!("ss -ltnH {}", quote(&format!("sport = :{}", port)));
            match self.remote.exec(&command).await {
                Ok(output) if output.success() && output.stdout.trim().is_empty() => {}
                Ok(output) if output.success() => busy.push(port.to_string()),
                Ok(output) => busy.push(format!("{} (ss exited {})", port, output.exit_code)),
                Err(e) => busy.push(format!("{} ({})", port, e)),
            }
        }

        if busy.is_empty() {
            CheckResult::pass("ports", "all ports free")
        } else {
            CheckResult::fail("ports", format!("ports in use: {}", busy.join(", ")))
        }
    }

    async fn check_remote_paths(&self) -> CheckResult {
        let mut paths = vec![
            self.config.target.root.clone(),
            self.config.compose_path(),
        ];
        paths.extend(
            self.config
                .required_files
                .iter()
                .map(|f| self.config.remote_path(f)),
        );

        let mut missing = Vec::new();
        for path in paths {
            match self.remote.file_exists(&path).await {
                Ok(true) => {}
                Ok(false) => missing.push(path),
                Err(e) => missing.push(format!("{} ({})", path, e)),
            }
        }

        if missing.is_empty() {
            CheckResult::pass("remote-paths", "deploy root and required files present")
        } else {
            CheckResult::fail("remote-paths", format!("missing: {}", missing.join(", ")))
        }
    }
}
