// ABOUTME: Health gate run against the target after the stack starts.
// ABOUTME: Polls every endpoint check with bounded attempts and reports all outcomes.

mod probe;

pub use probe::{Probe, ProbeResponse};

use crate::config::HealthConfig;
use crate::shell::{Shell, quote};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;

/// A named endpoint and the probe its response must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointCheck {
    pub name: String,
    pub url: String,
    #[serde(default, rename = "expect")]
    pub probe: Probe,
}

impl EndpointCheck {
    pub fn new(name: impl Into<String>, url: impl Into<String>, probe: Probe) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            probe,
        }
    }
}

/// A check that never passed, with the last observed reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckFailure {
    pub name: String,
    pub detail: String,
}

/// Outcome of a health gate run. Every check appears in exactly one list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub passed: Vec<String>,
    pub failed: Vec<CheckFailure>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_names(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.name.as_str()).collect()
    }

    /// One-line summary such as `api: json status is "degraded"; web: HTTP 502`.
    pub fn failure_summary(&self) -> String {
        self.failed
            .iter()
            .map(|f| format!("{}: {}", f.name, f.detail))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Polls endpoint checks through a [`Shell`] on the target.
///
/// Requests are issued with `curl` on the target itself so that services
/// bound to loopback are reachable.
pub struct HealthChecker {
    settle: Duration,
    interval: Duration,
    attempts: u32,
    timeout: Duration,
    request_timeout: Duration,
}

impl HealthChecker {
    pub fn new(config: &HealthConfig) -> Self {
        Self {
            settle: config.settle,
            interval: config.interval,
            attempts: config.attempts.max(1),
            timeout: config.timeout,
            request_timeout: config.request_timeout,
        }
    }

    /// Run every check until it passes, its attempts run out, or the overall
    /// timeout elapses. A failing check never stops the others.
    pub async fn verify(&self, shell: &dyn Shell, checks: &[EndpointCheck]) -> HealthReport {
        if !self.settle.is_zero() {
            tracing::debug!("waiting {:?} for services to bind", self.settle);
            tokio::time::sleep(self.settle).await;
        }

        let deadline = Instant::now() + self.timeout;
        let mut pending: Vec<(&EndpointCheck, String)> = checks
            .iter()
            .map(|c| (c, "not probed".to_string()))
            .collect();
        let mut report = HealthReport::default();

        let polled =
            tokio::time::timeout_at(deadline, self.poll(shell, &mut pending, &mut report)).await;
        if polled.is_err() {
            tracing::warn!("health check timeout of {:?} reached", self.timeout);
            for (_, reason) in &mut pending {
                *reason = format!("{} (gave up after {:?})", reason, self.timeout);
            }
        }

        report.failed = pending
            .into_iter()
            .map(|(check, detail)| CheckFailure {
                name: check.name.clone(),
                detail,
            })
            .collect();
        report
    }

    /// Probe rounds; checks that pass leave `pending`, the rest keep their
    /// latest failure reason.
    async fn poll<'c>(
        &self,
        shell: &dyn Shell,
        pending: &mut Vec<(&'c EndpointCheck, String)>,
        report: &mut HealthReport,
    ) {
        for attempt in 1..=self.attempts {
            let mut i = 0;
            while i < pending.len() {
                let check = pending[i].0;
                match self.probe(shell, check).await {
                    Ok(()) => {
                        tracing::info!(check = %check.name, attempt, "health check passed");
                        report.passed.push(check.name.clone());
                        pending.remove(i);
                    }
                    Err(reason) => {
                        tracing::debug!(check = %check.name, attempt, %reason, "health check not passing yet");
                        pending[i].1 = reason;
                        i += 1;
                    }
                }
            }

            if pending.is_empty() || attempt == self.attempts {
                return;
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    async fn probe(&self, shell: &dyn Shell, check: &EndpointCheck) -> Result<(), String> {
        let response = self.fetch(shell, &check.url).await?;
        check.probe.evaluate(&response)
    }

    async fn fetch(&self, shell: &dyn Shell, url: &str) -> Result<ProbeResponse, String> {
        let command = format!(
            "curl -sS -o - -w '\\n%{{http_code}}' --max-time {} {}",
            self.request_timeout.as_secs().max(1),
            quote(url)
        );
        let output = shell
            .exec_with_timeout(&command, self.request_timeout + Duration::from_secs(5))
            .await
            .map_err(|e| e.to_string())?;

        if !output.success() {
            return Err(format!(
                "request failed (curl exit {}): {}",
                output.exit_code,
                output.stderr.trim()
            ));
        }

        parse_curl_output(&output.stdout)
    }
}

/// Split curl's `body\nstatus` output.
fn parse_curl_output(stdout: &str) -> Result<ProbeResponse, String> {
    let (body, status) = stdout.rsplit_once('\n').unwrap_or(("", stdout));
    let status = status
        .trim()
        .parse::<u16>()
        .map_err(|_| format!("unparseable HTTP status: {:?}", status.trim()))?;
    Ok(ProbeResponse {
        status,
        body: body.to_string(),
    })
}
