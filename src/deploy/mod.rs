// ABOUTME: Deployment orchestrator sequencing every phase of one attempt.
// ABOUTME: Owns the abort, prompt and rollback decisions and records every outcome.

mod interrupt;
mod outcome;

pub use interrupt::Interrupt;
pub use outcome::{Outcome, Phase, RollbackOutcome};

use crate::backup::BackupCoordinator;
use crate::config::Config;
use crate::diagnostics::{Diagnostics, Warning};
use crate::error::Result;
use crate::executor::Executor;
use crate::health::HealthChecker;
use crate::history::{DeployStatus, DeploymentRecord, HistoryStore, LocalHistory, RemoteHistory};
use crate::lock::{DeployLock, LockError};
use crate::output::Output;
use crate::preflight::{PreflightPlan, PreflightReport, PreflightValidator};
use crate::prompt::Confirm;
use crate::rollback::{RollbackController, RollbackError};
use crate::shell::{Shell, quote};
use crate::state::RemoteLayout;
use crate::transport::{self, Transport, TransportMethod};
use crate::version::{Clock, SystemClock, Version, VersionManager};
use std::future::Future;

static SYSTEM_CLOCK: SystemClock = SystemClock;

/// Operator choices for one attempt.
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    pub method: TransportMethod,
    /// Pin to an existing version instead of generating one.
    pub version: Option<String>,
    pub skip_build: bool,
    pub skip_healthcheck: bool,
    pub no_rollback: bool,
    pub skip_backup: bool,
    pub dry_run: bool,
    pub break_lock: bool,
}

/// Where an outcome gets recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordScope {
    /// Operator machine only; the target is left untouched.
    Local,
    Everywhere,
}

/// Everything fixed once the version is known.
struct Attempt<'s> {
    version: Version,
    pinned: bool,
    method: TransportMethod,
    store: HistoryStore<'s>,
}

/// Sequences version, lock, preflight, backup, build, transport, stop,
/// start, health and rollback for one deployment attempt.
pub struct Orchestrator<'a> {
    config: &'a Config,
    local: &'a dyn Shell,
    remote: &'a dyn Shell,
    prompt: &'a dyn Confirm,
    output: &'a Output,
    clock: &'a dyn Clock,
    interrupt: Interrupt,
    checker: HealthChecker,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a Config,
        local: &'a dyn Shell,
        remote: &'a dyn Shell,
        prompt: &'a dyn Confirm,
        output: &'a Output,
    ) -> Self {
        Self {
            config,
            local,
            remote,
            prompt,
            output,
            clock: &SYSTEM_CLOCK,
            interrupt: Interrupt::new(),
            checker: HealthChecker::new(&config.health),
        }
    }

    pub fn with_clock(mut self, clock: &'a dyn Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn with_health_checker(mut self, checker: HealthChecker) -> Self {
        self.checker = checker;
        self
    }

    /// Run one attempt. Errors are only returned when no version could be
    /// determined; every later failure is an [`Outcome`].
    pub async fn run(&self, options: &DeployOptions) -> Result<Outcome> {
        let mut diag = Diagnostics::default();
        let result = self.run_inner(options, &mut diag).await;
        for warning in diag.warnings() {
            self.output.warning(&warning.message);
        }
        result
    }

    async fn run_inner(&self, options: &DeployOptions, diag: &mut Diagnostics) -> Result<Outcome> {
        self.output.phase(&Phase::Version.to_string());
        let resolved = VersionManager::new(self.clock)
            .resolve(options.version.as_deref(), self.local)
            .await?;
        self.output.progress(&format!(
            "{} {}",
            if resolved.pinned { "pinned" } else { "new" },
            resolved.version
        ));

        let layout = RemoteLayout::new(&self.config.target.root);
        let attempt = Attempt {
            version: resolved.version,
            pinned: resolved.pinned,
            method: options.method,
            store: HistoryStore::new(
                LocalHistory::new(self.config.local_state_dir()),
                RemoteHistory::new(self.remote, &layout),
            ),
        };
        let transport = transport::for_method(options.method, self.config);

        if options.dry_run {
            return Ok(self.dry_run(&attempt, transport.as_ref(), options).await);
        }

        self.output.phase(&Phase::Lock.to_string());
        let lock = match DeployLock::acquire(
            self.remote,
            &layout,
            &self.config.project,
            self.config.lock.stale_after,
            options.break_lock,
        )
        .await
        {
            Ok(lock) => lock,
            // Nothing on the target can be touched, so the attempt is
            // only recorded here.
            Err(LockError::Shell(e)) if e.is_unreachable() => {
                return Ok(self
                    .abort(
                        &attempt,
                        Phase::Preflight,
                        format!("reachability: {}", e),
                        RecordScope::Local,
                        diag,
                    )
                    .await);
            }
            Err(e) => {
                return Ok(self
                    .abort(&attempt, Phase::Lock, e.to_string(), RecordScope::Local, diag)
                    .await);
            }
        };

        let outcome = self
            .run_locked(&attempt, transport.as_ref(), options, diag)
            .await;

        if let Err(e) = lock.release().await {
            diag.warn(Warning::lock_release(format!(
                "failed to release deploy lock: {}",
                e
            )));
        }
        Ok(outcome)
    }

    async fn run_locked(
        &self,
        attempt: &Attempt<'_>,
        transport: &dyn Transport,
        options: &DeployOptions,
        diag: &mut Diagnostics,
    ) -> Outcome {
        let version = &attempt.version;

        // Preflight
        self.output.phase(&Phase::Preflight.to_string());
        let report = self.preflight(attempt, transport, options).await;
        if let Err(reason) = self.decide_on_preflight(&report, diag) {
            return self
                .abort(attempt, Phase::Preflight, reason, RecordScope::Everywhere, diag)
                .await;
        }

        let pointer = attempt.store.remote();
        let previous = match pointer.current_version().await {
            Ok(previous) => previous,
            Err(e) => {
                return self
                    .abort(
                        attempt,
                        Phase::Preflight,
                        format!("cannot read current version: {}", e),
                        RecordScope::Local,
                        diag,
                    )
                    .await;
            }
        };
        let previous_method = pointer.current_method().await.ok().flatten();
        match &previous {
            Some(previous) => self
                .output
                .progress(&format!("current version on target: {}", previous)),
            None => self.output.progress("no current version, first deployment"),
        }
        if self.interrupt.is_triggered() {
            return self.interrupted(attempt, Phase::Preflight, diag).await;
        }

        // Backup
        self.output.phase(&Phase::Backup.to_string());
        if let Err((reason, scope)) = self.backup(previous.is_some(), options, diag).await {
            return match scope {
                RecordScope::Local => self.interrupted(attempt, Phase::Backup, diag).await,
                RecordScope::Everywhere => {
                    self.abort(attempt, Phase::Backup, reason, scope, diag)
                        .await
                }
            };
        }
        if self.interrupt.is_triggered() {
            return self.interrupted(attempt, Phase::Backup, diag).await;
        }

        // Build
        self.output.phase(&Phase::Build.to_string());
        if let Err((reason, scope)) = self.build(attempt, options).await {
            return match scope {
                RecordScope::Local => self.interrupted(attempt, Phase::Build, diag).await,
                RecordScope::Everywhere => {
                    self.abort(attempt, Phase::Build, reason, scope, diag).await
                }
            };
        }
        if self.interrupt.is_triggered() {
            return self.interrupted(attempt, Phase::Build, diag).await;
        }

        // Transport
        self.output.phase(&Phase::Transport.to_string());
        let delivered = self
            .interruptible(transport.deliver(version, self.local, self.remote, diag))
            .await;
        match delivered {
            None => {
                transport.cleanup(version, self.remote, diag).await;
                return self.interrupted(attempt, Phase::Transport, diag).await;
            }
            Some(Err(e)) => {
                // Nothing was stopped yet, so there is nothing to roll back.
                return self
                    .abort(attempt, Phase::Transport, e.to_string(), RecordScope::Everywhere, diag)
                    .await;
            }
            Some(Ok(())) => self.output.progress(&format!(
                "images for {} delivered via {}",
                version, attempt.method
            )),
        }
        if self.interrupt.is_triggered() {
            return self.interrupted(attempt, Phase::Transport, diag).await;
        }

        // Point of no return: from here on the attempt always runs to a
        // recorded outcome, interrupt or not.
        tracing::info!("starting deployment of {}, interrupts are now deferred", version);
        let executor = Executor::new(self.remote, self.config);

        self.output.phase(&Phase::Stop.to_string());
        executor.free_ports(diag).await;
        executor.stop_current(diag).await;

        self.output.phase(&Phase::Start.to_string());
        if let Err(e) = executor.start_version(version).await {
            return self
                .fail(attempt, Phase::Start, e.to_string(), previous, previous_method, options, diag)
                .await;
        }

        self.output.phase(&Phase::Health.to_string());
        if options.skip_healthcheck {
            self.output.progress("skipped (--skip-healthcheck)");
        } else {
            let checks: Vec<_> = self.config.health.checks.iter().cloned().collect();
            let report = self.checker.verify(self.remote, &checks).await;
            for name in &report.passed {
                self.output.progress(&format!("{}: healthy", name));
            }
            for failure in &report.failed {
                self.output
                    .warning(&format!("{}: {}", failure.name, failure.detail));
            }
            if !report.is_healthy() {
                return self
                    .fail(
                        attempt,
                        Phase::Health,
                        report.failure_summary(),
                        previous,
                        previous_method,
                        options,
                        diag,
                    )
                    .await;
            }
        }

        let recorded = self
            .make_current(attempt, version, DeployStatus::Success, attempt.method, diag)
            .await;
        if self.interrupt.is_triggered() {
            tracing::info!("interrupt received during deployment, run completed anyway");
        }
        match recorded {
            Ok(()) => Outcome::Deployed {
                version: version.clone(),
            },
            Err(reason) => Outcome::Unrecorded {
                version: version.clone(),
                reason,
            },
        }
    }

    async fn preflight(
        &self,
        attempt: &Attempt<'_>,
        transport: &dyn Transport,
        options: &DeployOptions,
    ) -> PreflightReport {
        let plan = PreflightPlan {
            version: &attempt.version,
            transport,
            expect_artifacts: attempt.pinned || options.skip_build,
        };
        let report = PreflightValidator::new(self.config, self.local, self.remote)
            .run(&plan)
            .await;
        for result in &report.results {
            if result.ok {
                self.output.progress(&result.to_string());
            } else {
                self.output.warning(&result.to_string());
            }
        }
        report
    }

    /// Proceed, ask, or abort on preflight failures.
    fn decide_on_preflight(
        &self,
        report: &PreflightReport,
        diag: &mut Diagnostics,
    ) -> std::result::Result<(), String> {
        let names = |failures: Vec<&str>| failures.join(", ");

        if report.has_blocking_failures() {
            let failed = names(report.blocking_failures().map(|r| r.check).collect());
            if !self.prompt.is_interactive() {
                return Err(format!("blocking preflight checks failed: {}", failed));
            }
            if !self
                .prompt
                .confirm(&format!("Preflight checks failed ({}). Deploy anyway?", failed))
            {
                return Err(format!("operator declined after failed checks: {}", failed));
            }
            diag.warn(Warning::preflight(format!(
                "deployed despite failed preflight checks: {}",
                failed
            )));
        }

        let advisory: Vec<&str> = report.advisory_failures().map(|r| r.check).collect();
        if !advisory.is_empty() {
            let advisory = names(advisory);
            if self.prompt.is_interactive()
                && !self
                    .prompt
                    .confirm(&format!("Preflight warnings ({}). Continue?", advisory))
            {
                return Err(format!("operator declined after warnings: {}", advisory));
            }
            diag.warn(Warning::preflight(format!(
                "proceeded past preflight warnings: {}",
                advisory
            )));
        }
        Ok(())
    }

    /// `Err` carries the reason and how to record it; a local scope means
    /// the phase was interrupted.
    async fn backup(
        &self,
        has_previous: bool,
        options: &DeployOptions,
        diag: &mut Diagnostics,
    ) -> std::result::Result<(), (String, RecordScope)> {
        if !has_previous {
            self.output.progress("skipped, nothing deployed yet");
            return Ok(());
        }

        if options.skip_backup {
            if !self.prompt.is_interactive() {
                return Err((
                    "--skip-backup requires an interactive confirmation".to_string(),
                    RecordScope::Everywhere,
                ));
            }
            let project = self.config.project.as_str();
            if !self
                .prompt
                .confirm_typed("Deploying WITHOUT a fresh backup.", project)
            {
                return Err((
                    "skipping the backup was not confirmed".to_string(),
                    RecordScope::Everywhere,
                ));
            }
            self.output.warning("proceeding without a fresh backup");
            return Ok(());
        }

        let coordinator = BackupCoordinator::new(self.remote, self.config);
        match self.interruptible(coordinator.run(diag)).await {
            None => {
                coordinator.remove_marker(diag).await;
                Err(("interrupted".to_string(), RecordScope::Local))
            }
            Some(Err(e)) => Err((e.to_string(), RecordScope::Everywhere)),
            Some(Ok(result)) if !result.ok => Err((
                result
                    .detail
                    .unwrap_or_else(|| "backup rejected".to_string()),
                RecordScope::Everywhere,
            )),
            Some(Ok(result)) => {
                self.output.progress(&format!(
                    "backup {} ({} bytes)",
                    result.path.as_deref().unwrap_or("?"),
                    result.size_bytes
                ));
                Ok(())
            }
        }
    }

    async fn build(
        &self,
        attempt: &Attempt<'_>,
        options: &DeployOptions,
    ) -> std::result::Result<(), (String, RecordScope)> {
        if attempt.pinned {
            self.output.progress("skipped, version pinned");
            return Ok(());
        }
        if options.skip_build {
            self.output.progress("skipped (--skip-build)");
            return Ok(());
        }
        let Some(command) = &self.config.build.command else {
            self.output
                .progress("skipped, no build command configured");
            return Ok(());
        };

        let command = format!(
            "export APP_VERSION={}; {}",
            quote(attempt.version.as_str()),
            command
        );
        let built = self
            .interruptible(
                self.local
                    .exec_with_timeout(&command, self.config.build.timeout),
            )
            .await;
        match built {
            None => Err(("interrupted".to_string(), RecordScope::Local)),
            Some(Err(e)) => Err((format!("build failed: {}", e), RecordScope::Everywhere)),
            Some(Ok(output)) if !output.success() => Err((
                format!(
                    "build exited with {}: {}",
                    output.exit_code,
                    output.stderr.trim()
                ),
                RecordScope::Everywhere,
            )),
            Some(Ok(_)) => {
                self.output
                    .progress(&format!("built images for {}", attempt.version));
                Ok(())
            }
        }
    }

    /// Record `failed` for the new version, then roll back unless disabled.
    #[allow(clippy::too_many_arguments)]
    async fn fail(
        &self,
        attempt: &Attempt<'_>,
        phase: Phase,
        reason: String,
        previous: Option<Version>,
        previous_method: Option<TransportMethod>,
        options: &DeployOptions,
        diag: &mut Diagnostics,
    ) -> Outcome {
        let version = &attempt.version;
        self.output.error(&format!("{} failed: {}", phase, reason));
        self.record(attempt, version, DeployStatus::Failed, attempt.method, RecordScope::Everywhere, diag)
            .await;

        if options.no_rollback {
            self.output
                .warning(&format!("rollback disabled, {} left running", version));
            return Outcome::Failed {
                version: version.clone(),
                phase,
                reason,
                rollback: RollbackOutcome::Disabled,
            };
        }

        self.output.phase(&Phase::Rollback.to_string());
        let controller = RollbackController::new(self.remote, self.config, &self.checker);
        let rollback = match controller.rollback(previous.as_ref(), diag).await {
            Ok(restored) => {
                let method = previous_method.unwrap_or(attempt.method);
                let recorded = self
                    .make_current(attempt, &restored, DeployStatus::Rollback, method, diag)
                    .await;
                match recorded {
                    Ok(()) => {
                        self.output.progress(&format!("restored {}", restored));
                        RollbackOutcome::Restored(restored)
                    }
                    Err(reason) => RollbackOutcome::Failed(RollbackError::Unrecorded {
                        version: restored.to_string(),
                        reason,
                    }),
                }
            }
            Err(e) => {
                self.output.error(&format!(
                    "ROLLBACK FAILED, the target needs manual intervention: {}",
                    e
                ));
                RollbackOutcome::Failed(e)
            }
        };

        Outcome::Failed {
            version: version.clone(),
            phase,
            reason,
            rollback,
        }
    }

    async fn abort(
        &self,
        attempt: &Attempt<'_>,
        phase: Phase,
        reason: String,
        scope: RecordScope,
        diag: &mut Diagnostics,
    ) -> Outcome {
        self.output.error(&format!("{} failed: {}", phase, reason));
        self.record(attempt, &attempt.version, DeployStatus::Failed, attempt.method, scope, diag)
            .await;
        Outcome::Aborted {
            version: attempt.version.clone(),
            phase,
            reason,
        }
    }

    async fn interrupted(&self, attempt: &Attempt<'_>, phase: Phase, diag: &mut Diagnostics) -> Outcome {
        self.abort(
            attempt,
            phase,
            "interrupted by operator".to_string(),
            RecordScope::Local,
            diag,
        )
        .await
    }

    /// Record an outcome that leaves the current version alone. Failures
    /// only warn.
    async fn record(
        &self,
        attempt: &Attempt<'_>,
        version: &Version,
        status: DeployStatus,
        method: TransportMethod,
        scope: RecordScope,
        diag: &mut Diagnostics,
    ) {
        let record = DeploymentRecord::new(self.clock.now(), version.clone(), status, method);
        let result = match scope {
            RecordScope::Local => attempt.store.append_local(&record),
            RecordScope::Everywhere => attempt.store.append(&record).await,
        };
        if let Err(e) = result {
            diag.warn(Warning::history(format!(
                "could not record {} for {}: {}",
                status, version, e
            )));
        }
    }

    /// Record `version` as current everywhere. `Err` when the target's
    /// pointer was not moved; a local-only failure just warns.
    async fn make_current(
        &self,
        attempt: &Attempt<'_>,
        version: &Version,
        status: DeployStatus,
        method: TransportMethod,
        diag: &mut Diagnostics,
    ) -> std::result::Result<(), String> {
        let record = DeploymentRecord::new(self.clock.now(), version.clone(), status, method);
        match attempt.store.append(&record).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_remote() => {
                self.output.error(&format!(
                    "could not make {} current on the target: {}",
                    version, e
                ));
                Err(e.to_string())
            }
            Err(e) => {
                diag.warn(Warning::history(format!(
                    "could not record {} for {}: {}",
                    status, version, e
                )));
                Ok(())
            }
        }
    }

    async fn dry_run(
        &self,
        attempt: &Attempt<'_>,
        transport: &dyn Transport,
        options: &DeployOptions,
    ) -> Outcome {
        self.output.phase("preflight (dry run)");
        let report = self.preflight(attempt, transport, options).await;
        let previous = attempt.store.remote().current_version().await.ok().flatten();

        let mut plan = vec![format!(
            "deploy {} via {} to {}",
            attempt.version,
            attempt.method,
            self.config.target.display()
        )];
        plan.push(match (&previous, options.skip_backup) {
            (None, _) => "backup: skipped, nothing deployed yet".to_string(),
            (Some(_), true) => "backup: skipped after typed confirmation".to_string(),
            (Some(_), false) => format!("backup: {}", self.config.backup.command),
        });
        plan.push(
            if attempt.pinned || options.skip_build || self.config.build.command.is_none() {
                "build: skipped".to_string()
            } else {
                "build: run".to_string()
            },
        );
        plan.push(format!("transport: {}", attempt.method));
        plan.push("stop current stack, start new version".to_string());
        plan.push(if options.skip_healthcheck {
            "health: skipped".to_string()
        } else {
            format!("health: {} checks", self.config.health.checks.len())
        });
        plan.push(match (&previous, options.no_rollback) {
            (_, true) => "rollback: disabled".to_string(),
            (Some(previous), false) => format!("rollback: to {} on failure", previous),
            (None, false) => "rollback: unavailable, first deployment".to_string(),
        });
        for line in &plan {
            self.output.progress(line);
        }

        Outcome::DryRun {
            version: attempt.version.clone(),
            clear: !report.has_blocking_failures(),
        }
    }

    /// `None` when the operator interrupted before `fut` finished.
    async fn interruptible<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.interrupt.triggered() => None,
            out = fut => Some(out),
        }
    }
}
