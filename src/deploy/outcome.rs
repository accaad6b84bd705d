// ABOUTME: Terminal outcomes of a deployment attempt and their exit codes.
// ABOUTME: 0 deployed, 1 failed or aborted, 2 rollback failed or the target needs repair.

use crate::rollback::RollbackError;
use crate::version::Version;
use std::fmt;

/// Phases of an attempt, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Version,
    Lock,
    Preflight,
    Backup,
    Build,
    Transport,
    Stop,
    Start,
    Health,
    Rollback,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Version => "version",
            Phase::Lock => "lock",
            Phase::Preflight => "preflight",
            Phase::Backup => "backup",
            Phase::Build => "build",
            Phase::Transport => "transport",
            Phase::Stop => "stop",
            Phase::Start => "start",
            Phase::Health => "health",
            Phase::Rollback => "rollback",
        })
    }
}

/// What happened after the new version failed.
#[derive(Debug)]
pub enum RollbackOutcome {
    /// The previous version is running and healthy again.
    Restored(Version),
    /// `--no-rollback` was given.
    Disabled,
    /// Rollback was impossible or failed; the target needs manual attention.
    Failed(RollbackError),
}

#[derive(Debug)]
pub enum Outcome {
    /// The new version is current.
    Deployed { version: Version },
    /// The new version runs and is healthy, but the target's pointer still
    /// names the version before it.
    Unrecorded { version: Version, reason: String },
    /// Preflight ran and nothing else did.
    DryRun { version: Version, clear: bool },
    /// Stopped before the running stack was touched.
    Aborted {
        version: Version,
        phase: Phase,
        reason: String,
    },
    /// The new version was started and failed.
    Failed {
        version: Version,
        phase: Phase,
        reason: String,
        rollback: RollbackOutcome,
    },
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Deployed { .. } => 0,
            Outcome::Unrecorded { .. } => 2,
            Outcome::DryRun { clear, .. } => {
                if *clear {
                    0
                } else {
                    1
                }
            }
            Outcome::Aborted { .. } => 1,
            Outcome::Failed { rollback, .. } => match rollback {
                RollbackOutcome::Restored(_) | RollbackOutcome::Disabled => 1,
                RollbackOutcome::Failed(_) => 2,
            },
        }
    }

    pub fn version(&self) -> &Version {
        match self {
            Outcome::Deployed { version }
            | Outcome::Unrecorded { version, .. }
            | Outcome::DryRun { version, .. }
            | Outcome::Aborted { version, .. }
            | Outcome::Failed { version, .. } => version,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Deployed { version } => write!(f, "deployed {}", version),
            Outcome::Unrecorded { version, reason } => write!(
                f,
                "deployed {} but the target's current version was NOT updated, fix it by hand before the next deploy: {}",
                version, reason
            ),
            Outcome::DryRun { version, clear: true } => {
                write!(f, "dry run for {}: all checks passed", version)
            }
            Outcome::DryRun { version, clear: false } => {
                write!(f, "dry run for {}: blocking checks failed", version)
            }
            Outcome::Aborted {
                version,
                phase,
                reason,
            } => write!(f, "deployment of {} aborted during {}: {}", version, phase, reason),
            Outcome::Failed {
                version,
                phase,
                reason,
                rollback,
            } => {
                write!(f, "deployment of {} failed during {}: {}", version, phase, reason)?;
                match rollback {
                    RollbackOutcome::Restored(previous) => {
                        write!(f, "; rolled back to {}", previous)
                    }
                    RollbackOutcome::Disabled => write!(f, "; rollback disabled"),
                    RollbackOutcome::Failed(e) => {
                        write!(f, "; ROLLBACK FAILED, manual intervention required: {}", e)
                    }
                }
            }
        }
    }
}
