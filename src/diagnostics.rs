// ABOUTME: Diagnostics accumulator for non-fatal warnings during deployment.
// ABOUTME: Collects warnings that shouldn't fail a deployment but should be shown to users.

/// Collects non-fatal warnings during deployment operations.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Whether a warning of this kind was collected.
    pub fn has(&self, kind: WarningKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }
}

/// A non-fatal warning collected during deployment.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a lock release warning.
    pub fn lock_release(message: impl Into<String>) -> Self {
        Self::new(WarningKind::LockRelease, message)
    }

    /// Create an SSH disconnect warning.
    pub fn ssh_disconnect(message: impl Into<String>) -> Self {
        Self::new(WarningKind::SshDisconnect, message)
    }

    pub fn stop_failed(message: impl Into<String>) -> Self {
        Self::new(WarningKind::StopFailed, message)
    }

    pub fn cleanup(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Cleanup, message)
    }

    pub fn preflight(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Preflight, message)
    }

    pub fn history(message: impl Into<String>) -> Self {
        Self::new(WarningKind::History, message)
    }
}

/// Categories of warnings that can occur during deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Failed to release deploy lock (lock file may remain).
    LockRelease,
    /// Failed to cleanly disconnect SSH session.
    SshDisconnect,
    /// Tearing down the running stack failed; tolerated since nothing may
    /// have been running.
    StopFailed,
    /// Temporary transport files could not be removed.
    Cleanup,
    /// A failed preflight check the operator chose to proceed past.
    Preflight,
    /// One copy of the history could not be updated.
    History,
}
