// ABOUTME: Shared helper for opening a shell on the deployment target.
// ABOUTME: SSH for remote targets, the local shell when target.local is set.

use deckhand::config::Config;
use deckhand::diagnostics::{Diagnostics, Warning};
use deckhand::error::Result;
use deckhand::output::Output;
use deckhand::shell::{LocalShell, Shell, UnreachableShell};
use deckhand::ssh::Session;

/// An open connection to the target host.
pub enum Target {
    Ssh(Session),
    Local(LocalShell),
    /// Connecting failed; every command reports why.
    Unreachable(UnreachableShell),
}

impl Target {
    pub async fn connect(config: &Config, output: &Output) -> Result<Self> {
        let target = &config.target;
        if target.local {
            output.progress("Target is this machine");
            return Ok(Target::Local(
                LocalShell::new(target.command_timeout).working_dir(&target.root),
            ));
        }

        output.progress(&format!("Connecting to {}...", target.display()));
        let session = Session::connect(target.ssh_session_config()).await?;
        Ok(Target::Ssh(session))
    }

    /// Like [`Target::connect`], but a failed connection is handed on as
    /// an [`UnreachableShell`] so the attempt can still be reported and
    /// recorded.
    pub async fn connect_or_unreachable(config: &Config, output: &Output) -> Self {
        match Self::connect(config, output).await {
            Ok(target) => target,
            Err(e) => {
                output.warning(&format!("could not connect to {}: {}", config.target.host, e));
                Target::Unreachable(UnreachableShell::new(&config.target.host, e.to_string()))
            }
        }
    }

    pub fn shell(&self) -> &dyn Shell {
        match self {
            Target::Ssh(session) => session,
            Target::Local(shell) => shell,
            Target::Unreachable(shell) => shell,
        }
    }

    /// Close the connection; failures only warn.
    pub async fn close(self, output: &Output) {
        let mut diag = Diagnostics::default();
        if let Target::Ssh(session) = self
            && let Err(e) = session.disconnect().await
        {
            diag.warn(Warning::ssh_disconnect(format!(
                "failed to disconnect cleanly: {}",
                e
            )));
        }
        for warning in diag.warnings() {
            output.warning(&warning.message);
        }
    }
}
