// ABOUTME: Operator confirmation prompts.
// ABOUTME: Non-interactive runs (--force, CI, no terminal) never block on input.

use dialoguer::Input;
use std::io::IsTerminal;

/// Asks the operator to confirm risky steps.
pub trait Confirm: Send + Sync {
    /// Whether a human can answer prompts.
    fn is_interactive(&self) -> bool;

    /// Yes/no question defaulting to no.
    fn confirm(&self, question: &str) -> bool;

    /// The operator must type `expected` exactly.
    fn confirm_typed(&self, question: &str, expected: &str) -> bool;
}

/// Prompts on the controlling terminal.
#[derive(Debug, Clone, Copy)]
pub struct TerminalPrompt {
    interactive: bool,
}

impl TerminalPrompt {
    /// `force` suppresses prompts, as does a set `CI` variable or a
    /// non-terminal stdin.
    pub fn new(force: bool) -> Self {
        let ci = std::env::var_os("CI").is_some_and(|v| !v.is_empty());
        Self {
            interactive: !force && !ci && std::io::stdin().is_terminal(),
        }
    }
}

/// Run a blocking terminal read without stalling the other tasks on this
/// worker. Requires the multi-threaded runtime `main` starts.
fn blocking<T>(read: impl FnOnce() -> T) -> T {
    tokio::task::block_in_place(read)
}

impl Confirm for TerminalPrompt {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn confirm(&self, question: &str) -> bool {
        if !self.interactive {
            return false;
        }
        let answer = blocking(|| {
            dialoguer::Confirm::new()
                .with_prompt(question)
                .default(false)
                .interact()
        });
        match answer {
            Ok(yes) => yes,
            Err(e) => {
                tracing::warn!("could not read confirmation: {}", e);
                false
            }
        }
    }

    fn confirm_typed(&self, question: &str, expected: &str) -> bool {
        if !self.interactive {
            return false;
        }
        let answer = blocking(|| {
            Input::<String>::new()
                .with_prompt(format!("{} Type '{}' to continue", question, expected))
                .allow_empty(true)
                .interact_text()
        });
        match answer {
            Ok(typed) => typed.trim() == expected,
            Err(e) => {
                tracing::warn!("could not read confirmation: {}", e);
                false
            }
        }
    }
}
