// ABOUTME: Deploy command implementation.
// ABOUTME: Connects to the target, runs the orchestrator and reports the outcome.

use super::connection::Target;
use deckhand::config::Config;
use deckhand::deploy::{DeployOptions, Interrupt, Orchestrator, Outcome};
use deckhand::error::Result;
use deckhand::output::Output;
use deckhand::prompt::TerminalPrompt;
use deckhand::shell::LocalShell;

/// Run one deployment attempt and return the process exit code.
pub async fn deploy(
    config: Config,
    options: DeployOptions,
    force: bool,
    mut output: Output,
) -> Result<i32> {
    output.start_timer();
    let interrupt = Interrupt::listen_for_signals();

    let target = Target::connect_or_unreachable(&config, &output).await;
    let local = LocalShell::new(config.target.command_timeout);
    let prompt = TerminalPrompt::new(force);

    let result = Orchestrator::new(&config, &local, target.shell(), &prompt, &output)
        .with_interrupt(interrupt)
        .run(&options)
        .await;
    target.close(&output).await;

    let outcome = result?;
    match &outcome {
        Outcome::Deployed { .. } | Outcome::DryRun { clear: true, .. } => {
            output.success(&outcome.to_string())
        }
        _ => output.error(&outcome.to_string()),
    }
    Ok(outcome.exit_code())
}
