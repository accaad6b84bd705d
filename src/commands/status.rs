// ABOUTME: Status command implementation.
// ABOUTME: Shows the target's current version pointer and its containers.

use super::connection::Target;
use deckhand::config::Config;
use deckhand::error::Result;
use deckhand::history::RemoteHistory;
use deckhand::output::{Output, OutputMode};
use deckhand::state::{RemoteLayout, RemoteTargetState};
use serde_json::json;

pub async fn status(config: &Config, output: &Output) -> Result<()> {
    let target = Target::connect(config, output).await?;
    let result = report(config, &target, output).await;
    target.close(output).await;
    result
}

async fn report(config: &Config, target: &Target, output: &Output) -> Result<()> {
    let shell = target.shell();
    let layout = RemoteLayout::new(&config.target.root);
    let pointer = RemoteHistory::new(shell, &layout);

    let version = pointer.current_version().await?;
    let method = pointer.current_method().await?;
    let state = RemoteTargetState::query(shell).await?;

    if output.mode() == OutputMode::Json {
        let containers: Vec<_> = state
            .containers
            .iter()
            .map(|c| json!({"name": c.name, "image": c.image, "state": c.state}))
            .collect();
        let line = json!({
            "project": config.project.as_str(),
            "host": config.target.display(),
            "current_version": version.as_ref().map(|v| v.as_str()),
            "current_method": method.map(|m| m.to_string()),
            "containers": containers,
        });
        println!("{line}");
        return Ok(());
    }

    println!("Project: {}", config.project);
    println!("Target:  {}", config.target.display());
    match (&version, method) {
        (Some(version), Some(method)) => println!("Current: {} (via {})", version, method),
        (Some(version), None) => println!("Current: {}", version),
        (None, _) => println!("Current: none (nothing deployed yet)"),
    }

    let ours: Vec<_> = state.running_in_project(&config.project).collect();
    println!("Running containers ({}):", ours.len());
    for container in ours {
        println!("  {:<30} {}", container.name, container.image);
    }
    let others: Vec<_> = state.running_outside_project(&config.project).collect();
    if !others.is_empty() {
        println!("Other running containers ({}):", others.len());
        for container in others {
            println!("  {:<30} {}", container.name, container.image);
        }
    }
    Ok(())
}
