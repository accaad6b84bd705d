// ABOUTME: History command implementation.
// ABOUTME: Prints the most recent deployment records from the local log.

use deckhand::config::Config;
use deckhand::error::Result;
use deckhand::history::LocalHistory;
use deckhand::output::{Output, OutputMode};
use serde_json::json;

pub fn history(config: &Config, count: usize, output: &Output) -> Result<()> {
    let local = LocalHistory::new(config.local_state_dir());
    let records = local.recent(count)?;

    if output.mode() == OutputMode::Json {
        for record in &records {
            let line = json!({
                "timestamp": record.timestamp,
                "version": record.version.as_str(),
                "status": record.status.to_string(),
                "method": record.method.to_string(),
            });
            println!("{line}");
        }
        return Ok(());
    }

    if records.is_empty() {
        output.progress("No deployments recorded yet");
        return Ok(());
    }
    for record in &records {
        println!(
            "{}  {:<8}  {:<8}  {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.status,
            record.method,
            record.version
        );
    }
    Ok(())
}
