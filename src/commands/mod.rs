// ABOUTME: Command module aggregator for the deckhand CLI.
// ABOUTME: Re-exports deploy, history and status command handlers.

mod connection;
mod deploy;
mod history;
mod status;

pub use deploy::deploy;
pub use history::history;
pub use status::status;
