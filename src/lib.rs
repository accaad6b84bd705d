// ABOUTME: Library root for deckhand - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod backup;
pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod health;
pub mod history;
pub mod lock;
pub mod output;
pub mod preflight;
pub mod prompt;
pub mod rollback;
pub mod shell;
pub mod ssh;
pub mod state;
pub mod transport;
pub mod types;
pub mod version;
