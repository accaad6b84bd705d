// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: `deckhand [METHOD] [flags]` deploys; subcommands inspect and scaffold.

use clap::{Args, Parser, Subcommand, ValueEnum};
use deckhand::transport::TransportMethod;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "deckhand")]
#[command(about = "Versioned, health-gated deployments of a compose stack to one host")]
pub struct Cli {
    /// Path to the config file (default: discover deckhand.yml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print warnings, errors and the final result
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub deploy: DeployArgs,
}

/// How images reach the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Method {
    #[default]
    Tar,
    Registry,
    Local,
}

impl From<Method> for TransportMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::Tar => TransportMethod::Tar,
            Method::Registry => TransportMethod::Registry,
            Method::Local => TransportMethod::Local,
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct DeployArgs {
    /// Transport method
    #[arg(value_enum, default_value_t = Method::Tar)]
    pub method: Method,

    /// Use images that were already built
    #[arg(long)]
    pub skip_build: bool,

    /// Do not gate on health checks
    #[arg(long)]
    pub skip_healthcheck: bool,

    /// Leave a failed version running instead of rolling back
    #[arg(long)]
    pub no_rollback: bool,

    /// Never prompt; failed checks abort instead
    #[arg(long)]
    pub force: bool,

    /// Deploy an existing version instead of building a new one
    #[arg(long = "version", value_name = "ID")]
    pub pin: Option<String>,

    /// Deploy without a fresh backup (asks you to type the project name)
    #[arg(long)]
    pub skip_backup: bool,

    /// Run preflight checks, print the plan and exit
    #[arg(long)]
    pub dry_run: bool,

    /// Take over a deploy lock held by another run
    #[arg(long)]
    pub break_lock: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a deckhand.yml in the current directory
    Init {
        /// Project name
        #[arg(short, long)]
        project: Option<String>,

        /// Target host
        #[arg(long)]
        host: Option<String>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show recent deployments recorded on this machine
    History {
        /// Number of records
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
    },

    /// Show the current version and containers on the target
    Status,
}
