pub mod check;
pub mod paths;
pub mod run;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "hookgate")]
#[command(author, version, about = "Rule-driven hook handler for coding-agent lifecycle events", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Handle one hook event read from stdin
    Run(run::RunArgs),

    /// Validate the rule file
    Check(check::CheckArgs),

    /// Show the resolved config path
    Paths(paths::PathsArgs),
}
