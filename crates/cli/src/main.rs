use anyhow::Result;
use clap::Parser;

mod cli;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let exit_code = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))?;

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

async fn async_main(cli: Cli) -> Result<i32> {
    // Initialize logging
    // stdout belongs to the host protocol, so logs go to stderr: "warn" by
    // default, "debug" with --verbose
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => crate::cli::run::run(args).await,
        Commands::Check(args) => crate::cli::check::run(args),
        Commands::Paths(args) => crate::cli::paths::run(args),
    }
}
