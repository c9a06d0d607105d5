use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use hookgate_core::config::Config;
use hookgate_core::env::{HOOKGATE_CONFIG, HOOKGATE_EXIT_CODE_MODE};
use hookgate_core::hooks::{Dispatcher, Event, EventKind};
use tokio::io::AsyncReadExt;
use tracing::debug;

#[derive(Args)]
pub struct RunArgs {
    /// Event type, e.g. PreToolUse or SessionStart
    #[arg(short, long)]
    pub event: EventKind,

    /// Rule file (defaults to the platform config dir)
    #[arg(short, long, env = HOOKGATE_CONFIG)]
    pub config: Option<String>,

    /// Answer PreToolUse, PostToolUse, Stop and SubagentStop with exit codes instead of JSON
    #[arg(long, env = HOOKGATE_EXIT_CODE_MODE)]
    pub exit_code_mode: bool,
}

pub async fn run(args: RunArgs) -> Result<i32> {
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("Failed to read event from stdin")?;

    let event = Event::parse(args.event, &input)?;
    let config = Config::load(args.config.as_deref())?;
    debug!(
        "Dispatching {} against {} rule(s) from {}",
        args.event,
        config.rules.rules_for(args.event).len(),
        config.path.display()
    );

    let response = Dispatcher::new(config.rules)
        .with_exit_code_mode(args.exit_code_mode)
        .dispatch(&event)
        .await;

    if !response.stdout.is_empty() {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(response.stdout.as_bytes())?;
        if !response.stdout.ends_with('\n') {
            stdout.write_all(b"\n")?;
        }
        stdout.flush()?;
    }
    if !response.stderr.is_empty() {
        eprintln!("{}", response.stderr.trim_end());
    }

    Ok(response.exit_code)
}
