use anyhow::Result;
use clap::Args;
use hookgate_core::config::Config;
use hookgate_core::env::{HOOKGATE_CONFIG, HOOKGATE_CONFIG_DIR};

#[derive(Args)]
pub struct PathsArgs {
    /// Rule file override to resolve
    #[arg(short, long, env = HOOKGATE_CONFIG)]
    pub config: Option<String>,
}

pub fn run(args: PathsArgs) -> Result<i32> {
    let path = Config::resolve_path(args.config.as_deref())?;
    println!("Config: {}", path.display());
    println!("  exists: {}", path.exists());
    if let Ok(dir) = std::env::var(HOOKGATE_CONFIG_DIR) {
        println!("  {}={}", HOOKGATE_CONFIG_DIR, dir);
    }
    Ok(0)
}
