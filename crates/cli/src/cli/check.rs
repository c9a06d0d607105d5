use anyhow::Result;
use clap::Args;
use hookgate_core::config::Config;
use hookgate_core::env::HOOKGATE_CONFIG;

#[derive(Args)]
pub struct CheckArgs {
    /// Rule file (defaults to the platform config dir)
    #[arg(short, long, env = HOOKGATE_CONFIG)]
    pub config: Option<String>,
}

pub fn run(args: CheckArgs) -> Result<i32> {
    let config = Config::load(args.config.as_deref())?;
    let problems = config.rules.validate();

    if problems.is_empty() {
        println!(
            "{}: {} rule(s), no problems found",
            config.path.display(),
            config.rules.rule_count()
        );
        return Ok(0);
    }

    for problem in &problems {
        println!("{}", problem);
    }
    eprintln!(
        "{}: {} problem(s) found",
        config.path.display(),
        problems.len()
    );
    Ok(1)
}
